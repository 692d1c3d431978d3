//! Chunkflow CLI: run keyword workflows locally or serve the HTTP API.
//!
//! Usage:
//!   chunkflow serve [--bind addr] [--config file]
//!   chunkflow run <file> [--session key] [--chunk-size n] [--model id]
//!   chunkflow resume <session> [--model id]
//!   chunkflow session <show|list>
//!   chunkflow agents

use chunkflow::agent::catalog;
use chunkflow::server::{self, AppState};
use chunkflow::workflow::WorkflowReport;
use chunkflow::{
    Agent, ChatModel, OpenStore, SessionKey, SessionStore, Settings, SqliteSessionStore, WorkflowRunner,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chunkflow",
    version,
    about = "Chunked spreadsheet workflows driven by hosted LLM agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for inputs, outputs and the session database
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the keyword workflow over a local CSV/Excel file
    Run {
        /// Input file
        file: PathBuf,
        /// Session key (generated when omitted)
        #[arg(long)]
        session: Option<String>,
        /// Rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Model id
        #[arg(long)]
        model: Option<String>,
        /// Owner recorded on the session
        #[arg(long)]
        user: Option<String>,
    },
    /// Continue a session from its stored cursor
    Resume {
        /// Session key
        session: String,
        /// Model id
        #[arg(long)]
        model: Option<String>,
    },
    /// Inspect stored sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// List the built-in agents
    Agents,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show one session and its recent runs
    Show {
        /// Session key
        key: String,
    },
    /// List all sessions
    List,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let mut settings = Settings::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(dir) = &cli.scratch_dir {
        settings.scratch_dir = dir.clone();
    }
    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<SqliteSessionStore, String> {
    let db_path = settings.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    SqliteSessionStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))
}

fn chat_client(settings: &Settings) -> Result<Arc<dyn ChatModel>, String> {
    let client = settings.chat_client().map_err(|e| e.to_string())?;
    Ok(Arc::new(client))
}

fn print_report(report: &WorkflowReport) {
    println!("Session:   {}", report.session_id);
    println!("Input:     {}", report.input_path.display());
    println!("Output:    {}", report.output_path.display());
    println!(
        "Rows:      {}/{} ({} columns)",
        report.cursor, report.table.total_rows, report.table.total_columns
    );
    println!(
        "Chunks:    {} read, {} analyzed, {} skipped, {} failed",
        report.stats.chunks_read,
        report.stats.chunks_analyzed,
        report.stats.chunks_skipped,
        report.stats.chunks_failed
    );
    println!("Status:    {}", report.status.as_str());
    println!("{}", report.summary.message);
}

fn cmd_serve(settings: Settings, bind: Option<String>) -> i32 {
    let bind = bind.unwrap_or_else(|| settings.bind.clone());
    let setup = || -> Result<(tokio::runtime::Runtime, AppState), String> {
        let rt = runtime()?;
        let workspace = settings.workspace();
        workspace
            .ensure()
            .map_err(|e| format!("cannot create {}: {}", workspace.root().display(), e))?;
        let store = open_store(&settings)?;
        let state = AppState {
            runner: WorkflowRunner::new(workspace, Arc::new(store)),
            client: chat_client(&settings)?,
            default_model: settings.model.default_model.clone(),
            workflow: settings.workflow(),
        };
        Ok((rt, state))
    };
    let (rt, state) = match setup() {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    rt.block_on(async {
        if !state.client.is_available().await {
            tracing::warn!("OPENAI_API_KEY is not set; workflow runs will fail every chunk");
        }
        let listener = match tokio::net::TcpListener::bind(&bind).await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error: cannot bind {}: {}", bind, e);
                return 1;
            }
        };
        match server::serve(listener, state).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        }
    })
}

/// What a workflow command should do once everything is wired.
enum Job {
    Fresh {
        file: PathBuf,
        session: Option<String>,
        user: Option<String>,
    },
    Resume {
        session: String,
    },
}

fn cmd_workflow(mut settings: Settings, job: Job, chunk_size: Option<usize>, model: Option<String>) -> i32 {
    if let Some(size) = chunk_size {
        settings.chunk_size = size;
    }
    let key = match &job {
        Job::Fresh { session, .. } => SessionKey::parse_or_generate(session.as_deref()),
        Job::Resume { session } => SessionKey::parse(session.as_str()),
    };
    let key = match key {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let setup = || -> Result<(tokio::runtime::Runtime, WorkflowRunner, Arc<dyn ChatModel>), String> {
        settings.validate().map_err(|e| e.to_string())?;
        let rt = runtime()?;
        let store = open_store(&settings)?;
        let runner = WorkflowRunner::new(settings.workspace(), Arc::new(store));
        Ok((rt, runner, chat_client(&settings)?))
    };
    let (rt, runner, client) = match setup() {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let model_id = model.unwrap_or_else(|| settings.model.default_model.clone());
    let agent = Agent::new(&catalog::KEYWORD_ANALYSIS, model_id, client.clone());
    let config = settings.workflow();

    rt.block_on(async {
        if !client.is_available().await {
            eprintln!("Error: no model API key configured (set OPENAI_API_KEY)");
            return 1;
        }
        let result = match job {
            Job::Fresh { file, user, .. } => {
                runner
                    .process_file(&key, user.as_deref(), &file, &agent, config)
                    .await
            }
            Job::Resume { .. } => runner.resume(&key, &agent, config).await,
        };
        match result {
            Ok(report) => {
                print_report(&report);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        }
    })
}

fn cmd_session_show(store: &dyn SessionStore, raw_key: &str) -> i32 {
    let key = match SessionKey::parse(raw_key) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let session = match store.load_session(&key) {
        Ok(Some(s)) => s,
        Ok(None) => {
            eprintln!("Error: session '{}' not found", key);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Session:   {}", session.session_id);
    if let Some(user) = &session.user_id {
        println!("User:      {}", user);
    }
    println!("Input:     {}", session.input_path);
    println!("Output:    {}", session.output_path);
    println!(
        "Cursor:    {}/{} ({} remaining)",
        session.cursor,
        session.total_rows,
        session.remaining_rows()
    );
    println!("Updated:   {}", session.updated_at.to_rfc3339());

    match store.list_runs(&key, 10) {
        Ok(runs) if runs.is_empty() => println!("No runs recorded."),
        Ok(runs) => {
            println!();
            println!("{:>6}  {:<22}  {:<12}  {:>6}  {:>8}", "RUN", "STATUS", "MODEL", "CHUNKS", "KEYWORDS");
            println!("{}", "-".repeat(62));
            for run in runs {
                println!(
                    "{:>6}  {:<22}  {:<12}  {:>6}  {:>8}",
                    run.run_id, run.status, run.model_id, run.stats.chunks_read, run.stats.keywords_added
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }
    0
}

fn cmd_session_list(store: &dyn SessionStore) -> i32 {
    let sessions = match store.list_sessions() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if sessions.is_empty() {
        println!("No sessions stored.");
        return 0;
    }
    println!("{:<36}  {:>9}  {:<25}", "SESSION", "CURSOR", "UPDATED");
    println!("{}", "-".repeat(74));
    for s in sessions {
        println!(
            "{:<36}  {:>9}  {:<25}",
            s.session_id,
            format!("{}/{}", s.cursor, s.total_rows),
            s.updated_at.to_rfc3339()
        );
    }
    0
}

fn cmd_agents() -> i32 {
    println!("{:<18}  {:<30}  {}", "ID", "NAME", "DESCRIPTION");
    println!("{}", "-".repeat(90));
    for spec in catalog::all() {
        println!("{:<18}  {:<30}  {}", spec.id, spec.name, spec.description);
    }
    0
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Agents = cli.command {
        std::process::exit(cmd_agents());
    }

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Serve { bind } => cmd_serve(settings, bind),
        Commands::Run {
            file,
            session,
            chunk_size,
            model,
            user,
        } => cmd_workflow(settings, Job::Fresh { file, session, user }, chunk_size, model),
        Commands::Resume { session, model } => cmd_workflow(settings, Job::Resume { session }, None, model),
        Commands::Session { action } => match open_store(&settings) {
            Ok(store) => match action {
                SessionAction::Show { key } => cmd_session_show(&store, &key),
                SessionAction::List => cmd_session_list(&store),
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Agents => cmd_agents(),
    };
    std::process::exit(code);
}
