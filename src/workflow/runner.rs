//! The chunked analysis loop
//!
//! A run holds its session's lock from input materialization to
//! finalization. Each iteration reads the next chunk, formats it, asks the
//! agent for an analysis, and appends the result to the session artifact.
//! The cursor is persisted after every iteration so an interrupted or capped
//! run can be resumed.

use super::accumulator::{Absorbed, Accumulated, Accumulator, Upstream};
use super::controller::{LoopController, LoopState, StopReason, DEFAULT_MAX_ITERATIONS};
use super::finalizer::{finalize, SessionSummary};
use super::formatter::format_chunk;
use super::input::{materialize, InputError};
use super::step::StepOutput;
use crate::agent::Agent;
use crate::session::{RunStats, SessionKey, SessionLocks, SessionRecord, SessionStore, StorageError, Workspace};
use crate::table::{Cursor, Table, TableError, TableInfo};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Rows per chunk when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Errors that abort a workflow run
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("chunk_size must be greater than 0")]
    InvalidChunkSize,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl WorkflowError {
    /// True when the caller supplied bad input rather than the run failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, WorkflowError::Input(_) | WorkflowError::InvalidChunkSize)
    }
}

/// Tunables of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub chunk_size: usize,
    pub max_iterations: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The input was read to the end
    Completed,
    /// The loop stopped at the iteration cap with rows left
    IterationCapReached,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::IterationCapReached => "iteration_cap_reached",
        }
    }

    /// Status of a run that stopped for `reason`. Hitting the cap only counts
    /// when the input still has rows after the cursor.
    pub fn settle(reason: Option<StopReason>, rows_left: bool) -> Self {
        match reason {
            Some(StopReason::IterationCap) if rows_left => RunStatus::IterationCapReached,
            _ => RunStatus::Completed,
        }
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub session_id: SessionKey,
    pub run_id: i64,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub table: TableInfo,
    /// Cursor after the run
    pub cursor: usize,
    pub status: RunStatus,
    pub stop_reason: Option<StopReason>,
    pub stats: RunStats,
    pub summary: SessionSummary,
    pub outputs: Vec<StepOutput>,
}

/// Where a run picks up its input.
enum Start {
    /// A new input for the session, read from row 0
    Fresh { input_path: PathBuf, user_id: Option<String> },
    /// The session's stored input, read from the stored cursor
    Resume(SessionRecord),
}

/// Drives workflow runs against a session store and a scratch workspace.
#[derive(Clone)]
pub struct WorkflowRunner {
    workspace: Workspace,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    accumulator: Accumulator,
}

impl WorkflowRunner {
    pub fn new(workspace: Workspace, store: Arc<dyn SessionStore>) -> Self {
        Self {
            accumulator: Accumulator::new(workspace.clone()),
            workspace,
            store,
            locks: SessionLocks::new(),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Decode a base64 upload into the session's input and process it.
    pub async fn process_base64(
        &self,
        key: &SessionKey,
        user_id: Option<&str>,
        payload: &str,
        agent: &Agent,
        config: WorkflowConfig,
    ) -> Result<WorkflowReport, WorkflowError> {
        check_config(&config)?;
        let _guard = self.locks.acquire(key).await;

        let workspace = self.workspace.clone();
        let task_key = key.clone();
        let payload = payload.to_string();
        let input_path = blocking(move || materialize(&workspace, &task_key, &payload)).await??;

        let start = Start::Fresh {
            input_path,
            user_id: user_id.map(str::to_string),
        };
        self.run_locked(key, start, agent, config).await
    }

    /// Process a local CSV/Excel file as the session's new input.
    pub async fn process_file(
        &self,
        key: &SessionKey,
        user_id: Option<&str>,
        path: &Path,
        agent: &Agent,
        config: WorkflowConfig,
    ) -> Result<WorkflowReport, WorkflowError> {
        check_config(&config)?;
        let _guard = self.locks.acquire(key).await;
        let start = Start::Fresh {
            input_path: path.to_path_buf(),
            user_id: user_id.map(str::to_string),
        };
        self.run_locked(key, start, agent, config).await
    }

    /// Continue a session's stored input from its persisted cursor.
    pub async fn resume(&self, key: &SessionKey, agent: &Agent, config: WorkflowConfig) -> Result<WorkflowReport, WorkflowError> {
        check_config(&config)?;
        let _guard = self.locks.acquire(key).await;
        let record = self
            .store
            .load_session(key)?
            .ok_or_else(|| WorkflowError::SessionNotFound(key.to_string()))?;
        self.run_locked(key, Start::Resume(record), agent, config).await
    }

    async fn run_locked(
        &self,
        key: &SessionKey,
        start: Start,
        agent: &Agent,
        config: WorkflowConfig,
    ) -> Result<WorkflowReport, WorkflowError> {
        let input_path = match &start {
            Start::Fresh { input_path, .. } => input_path.clone(),
            Start::Resume(record) => PathBuf::from(&record.input_path),
        };
        let open_path = input_path.clone();
        let table = blocking(move || Table::open(open_path)).await??;
        let output_path = self.accumulator.artifact_path(key);

        let mut cursor = match &start {
            Start::Fresh { user_id, .. } => {
                self.store
                    .begin_input(key, user_id.as_deref(), &input_path, &output_path, table.total_rows())?;
                Cursor::new()
            }
            Start::Resume(record) => Cursor::at(record.cursor.min(table.total_rows())),
        };

        let info = table.info();
        info!(
            session = %key,
            rows = info.total_rows,
            columns = info.total_columns,
            from = cursor.position(),
            chunk_size = config.chunk_size,
            model = agent.model_id(),
            "starting workflow run"
        );

        let run_id = self.store.start_run(key, agent.model_id())?;
        let mut stats = RunStats::default();
        let mut controller = LoopController::new(config.max_iterations);

        let looped = self
            .drive(key, &table, &mut cursor, agent, config.chunk_size, &mut controller, &mut stats)
            .await;
        stats.iterations = controller.iterations();
        if let Err(e) = looped {
            if let Err(finish_err) = self.store.finish_run(run_id, "failed", &stats, &e.to_string()) {
                warn!(run_id, error = %finish_err, "could not record failed run");
            }
            return Err(e);
        }

        let workspace = self.workspace.clone();
        let summary_key = key.clone();
        let summary = blocking(move || finalize(&workspace, &summary_key)).await?;

        let stop_reason = controller.stop_reason();
        let status = RunStatus::settle(stop_reason, table.has_more(&cursor));
        self.store.finish_run(run_id, status.as_str(), &stats, &summary.message)?;
        info!(
            session = %key,
            run_id,
            status = status.as_str(),
            iterations = stats.iterations,
            keywords_added = stats.keywords_added,
            "{}",
            summary.message
        );

        Ok(WorkflowReport {
            session_id: key.clone(),
            run_id,
            input_path,
            output_path,
            table: info,
            cursor: cursor.position(),
            status,
            stop_reason,
            stats,
            summary,
            outputs: controller.into_outputs(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        key: &SessionKey,
        table: &Table,
        cursor: &mut Cursor,
        agent: &Agent,
        chunk_size: usize,
        controller: &mut LoopController,
        stats: &mut RunStats,
    ) -> Result<(), WorkflowError> {
        loop {
            let output = self.step(key, table, cursor, agent, chunk_size, stats).await?;
            self.store.save_cursor(key, cursor.position())?;
            info!(session = %key, cursor = cursor.position(), "{}", output);
            if controller.record(output) == LoopState::Done {
                return Ok(());
            }
        }
    }

    /// One iteration: read, format, analyze, accumulate.
    async fn step(
        &self,
        key: &SessionKey,
        table: &Table,
        cursor: &mut Cursor,
        agent: &Agent,
        chunk_size: usize,
        stats: &mut RunStats,
    ) -> Result<StepOutput, WorkflowError> {
        let chunk = table.next_chunk(cursor, chunk_size);
        if chunk.is_end_of_data() {
            return Ok(StepOutput::end_of_file("No more rows to process"));
        }
        stats.chunks_read += 1;

        let upstream = if chunk.rows.is_empty() {
            stats.chunks_skipped += 1;
            Upstream::Signal(StepOutput::skipped(format!(
                "No valid keywords found in rows {} to {}",
                chunk.start + 1,
                chunk.end
            )))
        } else {
            let prompt = format_chunk(&chunk);
            tracing::debug!(session = %key, prompt = %prompt, "formatted chunk");
            match agent.analyze(&prompt).await {
                Ok(analysis) => Upstream::Analysis(analysis.valuable_keywords),
                Err(e) => {
                    warn!(session = %key, start = chunk.start, end = chunk.end, error = %e, "analysis failed, skipping chunk");
                    stats.chunks_failed += 1;
                    Upstream::Signal(StepOutput::error(format!(
                        "Analysis failed for rows {} to {}: {}",
                        chunk.start + 1,
                        chunk.end,
                        e
                    )))
                }
            }
        };

        let accumulator = self.accumulator.clone();
        let task_key = key.clone();
        let absorbed = blocking(move || accumulator.absorb(&task_key, upstream)).await?;

        Ok(match absorbed {
            Ok(Absorbed::PassedThrough(output)) => output,
            Ok(Absorbed::Appended(acc)) => {
                stats.chunks_analyzed += 1;
                stats.keywords_added += acc.added;
                let message = progress_message(&acc, cursor.position(), table.total_rows(), chunk_size);
                if table.has_more(cursor) {
                    StepOutput::continuing(message)
                } else {
                    StepOutput::complete(message)
                }
            }
            Err(e) => {
                warn!(session = %key, error = %e, "could not write artifact, chunk lost");
                stats.chunks_failed += 1;
                StepOutput::error(format!("Failed to save keywords: {e}"))
            }
        })
    }
}

fn check_config(config: &WorkflowConfig) -> Result<(), WorkflowError> {
    if config.chunk_size == 0 {
        return Err(WorkflowError::InvalidChunkSize);
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, WorkflowError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkflowError::Task(e.to_string()))
}

/// Describe progress after a chunk was accumulated.
pub fn progress_message(acc: &Accumulated, position: usize, total_rows: usize, chunk_size: usize) -> String {
    let remaining = total_rows.saturating_sub(position);
    let percent = if total_rows == 0 {
        100.0
    } else {
        position as f64 / total_rows as f64 * 100.0
    };
    format!(
        "Chunk processed: {} valuable keywords found. Total accumulated: {} keywords. \
         Progress: {:.1}% ({}/{} rows). Remaining chunks: {}. File: {}",
        acc.added,
        acc.total,
        percent,
        position,
        total_rows,
        remaining.div_ceil(chunk_size.max(1)),
        acc.path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{analysis_reply, catalog};
    use crate::llm::MockModel;
    use crate::session::{OpenStore, SqliteSessionStore};
    use crate::workflow::accumulator::read_artifact;
    use crate::workflow::StepStatus;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        runner: WorkflowRunner,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let runner = WorkflowRunner::new(Workspace::new(dir.path()), store);
        Harness { _dir: dir, runner }
    }

    fn write_csv(dir: &Path, name: &str, rows: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let mut text = String::from("keyword,category\n");
        for (k, c) in rows {
            text.push_str(&format!("{k},{c}\n"));
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    fn agent(model: &Arc<MockModel>) -> Agent {
        Agent::new(&catalog::KEYWORD_ANALYSIS, "o4-mini", model.clone())
    }

    fn key(s: &str) -> SessionKey {
        SessionKey::parse(s).unwrap()
    }

    #[tokio::test]
    async fn processes_every_chunk_and_completes() {
        let h = harness();
        let rows: Vec<(String, String)> = (0..5).map(|i| (format!("kw{i}"), "general".to_string())).collect();
        let refs: Vec<(&str, &str)> = rows.iter().map(|(k, c)| (k.as_str(), c.as_str())).collect();
        let input = write_csv(h.runner.workspace().root(), "in.csv", &refs);
        let model = Arc::new(MockModel::available().repeating(analysis_reply(&[("kw", "useful")])));

        let report = h
            .runner
            .process_file(&key("s"), None, &input, &agent(&model), WorkflowConfig { chunk_size: 2, max_iterations: 50 })
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.stop_reason, Some(StopReason::Complete));
        assert_eq!(report.stats.chunks_read, 3);
        assert_eq!(report.stats.keywords_added, 3);
        assert_eq!(report.cursor, 5);
        assert_eq!(report.outputs.last().unwrap().status, StepStatus::Complete);
        assert_eq!(report.summary.total_keywords, 3);

        let stored = h.runner.store().load_session(&key("s")).unwrap().unwrap();
        assert_eq!(stored.cursor, 5);
        let runs = h.runner.store().list_runs(&key("s"), 10).unwrap();
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].stats.chunks_read, 3);
    }

    #[tokio::test]
    async fn model_failures_skip_the_chunk() {
        let h = harness();
        let input = write_csv(h.runner.workspace().root(), "in.csv", &[("a", "x"), ("b", "y")]);
        let model = Arc::new(
            MockModel::available()
                .with_failure("timeout")
                .with_reply(analysis_reply(&[("b", "kept")])),
        );

        let report = h
            .runner
            .process_file(&key("f"), None, &input, &agent(&model), WorkflowConfig { chunk_size: 1, max_iterations: 50 })
            .await
            .unwrap();

        let statuses: Vec<_> = report.outputs.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![StepStatus::Error, StepStatus::Complete]);
        assert_eq!(report.stats.chunks_failed, 1);
        assert_eq!(read_artifact(&report.output_path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chunks_without_valid_keywords_are_skipped() {
        let h = harness();
        let input = write_csv(h.runner.workspace().root(), "in.csv", &[("nan", "x"), ("None", "y"), ("sage", "z")]);
        let model = Arc::new(MockModel::available().repeating(analysis_reply(&[("sage", "ok")])));

        let report = h
            .runner
            .process_file(&key("k"), None, &input, &agent(&model), WorkflowConfig { chunk_size: 2, max_iterations: 50 })
            .await
            .unwrap();

        let statuses: Vec<_> = report.outputs.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![StepStatus::Skipped, StepStatus::Complete]);
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn cap_stops_early_and_resume_continues() {
        let h = harness();
        let input = write_csv(h.runner.workspace().root(), "in.csv", &[("a", "x"), ("b", "x"), ("c", "x")]);
        let model = Arc::new(MockModel::available().repeating(analysis_reply(&[("k", "r")])));
        let capped = WorkflowConfig { chunk_size: 1, max_iterations: 2 };

        let first = h
            .runner
            .process_file(&key("r"), None, &input, &agent(&model), capped)
            .await
            .unwrap();
        assert_eq!(first.status, RunStatus::IterationCapReached);
        assert_eq!(first.cursor, 2);

        let second = h.runner.resume(&key("r"), &agent(&model), capped).await.unwrap();
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.cursor, 3);
        assert_eq!(second.summary.total_keywords, 3);
    }

    #[tokio::test]
    async fn cap_on_the_last_row_still_completes() {
        let h = harness();
        let input = write_csv(h.runner.workspace().root(), "in.csv", &[("a", "x"), ("b", "y")]);
        let model = Arc::new(
            MockModel::available()
                .with_reply(analysis_reply(&[("a", "kept")]))
                .with_failure("timeout"),
        );
        let capped = WorkflowConfig { chunk_size: 1, max_iterations: 2 };

        let report = h
            .runner
            .process_file(&key("edge"), None, &input, &agent(&model), capped)
            .await
            .unwrap();

        assert_eq!(report.cursor, 2);
        assert_eq!(report.stop_reason, Some(StopReason::IterationCap));
        assert_eq!(report.status, RunStatus::Completed);
        let runs = h.runner.store().list_runs(&key("edge"), 10).unwrap();
        assert_eq!(runs[0].status, "completed");
    }

    #[test]
    fn status_settles_on_rows_left() {
        assert_eq!(RunStatus::settle(Some(StopReason::IterationCap), true), RunStatus::IterationCapReached);
        assert_eq!(RunStatus::settle(Some(StopReason::IterationCap), false), RunStatus::Completed);
        assert_eq!(RunStatus::settle(Some(StopReason::Complete), false), RunStatus::Completed);
        assert_eq!(RunStatus::settle(None, true), RunStatus::Completed);
    }

    #[tokio::test]
    async fn resume_of_unknown_session_fails() {
        let h = harness();
        let err = h
            .runner
            .resume(&key("ghost"), &agent(&Arc::new(MockModel::available())), WorkflowConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let h = harness();
        let err = h
            .runner
            .process_base64(&key("z"), None, "UEsDBA==", &agent(&Arc::new(MockModel::available())), WorkflowConfig { chunk_size: 0, max_iterations: 50 })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidChunkSize));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn bad_payload_is_a_client_error() {
        let h = harness();
        let err = h
            .runner
            .process_base64(&key("b"), None, "%%%", &agent(&Arc::new(MockModel::available())), WorkflowConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Input(InputError::Base64(_))));
        assert!(err.is_client_error());
    }

    #[test]
    fn progress_message_reports_remaining_chunks() {
        let acc = Accumulated {
            added: 2,
            total: 7,
            path: PathBuf::from("tmp/session_keywords_s.xlsx"),
        };
        let message = progress_message(&acc, 100, 250, 100);
        assert!(message.contains("2 valuable keywords found"));
        assert!(message.contains("Total accumulated: 7"));
        assert!(message.contains("40.0% (100/250 rows)"));
        assert!(message.contains("Remaining chunks: 2"));
    }
}
