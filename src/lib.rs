//! Chunkflow: chunked spreadsheet workflows driven by hosted LLM agents
//!
//! Reads keyword tables (CSV/TSV or Excel) in bounded chunks, asks an
//! analysis agent to judge each chunk, and accumulates the accepted keywords
//! into one output spreadsheet per session.
//!
//! # Core Concepts
//!
//! - **Table / Cursor**: a loaded source and the position of the next unread row
//! - **Agent**: a prompt bound to a chat model that returns a structured analysis
//! - **Session**: a key that owns a cursor, an input file, and an output artifact
//! - **Workflow**: the loop that reads, analyzes, and accumulates until the input ends
//!
//! # Example
//!
//! ```
//! use chunkflow::{Cursor, Table};
//!
//! let table = Table::from_rows(
//!     vec!["Keyword".into(), "Category".into()],
//!     vec![vec!["ginseng".into(), "beginners".into()]],
//! );
//! let mut cursor = Cursor::new();
//! let chunk = table.next_chunk(&mut cursor, 100);
//! assert_eq!(chunk.rows.len(), 1);
//! assert!(!table.has_more(&cursor));
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod server;
pub mod session;
pub mod table;
pub mod workflow;

pub use agent::{Agent, AgentSpec, ChunkAnalysis, Evaluation, DEFAULT_MODEL_ID};
pub use config::{ConfigError, Settings};
pub use llm::{ChatModel, MockModel, ModelError, OpenAiChat};
pub use session::{
    OpenStore, SessionKey, SessionLocks, SessionRecord, SessionStore, SqliteSessionStore, StorageError, Workspace,
};
pub use table::{read_chunk, Chunk, ChunkRow, ColumnMap, Cursor, Table, TableError};
pub use workflow::{
    LoopController, StepOutput, StepStatus, WorkflowConfig, WorkflowError, WorkflowReport, WorkflowRunner,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
