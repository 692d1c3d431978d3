//! Session store trait definitions

use super::key::SessionKey;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: Option<String>,
    /// Current input file
    pub input_path: String,
    /// Accumulated output spreadsheet
    pub output_path: String,
    /// Data rows of the current input already consumed
    pub cursor: usize,
    /// Data rows in the current input
    pub total_rows: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionRecord {
    pub fn remaining_rows(&self) -> usize {
        self.total_rows.saturating_sub(self.cursor)
    }
}

/// Counters collected over one workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Non-empty chunks read from the input
    pub chunks_read: usize,
    /// Chunks whose analysis was accumulated
    pub chunks_analyzed: usize,
    /// Chunks with no valid keywords
    pub chunks_skipped: usize,
    /// Chunks lost to model or write failures
    pub chunks_failed: usize,
    /// Evaluations appended to the artifact
    pub keywords_added: usize,
    /// Loop iterations executed
    pub iterations: usize,
}

/// One workflow run over a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub session_id: String,
    pub model_id: String,
    /// `running` until finished, then the final run status
    pub status: String,
    pub stats: RunStats,
    pub summary: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Trait for session storage backends
///
/// Implementations must be thread-safe (Send + Sync); the HTTP server shares
/// one store across all requests.
pub trait SessionStore: Send + Sync {
    // === Session Operations ===

    /// Register a freshly materialized input for a session, creating the
    /// session if needed. Resets the cursor to 0.
    fn begin_input(
        &self,
        key: &SessionKey,
        user_id: Option<&str>,
        input_path: &Path,
        output_path: &Path,
        total_rows: usize,
    ) -> StorageResult<SessionRecord>;

    /// Load a session by key
    fn load_session(&self, key: &SessionKey) -> StorageResult<Option<SessionRecord>>;

    /// Persist the cursor position of a session
    fn save_cursor(&self, key: &SessionKey, cursor: usize) -> StorageResult<()>;

    /// List all sessions, most recently updated first
    fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>>;

    // === Run Operations ===

    /// Record the start of a run, returning its id
    fn start_run(&self, key: &SessionKey, model_id: &str) -> StorageResult<i64>;

    /// Record the outcome of a run
    fn finish_run(&self, run_id: i64, status: &str, stats: &RunStats, summary: &str) -> StorageResult<()>;

    /// Most recent runs of a session, newest first
    fn list_runs(&self, key: &SessionKey, limit: usize) -> StorageResult<Vec<RunRecord>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: SessionStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
