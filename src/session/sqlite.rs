//! SQLite storage backend for sessions and runs

use super::key::SessionKey;
use super::store::{OpenStore, RunRecord, RunStats, SessionRecord, SessionStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed session store
///
/// One database file with a `sessions` table (cursor and file paths per
/// session key) and a `runs` table (one row per workflow run).
/// Thread-safe via internal mutex on the connection.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

const SESSION_COLUMNS: &str =
    "session_id, user_id, input_path, output_path, cursor, total_rows, created_at, updated_at";

const RUN_COLUMNS: &str = "run_id, session_id, model_id, status, chunks_read, chunks_analyzed, \
     chunks_skipped, chunks_failed, keywords_added, iterations, summary, started_at, finished_at";

impl SqliteSessionStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT,
                input_path TEXT NOT NULL,
                output_path TEXT NOT NULL,
                cursor INTEGER NOT NULL DEFAULT 0,
                total_rows INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                status TEXT NOT NULL,
                chunks_read INTEGER NOT NULL DEFAULT 0,
                chunks_analyzed INTEGER NOT NULL DEFAULT 0,
                chunks_skipped INTEGER NOT NULL DEFAULT 0,
                chunks_failed INTEGER NOT NULL DEFAULT 0,
                keywords_added INTEGER NOT NULL DEFAULT 0,
                iterations INTEGER NOT NULL DEFAULT 0,
                summary TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                FOREIGN KEY (session_id) REFERENCES sessions(session_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_runs_session
                ON runs(session_id, run_id);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn parse_time(text: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    /// Raw session columns, converted by `session_from_raw`.
    #[allow(clippy::type_complexity)]
    fn session_raw(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, String, String, i64, i64, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn session_from_raw(
        raw: (String, Option<String>, String, String, i64, i64, String, String),
    ) -> StorageResult<SessionRecord> {
        let (session_id, user_id, input_path, output_path, cursor, total_rows, created_at, updated_at) = raw;
        Ok(SessionRecord {
            session_id,
            user_id,
            input_path,
            output_path,
            cursor: cursor.max(0) as usize,
            total_rows: total_rows.max(0) as usize,
            created_at: Self::parse_time(&created_at)?,
            updated_at: Self::parse_time(&updated_at)?,
        })
    }

    fn run_from_row(row: &Row<'_>) -> rusqlite::Result<(RunRecord, String, Option<String>)> {
        let count = |idx: usize| -> rusqlite::Result<usize> { Ok(row.get::<_, i64>(idx)?.max(0) as usize) };
        let record = RunRecord {
            run_id: row.get(0)?,
            session_id: row.get(1)?,
            model_id: row.get(2)?,
            status: row.get(3)?,
            stats: RunStats {
                chunks_read: count(4)?,
                chunks_analyzed: count(5)?,
                chunks_skipped: count(6)?,
                chunks_failed: count(7)?,
                keywords_added: count(8)?,
                iterations: count(9)?,
            },
            summary: row.get(10)?,
            // Timestamps are filled in by the caller after parsing.
            started_at: DateTime::<Utc>::MIN_UTC,
            finished_at: None,
        };
        Ok((record, row.get(11)?, row.get(12)?))
    }
}

impl OpenStore for SqliteSessionStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SessionStore for SqliteSessionStore {
    fn begin_input(
        &self,
        key: &SessionKey,
        user_id: Option<&str>,
        input_path: &Path,
        output_path: &Path,
        total_rows: usize,
    ) -> StorageResult<SessionRecord> {
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                r#"
                INSERT INTO sessions (session_id, user_id, input_path, output_path, cursor, total_rows, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)
                ON CONFLICT(session_id) DO UPDATE SET
                    user_id = COALESCE(excluded.user_id, sessions.user_id),
                    input_path = excluded.input_path,
                    output_path = excluded.output_path,
                    cursor = 0,
                    total_rows = excluded.total_rows,
                    updated_at = excluded.updated_at
                "#,
                params![
                    key.as_str(),
                    user_id,
                    input_path.to_string_lossy().into_owned(),
                    output_path.to_string_lossy().into_owned(),
                    total_rows as i64,
                    now,
                ],
            )?;
        }
        self.load_session(key)?
            .ok_or_else(|| StorageError::SessionNotFound(key.to_string()))
    }

    fn load_session(&self, key: &SessionKey) -> StorageResult<Option<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![key.as_str()],
                Self::session_raw,
            )
            .optional()?;
        raw.map(Self::session_from_raw).transpose()
    }

    fn save_cursor(&self, key: &SessionKey, cursor: usize) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET cursor = ?2, updated_at = ?3 WHERE session_id = ?1",
            params![key.as_str(), cursor as i64, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(StorageError::SessionNotFound(key.to_string()));
        }
        Ok(())
    }

    fn list_sessions(&self) -> StorageResult<Vec<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC, session_id"
        ))?;
        let raws = stmt
            .query_map([], Self::session_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(Self::session_from_raw).collect()
    }

    fn start_run(&self, key: &SessionKey, model_id: &str) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs (session_id, model_id, status, started_at) VALUES (?1, ?2, 'running', ?3)",
            params![key.as_str(), model_id, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, status: &str, stats: &RunStats, summary: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"
            UPDATE runs SET
                status = ?2,
                chunks_read = ?3,
                chunks_analyzed = ?4,
                chunks_skipped = ?5,
                chunks_failed = ?6,
                keywords_added = ?7,
                iterations = ?8,
                summary = ?9,
                finished_at = ?10
            WHERE run_id = ?1
            "#,
            params![
                run_id,
                status,
                stats.chunks_read as i64,
                stats.chunks_analyzed as i64,
                stats.chunks_skipped as i64,
                stats.chunks_failed as i64,
                stats.keywords_added as i64,
                stats.iterations as i64,
                summary,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn list_runs(&self, key: &SessionKey, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE session_id = ?1 ORDER BY run_id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![key.as_str(), limit as i64], Self::run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut record, started_at, finished_at)| {
                record.started_at = Self::parse_time(&started_at)?;
                record.finished_at = finished_at.as_deref().map(Self::parse_time).transpose()?;
                Ok(record)
            })
            .collect()
    }
}
