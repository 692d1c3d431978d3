//! Session state: keys, file layout, persistence, and per-session locking
//!
//! A session owns one cursor over its current input and one accumulated
//! output artifact. The cursor lives in the [`SessionStore`]; the artifact
//! lives in the [`Workspace`].

mod key;
mod locks;
mod sqlite;
mod store;
mod workspace;

pub use key::{InvalidSessionKey, SessionKey};
pub use locks::{SessionGuard, SessionLocks};
pub use sqlite::SqliteSessionStore;
pub use store::{OpenStore, RunRecord, RunStats, SessionRecord, SessionStore, StorageError, StorageResult};
pub use workspace::Workspace;
