//! Per-session file layout under the scratch directory

use super::key::SessionKey;
use std::path::{Path, PathBuf};

/// Scratch directory holding materialized inputs and output artifacts.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the scratch directory if needed.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Where a decoded upload for `key` is written.
    pub fn input_path(&self, key: &SessionKey, extension: &str) -> PathBuf {
        self.root.join(format!("input_excel_{key}.{extension}"))
    }

    /// The session's accumulated output spreadsheet.
    pub fn output_path(&self, key: &SessionKey) -> PathBuf {
        self.root.join(format!("session_keywords_{key}.xlsx"))
    }
}
