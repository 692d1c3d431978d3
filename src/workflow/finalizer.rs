//! End-of-session summary

use super::accumulator::read_artifact;
use crate::session::{SessionKey, Workspace};
use serde::Serialize;
use std::path::PathBuf;

/// Summary produced once the loop stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Rows in the session's artifact
    pub total_keywords: usize,
    pub artifact_path: PathBuf,
    pub message: String,
}

/// Count the session's accumulated rows and describe the outcome.
///
/// An unreadable artifact counts as zero rows.
pub fn finalize(workspace: &Workspace, key: &SessionKey) -> SessionSummary {
    let artifact_path = workspace.output_path(key);
    let total_keywords = match read_artifact(&artifact_path) {
        Ok(rows) => rows.len(),
        Err(e) => {
            tracing::warn!(session = %key, error = %e, "could not read artifact while finalizing");
            0
        }
    };

    let message = if total_keywords > 0 {
        format!(
            "Session complete! Successfully processed {} total valuable keywords. Your Excel file is ready: {}",
            total_keywords,
            artifact_path.display()
        )
    } else {
        "Session complete! No valuable keywords found in this session.".to_string()
    };

    SessionSummary {
        total_keywords,
        artifact_path,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Evaluation;
    use crate::workflow::accumulator::write_artifact;
    use tempfile::TempDir;

    #[test]
    fn reports_accumulated_total() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        let key = SessionKey::parse("done").unwrap();
        let rows = vec![Evaluation::new("sage", "a"), Evaluation::new("mint", "b")];
        write_artifact(&ws.output_path(&key), &rows).unwrap();

        let summary = finalize(&ws, &key);
        assert_eq!(summary.total_keywords, 2);
        assert!(summary.message.starts_with("Session complete! Successfully processed 2 total valuable keywords."));
        assert!(summary.message.contains("session_keywords_done.xlsx"));
    }

    #[test]
    fn reports_no_keywords_without_artifact() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        let key = SessionKey::parse("empty").unwrap();

        let summary = finalize(&ws, &key);
        assert_eq!(summary.total_keywords, 0);
        assert_eq!(summary.message, "Session complete! No valuable keywords found in this session.");
    }
}
