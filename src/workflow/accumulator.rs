//! Append-only per-session output artifact
//!
//! Each session owns one spreadsheet with a `keyword` and a `reason` column.
//! Accumulating reads the existing rows, appends the new evaluations, and
//! replaces the file through a temporary sibling so readers never observe a
//! half-written artifact.

use super::step::StepOutput;
use crate::agent::Evaluation;
use crate::session::{SessionKey, Workspace};
use crate::table::cell_text;
use calamine::{open_workbook_auto, Reader};
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header row of the output artifact.
pub const OUTPUT_COLUMNS: [&str; 2] = ["keyword", "reason"];

/// Name of the single sheet in the output artifact.
pub const OUTPUT_SHEET: &str = "keywords";

/// Errors raised while reading or writing an output artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("artifact {} has no keyword column (header: {header:?})", path.display())]
    Header { path: PathBuf, header: Vec<String> },

    #[error("failed to write artifact {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read every evaluation stored in an artifact.
///
/// A missing file holds no rows.
pub fn read_artifact(path: &Path) -> Result<Vec<Evaluation>, ArtifactError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let read_err = |reason: String| ArtifactError::Read {
        path: path.to_path_buf(),
        reason,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| read_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| read_err("workbook has no sheets".to_string()))?
        .map_err(|e| read_err(e.to_string()))?;

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(cell_text).collect(),
        None => return Ok(Vec::new()),
    };
    let position = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let keyword_col = position(OUTPUT_COLUMNS[0]).ok_or_else(|| ArtifactError::Header {
        path: path.to_path_buf(),
        header: header.clone(),
    })?;
    let reason_col = position(OUTPUT_COLUMNS[1]);

    let cell = |row: &[calamine::Data], col: usize| row.get(col).map(cell_text).unwrap_or_default();
    Ok(rows
        .map(|row| Evaluation {
            keyword: cell(row, keyword_col),
            reason: reason_col.map(|c| cell(row, c)).unwrap_or_default(),
        })
        .collect())
}

/// Replace the artifact at `path` with exactly `rows`.
pub fn write_artifact(path: &Path, rows: &[Evaluation]) -> Result<(), ArtifactError> {
    let write_err = |e: rust_xlsxwriter::XlsxError| ArtifactError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(OUTPUT_SHEET).map_err(write_err)?;
        let bold = Format::new().set_bold();
        for (col, name) in OUTPUT_COLUMNS.iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, *name, &bold)
                .map_err(write_err)?;
        }
        for (i, evaluation) in rows.iter().enumerate() {
            let row = u32::try_from(i + 1).map_err(|_| ArtifactError::Write {
                path: path.to_path_buf(),
                reason: "too many rows".to_string(),
            })?;
            sheet.write_string(row, 0, evaluation.keyword.as_str()).map_err(write_err)?;
            sheet.write_string(row, 1, evaluation.reason.as_str()).map_err(write_err)?;
        }
    }

    let tmp = temp_path(path);
    workbook.save(&tmp).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// What reaches the accumulator from the analysis step.
#[derive(Debug, Clone)]
pub enum Upstream {
    /// Evaluations to append
    Analysis(Vec<Evaluation>),
    /// A control signal produced upstream, forwarded untouched
    Signal(StepOutput),
}

/// Outcome of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulated {
    /// Rows appended by this call
    pub added: usize,
    /// Rows in the artifact afterwards
    pub total: usize,
    pub path: PathBuf,
}

/// What the accumulator did with an upstream value.
#[derive(Debug, Clone)]
pub enum Absorbed {
    PassedThrough(StepOutput),
    Appended(Accumulated),
}

/// Appends evaluations to per-session artifacts in a workspace.
#[derive(Debug, Clone)]
pub struct Accumulator {
    workspace: Workspace,
}

impl Accumulator {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn artifact_path(&self, key: &SessionKey) -> PathBuf {
        self.workspace.output_path(key)
    }

    /// Append `evaluations` to the session's artifact in order.
    ///
    /// An unreadable existing artifact is logged and treated as empty. With
    /// nothing to append the file is left as it is.
    pub fn accumulate(&self, key: &SessionKey, evaluations: &[Evaluation]) -> Result<Accumulated, ArtifactError> {
        let path = self.artifact_path(key);
        let mut rows = match read_artifact(&path) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "output artifact unreadable, starting from empty");
                Vec::new()
            }
        };

        if evaluations.is_empty() {
            return Ok(Accumulated {
                added: 0,
                total: rows.len(),
                path,
            });
        }

        rows.extend_from_slice(evaluations);
        write_artifact(&path, &rows)?;
        tracing::debug!(session = %key, added = evaluations.len(), total = rows.len(), "artifact updated");

        Ok(Accumulated {
            added: evaluations.len(),
            total: rows.len(),
            path,
        })
    }

    /// Append analysis results, or forward a control signal unchanged.
    pub fn absorb(&self, key: &SessionKey, upstream: Upstream) -> Result<Absorbed, ArtifactError> {
        match upstream {
            Upstream::Signal(output) => Ok(Absorbed::PassedThrough(output)),
            Upstream::Analysis(evaluations) => self.accumulate(key, &evaluations).map(Absorbed::Appended),
        }
    }
}
