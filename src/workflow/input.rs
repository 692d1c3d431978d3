//! Materializing base64 uploads into the workspace

use crate::session::{SessionKey, Workspace};
use crate::table::has_spreadsheet_signature;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding an upload
#[derive(Debug, Error)]
pub enum InputError {
    #[error("no base64 payload provided")]
    Empty,

    #[error("invalid base64 string: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded payload is not an Excel file (.xlsx or .xls)")]
    NotSpreadsheet,

    #[error("failed to write input file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Decode a base64 payload and check that it holds a spreadsheet.
///
/// Whitespace (including line breaks from wrapped encoders) is ignored.
pub fn decode_payload(raw: &str) -> Result<Vec<u8>, InputError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(InputError::Empty);
    }
    let bytes = STANDARD.decode(compact.as_bytes())?;
    if !has_spreadsheet_signature(&bytes) {
        return Err(InputError::NotSpreadsheet);
    }
    Ok(bytes)
}

/// File extension matching a spreadsheet's container format.
pub fn extension_for(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"PK\x03\x04") {
        "xlsx"
    } else {
        "xls"
    }
}

/// Decode `raw` and write it as the session's input file.
///
/// Replaces any earlier input for the same session.
pub fn materialize(workspace: &Workspace, key: &SessionKey, raw: &str) -> Result<PathBuf, InputError> {
    let bytes = decode_payload(raw)?;
    let path = workspace.input_path(key, extension_for(&bytes));
    let write = |source| InputError::Write {
        path: path.clone(),
        source,
    };

    workspace.ensure().map_err(write)?;
    std::fs::write(&path, &bytes).map_err(write)?;
    tracing::info!(session = %key, path = %path.display(), bytes = bytes.len(), "input materialized");
    Ok(path)
}
