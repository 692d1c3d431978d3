//! Chunk to prompt formatting

use crate::table::Chunk;
use std::fmt::Write;

/// Render a chunk as the instruction block sent to the analysis agent.
///
/// Row numbers in the header are 1-based and cover the whole input range,
/// including rows dropped for missing keywords.
pub fn format_chunk(chunk: &Chunk) -> String {
    let mut text = format!(
        "Please analyze the following keywords from the Excel file (rows {} to {}):\n\n",
        chunk.start + 1,
        chunk.end
    );
    for row in &chunk.rows {
        let _ = writeln!(text, "- Keyword: {}, Category: {}", row.keyword, row.category);
    }
    text
}
