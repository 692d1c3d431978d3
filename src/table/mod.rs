//! Tabular keyword sources
//!
//! Loads CSV/TSV and Excel/ODS files and hands them out in bounded chunks of
//! `(keyword, category)` rows, tracking progress with an explicit [`Cursor`].

mod columns;
mod reader;

pub(crate) use reader::cell_text;
pub use columns::{is_missing, ColumnMap, CATEGORY_SYNONYMS, DEFAULT_CATEGORY, KEYWORD_SYNONYMS};
pub use reader::{
    has_spreadsheet_signature, read_chunk, Chunk, ChunkRow, Cursor, SourceFormat, Table,
    TableError, TableInfo, TableResult, PREFERRED_SHEET, SPREADSHEET_SIGNATURES,
};
