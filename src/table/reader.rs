//! Loading tabular sources and reading them in bounded chunks

use super::columns::ColumnMap;
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sheet read in preference to the first sheet when a workbook has it.
pub const PREFERRED_SHEET: &str = "CATEGORY";

/// File signatures of spreadsheet containers (xlsx/ods zip, xls OLE2, BIFF).
pub const SPREADSHEET_SIGNATURES: &[&[u8]] = &[
    b"\x50\x4B\x03\x04",
    b"\xD0\xCF\x11\xE0",
    b"\x09\x08\x10\x00",
];

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "xla", "ods"];

/// Errors raised while opening a tabular source
#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("workbook {} has no sheets", .0.display())]
    NoSheets(PathBuf),

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

/// Parsing engine used for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Excel/ODS workbooks
    Workbook,
    /// Delimited text with the given separator
    Delimited(char),
}

impl SourceFormat {
    /// Pick the engine for a file from its leading bytes and extension.
    ///
    /// Returns the format and whether it was established by signature.
    fn detect(path: &Path, head: &[u8]) -> (Self, bool) {
        if has_spreadsheet_signature(head) {
            return (SourceFormat::Workbook, true);
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let format = if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
            SourceFormat::Workbook
        } else if ext == "tsv" {
            SourceFormat::Delimited('\t')
        } else {
            SourceFormat::Delimited(',')
        };
        (format, false)
    }

    fn alternate(self) -> Self {
        match self {
            SourceFormat::Workbook => SourceFormat::Delimited(','),
            SourceFormat::Delimited(_) => SourceFormat::Workbook,
        }
    }
}

/// True when `bytes` start with a known spreadsheet container signature.
pub fn has_spreadsheet_signature(bytes: &[u8]) -> bool {
    SPREADSHEET_SIGNATURES.iter().any(|sig| bytes.starts_with(sig))
}

/// Position in a table: the number of data rows already consumed.
///
/// Only [`Table::next_chunk`] advances a cursor. Sessions persist the position
/// between runs and restore it with [`Cursor::at`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a cursor at a stored position.
    pub fn at(position: usize) -> Self {
        Self { position }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// A keyword row that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRow {
    pub keyword: String,
    pub category: String,
}

/// A bounded slice of a table: data rows `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Valid rows, in input order
    pub rows: Vec<ChunkRow>,
    /// First data row covered (0-based)
    pub start: usize,
    /// One past the last data row covered
    pub end: usize,
    /// Rows in range that were dropped for a missing keyword
    pub dropped: usize,
}

impl Chunk {
    fn end_of_data(position: usize) -> Self {
        Self {
            rows: Vec::new(),
            start: position,
            end: position,
            dropped: 0,
        }
    }

    /// True when the read found no rows left.
    pub fn is_end_of_data(&self) -> bool {
        self.start == self.end
    }

    /// Number of input rows the chunk covered, valid or not.
    pub fn span(&self) -> usize {
        self.end - self.start
    }
}

/// Summary of a loaded table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub format: SourceFormat,
    pub sheet: Option<String>,
    pub total_rows: usize,
    pub total_columns: usize,
    pub column_names: Vec<String>,
    pub keyword_column: Option<String>,
    pub category_column: Option<String>,
}

/// A fully loaded tabular source: a header row plus data rows as text.
#[derive(Debug, Clone)]
pub struct Table {
    format: SourceFormat,
    sheet: Option<String>,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: ColumnMap,
}

impl Table {
    /// Open a CSV/TSV or workbook file.
    ///
    /// The engine is picked by file signature, then extension. If it fails and
    /// the format was not proven by signature, the other engine is tried once;
    /// when both fail the first error is returned.
    pub fn open(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| TableError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let (format, by_signature) = SourceFormat::detect(path, &bytes);
        match Self::parse(path, &bytes, format) {
            Ok(table) => Ok(table),
            Err(primary) if !by_signature => {
                let fallback = format.alternate();
                tracing::warn!(
                    path = %path.display(),
                    error = %primary,
                    ?fallback,
                    "primary parser failed, retrying with fallback engine"
                );
                Self::parse(path, &bytes, fallback).map_err(|_| primary)
            }
            Err(primary) => Err(primary),
        }
    }

    /// Build a table from in-memory header and rows.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = ColumnMap::resolve(&headers);
        Self {
            format: SourceFormat::Delimited(','),
            sheet: None,
            headers,
            rows,
            columns,
        }
    }

    fn parse(path: &Path, bytes: &[u8], format: SourceFormat) -> TableResult<Self> {
        let (sheet, mut grid) = match format {
            SourceFormat::Workbook => {
                let (sheet, grid) = load_workbook(path, bytes)?;
                (Some(sheet), grid)
            }
            SourceFormat::Delimited(sep) => (None, load_delimited(path, bytes, sep)?),
        };

        let headers = if grid.is_empty() {
            Vec::new()
        } else {
            grid.remove(0)
        };
        let columns = ColumnMap::resolve(&headers);

        Ok(Self {
            format,
            sheet,
            headers,
            rows: grid,
            columns,
        })
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn total_columns(&self) -> usize {
        self.headers.len()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> ColumnMap {
        self.columns
    }

    /// True when rows remain past `cursor`.
    pub fn has_more(&self, cursor: &Cursor) -> bool {
        cursor.position < self.rows.len()
    }

    pub fn info(&self) -> TableInfo {
        TableInfo {
            format: self.format,
            sheet: self.sheet.clone(),
            total_rows: self.total_rows(),
            total_columns: self.total_columns(),
            column_names: self.headers.clone(),
            keyword_column: self.headers.get(self.columns.keyword).cloned(),
            category_column: self
                .columns
                .category
                .and_then(|idx| self.headers.get(idx).cloned()),
        }
    }

    /// Read the next chunk of up to `chunk_size` rows and advance the cursor.
    ///
    /// At end of data, returns an empty chunk and leaves the cursor unchanged.
    pub fn next_chunk(&self, cursor: &mut Cursor, chunk_size: usize) -> Chunk {
        let total = self.rows.len();
        if cursor.position >= total {
            return Chunk::end_of_data(cursor.position);
        }

        let start = cursor.position;
        let end = start.saturating_add(chunk_size.max(1)).min(total);
        let mut rows = Vec::with_capacity(end - start);
        let mut dropped = 0;
        for row in &self.rows[start..end] {
            match self.columns.extract(row) {
                Some((keyword, category)) => rows.push(ChunkRow { keyword, category }),
                None => dropped += 1,
            }
        }

        cursor.position = end;
        Chunk {
            rows,
            start,
            end,
            dropped,
        }
    }
}

/// Open `file_path`, read the chunk at `cursor`, and advance the cursor.
pub fn read_chunk(file_path: impl AsRef<Path>, cursor: &mut Cursor, chunk_size: usize) -> TableResult<Chunk> {
    let table = Table::open(file_path)?;
    Ok(table.next_chunk(cursor, chunk_size))
}

fn load_workbook(path: &Path, bytes: &[u8]) -> TableResult<(String, Vec<Vec<String>>)> {
    // Content sniffing first; the extension-driven opener covers formats
    // the sniffer does not recognise.
    let mut workbook = match open_workbook_auto_from_rs(std::io::Cursor::new(bytes.to_vec())) {
        Ok(wb) => WorkbookHandle::Memory(wb),
        Err(_) => WorkbookHandle::File(open_workbook_auto(path).map_err(|e| TableError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?),
    };

    let sheet_names = workbook.sheet_names();
    let sheet = if sheet_names.iter().any(|n| n == PREFERRED_SHEET) {
        PREFERRED_SHEET.to_string()
    } else {
        tracing::debug!(?sheet_names, "no {} sheet, using first sheet", PREFERRED_SHEET);
        sheet_names
            .first()
            .cloned()
            .ok_or_else(|| TableError::NoSheets(path.to_path_buf()))?
    };

    let grid = workbook.rows(&sheet).map_err(|reason| TableError::Parse {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok((sheet, grid))
}

enum WorkbookHandle {
    Memory(calamine::Sheets<std::io::Cursor<Vec<u8>>>),
    File(calamine::Sheets<std::io::BufReader<std::fs::File>>),
}

impl WorkbookHandle {
    fn sheet_names(&self) -> Vec<String> {
        match self {
            WorkbookHandle::Memory(wb) => wb.sheet_names(),
            WorkbookHandle::File(wb) => wb.sheet_names(),
        }
    }

    fn rows(&mut self, sheet: &str) -> Result<Vec<Vec<String>>, String> {
        let range = match self {
            WorkbookHandle::Memory(wb) => wb.worksheet_range(sheet).map_err(|e| e.to_string())?,
            WorkbookHandle::File(wb) => wb.worksheet_range(sheet).map_err(|e| e.to_string())?,
        };
        Ok(range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

/// Render a workbook cell as text.
///
/// Whole floats print without a fractional part so numeric keywords
/// ("2024") survive the trip through Excel's number storage.
pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn load_delimited(path: &Path, bytes: &[u8], separator: char) -> TableResult<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(separator as u8)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TableError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(rows: &[&[&str]]) -> Table {
        Table::from_rows(
            vec!["keyword".to_string(), "category".to_string()],
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn numbered(n: usize) -> Table {
        let rows: Vec<Vec<String>> = (0..n)
            .map(|i| vec![format!("kw{i}"), "general".to_string()])
            .collect();
        Table::from_rows(vec!["keyword".to_string(), "category".to_string()], rows)
    }

    #[test]
    fn chunks_cover_every_row_exactly_once() {
        for total in [0usize, 1, 7, 10, 23] {
            for chunk_size in [1usize, 3, 10, 100] {
                let t = numbered(total);
                let mut cursor = Cursor::new();
                let mut seen = Vec::new();
                loop {
                    let chunk = t.next_chunk(&mut cursor, chunk_size);
                    if chunk.is_end_of_data() {
                        break;
                    }
                    assert_eq!(chunk.start, seen.len());
                    assert!(chunk.span() <= chunk_size);
                    seen.extend(chunk.rows.into_iter().map(|r| r.keyword));
                }
                let expected: Vec<String> = (0..total).map(|i| format!("kw{i}")).collect();
                assert_eq!(seen, expected, "total={total} chunk_size={chunk_size}");
                assert_eq!(cursor.position(), total);
            }
        }
    }

    #[test]
    fn huge_chunk_size_reads_the_rest() {
        let t = numbered(3);
        let mut cursor = Cursor::at(1);
        let chunk = t.next_chunk(&mut cursor, usize::MAX);
        assert_eq!((chunk.start, chunk.end), (1, 3));
        assert_eq!(chunk.rows.len(), 2);
        assert_eq!(cursor.position(), 3);
        assert!(t.next_chunk(&mut cursor, usize::MAX).is_end_of_data());
    }

    #[test]
    fn end_of_data_leaves_cursor_unchanged() {
        let t = numbered(3);
        let mut cursor = Cursor::at(3);
        let chunk = t.next_chunk(&mut cursor, 10);
        assert!(chunk.is_end_of_data());
        assert!(chunk.rows.is_empty());
        assert_eq!(cursor.position(), 3);
        assert!(!t.has_more(&cursor));
    }

    #[test]
    fn invalid_rows_are_dropped_but_consumed() {
        let t = table(&[
            &["ginseng", "beginners"],
            &["", "beginners"],
            &["NaN", "experts"],
            &["rare compound X", "experts"],
        ]);
        let mut cursor = Cursor::new();
        let chunk = t.next_chunk(&mut cursor, 100);
        assert_eq!(chunk.rows.len(), 2);
        assert_eq!(chunk.dropped, 2);
        assert_eq!((chunk.start, chunk.end), (0, 4));
        assert_eq!(chunk.rows[1].keyword, "rare compound X");
    }

    #[test]
    fn reads_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "Search Term,Audience Group").unwrap();
        writeln!(f, "ginseng,beginners").unwrap();
        writeln!(f, "valerian root,intermediates").unwrap();
        drop(f);

        let t = Table::open(&path).unwrap();
        let info = t.info();
        assert_eq!(info.format, SourceFormat::Delimited(','));
        assert_eq!(info.total_rows, 2);
        assert_eq!(info.total_columns, 2);
        assert_eq!(info.keyword_column.as_deref(), Some("Search Term"));
        assert_eq!(info.category_column.as_deref(), Some("Audience Group"));

        let mut cursor = Cursor::new();
        let chunk = read_chunk(&path, &mut cursor, 1).unwrap();
        assert_eq!(chunk.rows[0].keyword, "ginseng");
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn empty_file_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, b"").unwrap();

        let t = Table::open(&path).unwrap();
        assert_eq!(t.total_rows(), 0);
        let mut cursor = Cursor::new();
        assert!(t.next_chunk(&mut cursor, 100).is_end_of_data());
    }

    #[test]
    fn missing_file_is_a_data_source_error() {
        let err = Table::open("/nonexistent/keywords.xlsx").unwrap_err();
        assert!(matches!(err, TableError::Open { .. }));
    }

    #[test]
    fn corrupt_workbook_surfaces_the_primary_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        // Zip signature followed by garbage: no fallback, parse fails.
        std::fs::write(&path, b"PK\x03\x04not really a workbook").unwrap();
        assert!(Table::open(&path).is_err());
    }

    #[test]
    fn detects_signatures() {
        assert!(has_spreadsheet_signature(b"PK\x03\x04rest"));
        assert!(has_spreadsheet_signature(b"\xD0\xCF\x11\xE0rest"));
        assert!(!has_spreadsheet_signature(b"keyword,category"));
        assert!(!has_spreadsheet_signature(b""));
    }

    #[test]
    fn whole_floats_render_as_integers() {
        assert_eq!(cell_text(&Data::Float(2024.0)), "2024");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
