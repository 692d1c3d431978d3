//! Common test utilities for chunkflow integration tests
//!
//! Builds spreadsheet fixtures on disk, wires a runner over an in-memory
//! session store, and binds agents to scripted mock models.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chunkflow::agent::catalog;
use chunkflow::{Agent, MockModel, OpenStore, SqliteSessionStore, WorkflowRunner, Workspace};
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub use chunkflow::agent::analysis_reply;

/// One sheet of a workbook fixture.
pub struct SheetFixture<'a> {
    pub name: &'a str,
    pub headers: &'a [&'a str],
    pub rows: &'a [&'a [&'a str]],
}

/// Write a workbook with the given sheets. Empty cells are left blank.
pub fn write_xlsx(path: &Path, sheets: &[SheetFixture<'_>]) {
    let mut workbook = Workbook::new();
    for fixture in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(fixture.name).expect("valid sheet name");
        for (col, header) in fixture.headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).expect("write header");
        }
        for (r, row) in fixture.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    sheet
                        .write_string(r as u32 + 1, col as u16, *cell)
                        .expect("write cell");
                }
            }
        }
    }
    workbook.save(path).expect("save workbook");
}

/// Write a single-sheet keyword workbook.
pub fn write_keyword_xlsx(path: &Path, rows: &[(&str, &str)]) {
    let rows: Vec<[&str; 2]> = rows.iter().map(|(k, c)| [*k, *c]).collect();
    let row_refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
    write_xlsx(
        path,
        &[SheetFixture {
            name: "Sheet1",
            headers: &["Keyword", "Category"],
            rows: &row_refs,
        }],
    );
}

/// Write a keyword CSV with the csv crate.
pub fn write_keyword_csv(path: &Path, rows: &[(&str, &str)]) {
    let mut writer = csv::Writer::from_path(path).expect("create csv");
    writer.write_record(["Keyword", "Category"]).expect("write header");
    for (keyword, category) in rows {
        writer.write_record([*keyword, *category]).expect("write row");
    }
    writer.flush().expect("flush csv");
}

/// Base64 of a single-sheet keyword workbook.
pub fn keyword_xlsx_base64(rows: &[(&str, &str)]) -> String {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("upload.xlsx");
    write_keyword_xlsx(&path, rows);
    STANDARD.encode(std::fs::read(&path).expect("read workbook"))
}

/// A runner over a temp scratch dir and an in-memory store.
pub struct TestEnv {
    pub dir: TempDir,
    pub runner: WorkflowRunner,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = SqliteSessionStore::open_in_memory().expect("open store");
        let runner = WorkflowRunner::new(Workspace::new(dir.path().join("scratch")), Arc::new(store));
        Self { dir, runner }
    }

    /// Path for a fixture file outside the scratch dir.
    pub fn fixture(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// The workflow agent bound to a mock model.
pub fn keyword_agent(model: &Arc<MockModel>) -> Agent {
    Agent::new(&catalog::KEYWORD_ANALYSIS, "o4-mini", model.clone())
}
