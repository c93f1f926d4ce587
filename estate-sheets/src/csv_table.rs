//! Local CSV file standing in for the shared sheet.
//!
//! Every primitive goes back to the file: reads parse it whole, cell writes
//! rewrite it (via a temp file + rename), appends open it in append mode.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use estate_core::{ConnectionError, Field, StoreError, TableStore};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CsvTable {
    path: PathBuf,
}

fn io_err(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Transport(format!("{}: {e}", path.display()))
}

fn csv_err(path: &Path, e: csv::Error) -> StoreError {
    if e.is_io_error() {
        io_err(path, e)
    } else {
        StoreError::Malformed(format!("{}: {e}", path.display()))
    }
}

impl CsvTable {
    /// Use an existing file. A missing file is a connection error, not an empty table.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConnectionError::Unreachable {
                location: path.display().to_string(),
                source: StoreError::Transport("no such file".to_string()),
            });
        }
        Ok(Self { path })
    }

    /// Create the file with the standard header row unless it already exists.
    /// Returns `true` when a file was written.
    pub fn create_if_missing(path: impl AsRef<Path>) -> Result<bool, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let header: Vec<String> = Field::ORDER.iter().map(|f| f.header().to_string()).collect();
        write_rows(path, &[header])?;
        debug!(path = %path.display(), "created task table");
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rewrite(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError> {
        let mut rows = self.read_all_rows()?;
        if row == 0 || row > rows.len() {
            let col = cells.first().map(|(c, _)| *c).unwrap_or(0);
            return Err(StoreError::OutOfRange { row, col });
        }
        let target = &mut rows[row - 1];
        for (col, value) in cells {
            if *col == 0 {
                return Err(StoreError::OutOfRange { row, col: 0 });
            }
            if target.len() < *col {
                target.resize(*col, String::new());
            }
            target[col - 1] = value.clone();
        }
        write_rows(&self.path, &rows)
    }
}

fn write_rows(path: &Path, rows: &[Vec<String>]) -> Result<(), StoreError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut w = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&tmp)
            .map_err(|e| csv_err(&tmp, e))?;
        for r in rows {
            w.write_record(r).map_err(|e| csv_err(&tmp, e))?;
        }
        w.flush().map_err(|e| io_err(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

impl TableStore for CsvTable {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| csv_err(&self.path, e))?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| csv_err(&self.path, e))?;
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }
        Ok(rows)
    }

    fn read_header_row(&self) -> Result<Vec<String>, StoreError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| csv_err(&self.path, e))?;
        match rdr.records().next() {
            Some(record) => {
                let record = record.map_err(|e| csv_err(&self.path, e))?;
                Ok(record.iter().map(|s| s.to_string()).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        self.rewrite(row, &[(col, value.to_string())])
    }

    /// One rewrite for the whole record: either every cell lands or none does.
    fn write_cells(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError> {
        if cells.is_empty() {
            return Ok(());
        }
        self.rewrite(row, cells)
    }

    fn append_row(&self, values: &[String]) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        let mut w = csv::WriterBuilder::new().flexible(true).from_writer(file);
        w.write_record(values).map_err(|e| csv_err(&self.path, e))?;
        w.flush().map_err(|e| io_err(&self.path, e))
    }
}
