//! estate-sheets: concrete backends for the task table (CSV file, Google Sheets)

pub mod csv_table;
pub mod sheets;

use estate_core::{ConnectionError, MemoryTable, StoreConnection};

pub use csv_table::CsvTable;
pub use sheets::SheetsTable;

/// Which table to open, with whatever that backend needs to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Fresh in-process table with only a header row.
    Memory,
    Csv {
        path: std::path::PathBuf,
    },
    Sheets {
        spreadsheet_id: String,
        sheet: String,
        token: String,
        base_url: Option<String>,
    },
}

/// Open the configured table. Reads the header once; nothing is retried.
pub fn connect(backend: &Backend) -> Result<StoreConnection, ConnectionError> {
    match backend {
        Backend::Memory => StoreConnection::open(MemoryTable::with_header()),
        Backend::Csv { path } => StoreConnection::open(CsvTable::connect(path)?),
        Backend::Sheets {
            spreadsheet_id,
            sheet,
            token,
            base_url,
        } => StoreConnection::open(SheetsTable::connect(
            spreadsheet_id,
            sheet,
            token,
            base_url.as_deref(),
        )?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_opens_with_header() {
        let conn = connect(&Backend::Memory).unwrap();
        assert_eq!(conn.read_header_row().unwrap()[0], "Task ID");
    }

    #[test]
    fn sheets_backend_without_token_fails_before_any_request() {
        let err = connect(&Backend::Sheets {
            spreadsheet_id: "abc".to_string(),
            sheet: "Sheet1".to_string(),
            token: String::new(),
            base_url: None,
        })
        .unwrap_err();
        assert!(matches!(err, ConnectionError::Credentials(_)));
    }
}
