//! Store seam: the four primitives the repository needs from the remote table,
//! and the connection handle that wraps a concrete backend.
//!
//! Rows and columns are 1-based and physical: row 1 is the header row.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ConnectionError, StoreError};

/// A single worksheet-like table.
///
/// Implementations must not retry internally; every failure is reported to the
/// caller as-is.
pub trait TableStore: Send + Sync {
    /// Human-readable location for logs and errors.
    fn location(&self) -> String;

    /// Every row, header included, in physical order.
    fn read_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError>;

    fn read_header_row(&self) -> Result<Vec<String>, StoreError>;

    fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError>;

    fn append_row(&self, values: &[String]) -> Result<(), StoreError>;

    /// Write several cells of one row.
    ///
    /// The default issues one `write_cell` per entry, in order, and stops at the
    /// first failure, so earlier cells stay written. Backends with a record-level
    /// write override this.
    fn write_cells(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError> {
        for (col, value) in cells {
            self.write_cell(row, *col, value)?;
        }
        Ok(())
    }
}

/// Handle to the one table every repository call goes through.
#[derive(Clone)]
pub struct StoreConnection {
    store: Arc<dyn TableStore>,
    location: String,
}

impl fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConnection")
            .field("location", &self.location)
            .finish()
    }
}

impl StoreConnection {
    /// Open a connection by probing the header row once. No retry.
    pub fn open(store: impl TableStore + 'static) -> Result<Self, ConnectionError> {
        Self::open_shared(Arc::new(store))
    }

    pub fn open_shared(store: Arc<dyn TableStore>) -> Result<Self, ConnectionError> {
        let location = store.location();
        let header = store
            .read_header_row()
            .map_err(|source| ConnectionError::Unreachable {
                location: location.clone(),
                source,
            })?;
        if header.iter().all(|h| h.trim().is_empty()) {
            return Err(ConnectionError::NoHeader(location));
        }
        debug!(%location, columns = header.len(), "opened task table");
        Ok(Self { store, location })
    }

    /// A connection that never opened. Reads fail (so fetches come back empty
    /// with a recorded failure) and every mutation is rejected.
    pub fn offline(err: ConnectionError) -> Self {
        warn!(error = %err, "task table is offline");
        let location = "<offline>".to_string();
        Self {
            store: Arc::new(Offline {
                reason: err.to_string(),
            }),
            location,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn read_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        self.store.read_all_rows()
    }

    pub fn read_header_row(&self) -> Result<Vec<String>, StoreError> {
        self.store.read_header_row()
    }

    pub fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        self.store.write_cell(row, col, value)
    }

    pub fn write_cells(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError> {
        self.store.write_cells(row, cells)
    }

    pub fn append_row(&self, values: &[String]) -> Result<(), StoreError> {
        self.store.append_row(values)
    }
}

struct Offline {
    reason: String,
}

impl Offline {
    fn err(&self) -> StoreError {
        StoreError::Transport(format!("not connected: {}", self.reason))
    }
}

impl TableStore for Offline {
    fn location(&self) -> String {
        "<offline>".to_string()
    }

    fn read_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        Err(self.err())
    }

    fn read_header_row(&self) -> Result<Vec<String>, StoreError> {
        Err(self.err())
    }

    fn write_cell(&self, _row: usize, _col: usize, _value: &str) -> Result<(), StoreError> {
        Err(self.err())
    }

    fn append_row(&self, _values: &[String]) -> Result<(), StoreError> {
        Err(self.err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;

    #[test]
    fn open_rejects_table_without_header() {
        let err = StoreConnection::open(MemoryTable::empty()).unwrap_err();
        assert!(matches!(err, ConnectionError::NoHeader(_)));
    }

    #[test]
    fn open_surfaces_unreachable_store() {
        let table = MemoryTable::with_header();
        table.fail_reads(true);
        let err = StoreConnection::open(table).unwrap_err();
        assert!(matches!(err, ConnectionError::Unreachable { .. }));
    }

    #[test]
    fn offline_connection_rejects_everything() {
        let conn = StoreConnection::offline(ConnectionError::MissingLocation);
        assert!(conn.read_all_rows().is_err());
        assert!(conn.write_cell(2, 1, "x").is_err());
        assert!(conn.append_row(&["1".to_string()]).is_err());
    }
}
