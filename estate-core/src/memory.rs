//! In-process table used by tests and the `memory` backend.
//!
//! Cloning shares the same table, so a test can keep a handle for fault
//! injection and inspection after handing a clone to a `StoreConnection`.

use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::TableStore;
use crate::task::Field;

#[derive(Debug, Default)]
struct Faults {
    fail_reads: bool,
    fail_appends: bool,
    /// Cell writes still allowed before every further write fails.
    writes_left: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    full_reads: usize,
    header_reads: usize,
    cell_writes: usize,
    appends: usize,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<Vec<Vec<String>>>,
    faults: Mutex<Faults>,
    counters: Mutex<Counters>,
    rendezvous: Mutex<Option<Arc<Barrier>>>,
}

#[derive(Clone, Default)]
pub struct MemoryTable {
    inner: Arc<Inner>,
}

impl MemoryTable {
    /// No rows at all, not even a header.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Just the standard header row.
    pub fn with_header() -> Self {
        let header = Field::ORDER.iter().map(|f| f.header().to_string()).collect();
        Self::from_rows(vec![header])
    }

    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let table = Self::default();
        *table.inner.rows.lock() = rows;
        table
    }

    /// Copy of the current rows, header included.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.inner.rows.lock().clone()
    }

    /// Append a raw row, bypassing fault injection.
    pub fn push_row(&self, cells: &[&str]) {
        self.inner
            .rows
            .lock()
            .push(cells.iter().map(|s| s.to_string()).collect());
    }

    /// Overwrite a raw cell, bypassing fault injection.
    pub fn put(&self, row: usize, col: usize, value: &str) {
        let mut rows = self.inner.rows.lock();
        if let Some(r) = row.checked_sub(1).and_then(|i| rows.get_mut(i)) {
            set_padded(r, col, value);
        }
    }

    pub fn rename_header(&self, col: usize, name: &str) {
        self.put(1, col, name);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.faults.lock().fail_reads = fail;
    }

    pub fn fail_appends(&self, fail: bool) {
        self.inner.faults.lock().fail_appends = fail;
    }

    /// Allow `n` more cell writes, then fail every one after.
    pub fn fail_writes_after(&self, n: usize) {
        self.inner.faults.lock().writes_left = Some(n);
    }

    pub fn clear_faults(&self) {
        *self.inner.faults.lock() = Faults::default();
    }

    /// Make every full-table read wait on `barrier` before returning, so
    /// concurrent readers observe the same state.
    pub fn rendezvous(&self, barrier: Arc<Barrier>) {
        *self.inner.rendezvous.lock() = Some(barrier);
    }

    pub fn clear_rendezvous(&self) {
        *self.inner.rendezvous.lock() = None;
    }

    pub fn full_reads(&self) -> usize {
        self.inner.counters.lock().full_reads
    }

    pub fn header_reads(&self) -> usize {
        self.inner.counters.lock().header_reads
    }

    pub fn cell_writes(&self) -> usize {
        self.inner.counters.lock().cell_writes
    }

    pub fn appends(&self) -> usize {
        self.inner.counters.lock().appends
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.inner.faults.lock().fail_reads {
            return Err(StoreError::Transport("read failed (injected)".to_string()));
        }
        Ok(())
    }
}

fn set_padded(row: &mut Vec<String>, col: usize, value: &str) {
    if row.len() < col {
        row.resize(col, String::new());
    }
    row[col - 1] = value.to_string();
}

impl TableStore for MemoryTable {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn read_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        self.check_reads()?;
        self.inner.counters.lock().full_reads += 1;
        let rows = self.rows();
        let barrier = self.inner.rendezvous.lock().clone();
        if let Some(b) = barrier {
            b.wait();
        }
        Ok(rows)
    }

    fn read_header_row(&self) -> Result<Vec<String>, StoreError> {
        self.check_reads()?;
        self.inner.counters.lock().header_reads += 1;
        Ok(self.inner.rows.lock().first().cloned().unwrap_or_default())
    }

    fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        {
            let mut faults = self.inner.faults.lock();
            if let Some(left) = faults.writes_left.as_mut() {
                if *left == 0 {
                    return Err(StoreError::Transport("write failed (injected)".to_string()));
                }
                *left -= 1;
            }
        }
        let mut rows = self.inner.rows.lock();
        if col == 0 || row == 0 || row > rows.len() {
            return Err(StoreError::OutOfRange { row, col });
        }
        set_padded(&mut rows[row - 1], col, value);
        self.inner.counters.lock().cell_writes += 1;
        Ok(())
    }

    fn append_row(&self, values: &[String]) -> Result<(), StoreError> {
        if self.inner.faults.lock().fail_appends {
            return Err(StoreError::Transport("append failed (injected)".to_string()));
        }
        self.inner.rows.lock().push(values.to_vec());
        self.inner.counters.lock().appends += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_cell_pads_short_rows() {
        let table = MemoryTable::from_rows(vec![vec!["A".into(), "B".into(), "C".into()], vec!["1".into()]]);
        table.write_cell(2, 3, "x").unwrap();
        assert_eq!(table.rows()[1], vec!["1", "", "x"]);
    }

    #[test]
    fn write_cell_outside_table_is_rejected() {
        let table = MemoryTable::with_header();
        assert!(matches!(
            table.write_cell(5, 1, "x"),
            Err(StoreError::OutOfRange { row: 5, col: 1 })
        ));
    }

    #[test]
    fn injected_write_budget_fails_later_writes() {
        let table = MemoryTable::from_rows(vec![vec!["A".into()], vec!["1".into()]]);
        table.fail_writes_after(1);
        assert!(table.write_cell(2, 1, "a").is_ok());
        assert!(table.write_cell(2, 1, "b").is_err());
        assert_eq!(table.rows()[1][0], "a");
    }
}
