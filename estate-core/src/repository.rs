//! Reads and mutates the shared task table.
//!
//! The table has no transactions, indexes or locks, and this layer does not
//! pretend otherwise:
//! - every lookup re-reads the whole table (cost grows with row count);
//! - an update is a sequence of cell writes followed by the `Last Updated`
//!   stamp, so a failure leaves an unknown prefix of it committed;
//! - new ids are `max + 1` over a fresh read. Appends made through one
//!   repository (and its clones) are serialized, but two independent writers
//!   reading the same state will still hand out the same id.
//!
//! Soft-deleted rows are returned like any other; filtering is up to callers
//! (see [`Snapshot::active`]).

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::column::{ColumnIndex, HeaderMap};
use crate::error::{RepoError, RowFault, StoreError};
use crate::store::StoreConnection;
use crate::task::{
    Changes, Field, NewTask, Status, Task, Value, format_timestamp, normalize_id, parse_id,
    parse_timestamp, task_to_row,
};
use crate::time::{Clock, SystemClock};

/// Point-in-time read of the whole table.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Parsed rows in physical order.
    pub tasks: Vec<Task>,
    /// Rows that could not be parsed (bad id, status, priority or progress).
    pub faults: Vec<RowFault>,
    /// Set when the read itself failed; `tasks` is then empty.
    pub failure: Option<RepoError>,
}

impl Snapshot {
    fn failed(err: RepoError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks that have not been soft-deleted.
    pub fn active(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_active())
    }

    /// First task carrying `id`.
    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Ids held by more than one row, ascending.
    pub fn duplicate_ids(&self) -> Vec<u64> {
        let mut seen: HashMap<u64, usize> = HashMap::new();
        for t in &self.tasks {
            *seen.entry(t.id).or_default() += 1;
        }
        let mut dups: Vec<u64> = seen
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id)
            .collect();
        dups.sort_unstable();
        dups
    }
}

/// Normalized id → physical row of its first occurrence.
///
/// Rebuilt from every fresh read and never kept across calls, so a position
/// is only ever used against the read that produced it.
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    rows: HashMap<String, usize>,
}

impl RowIndex {
    pub fn get(&self, id: &str) -> Option<usize> {
        self.rows.get(&normalize_id(id)).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Raw rows from one read, header at index 0.
struct Table {
    header: HeaderMap,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(rows: Vec<Vec<String>>) -> Self {
        let header = rows
            .first()
            .map(|h| HeaderMap::from_header(h))
            .unwrap_or_default();
        Self { header, rows }
    }

    /// `(physical row, cells)` for every non-blank data row.
    fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|(i, cells)| (i + 1, cells.as_slice()))
    }

    fn cell(&self, row: usize, field: Field) -> Option<&str> {
        let col = self.header.position(field)?;
        self.rows
            .get(row.checked_sub(1)?)
            .and_then(|cells| cells.get(col - 1))
            .map(|s| s.as_str())
    }

    fn index(&self) -> RowIndex {
        let mut rows = HashMap::new();
        for (row, _) in self.data_rows() {
            let id = normalize_id(self.cell(row, Field::Id).unwrap_or(""));
            if id.is_empty() {
                continue;
            }
            rows.entry(id).or_insert(row);
        }
        RowIndex { rows }
    }

    fn parse(&self, row: usize) -> Result<Task, RowFault> {
        let cells = self.rows.get(row - 1).map(|c| c.as_slice()).unwrap_or(&[]);
        Task::from_row(row, cells, &self.header)
    }

    fn into_snapshot(self) -> Snapshot {
        let mut snap = Snapshot::default();
        for (row, cells) in self.data_rows() {
            match Task::from_row(row, cells, &self.header) {
                Ok(t) => snap.tasks.push(t),
                Err(fault) => {
                    warn!(%fault, "skipping corrupt task row");
                    snap.faults.push(fault);
                }
            }
        }
        snap
    }

    fn max_id(&self) -> Option<u64> {
        self.data_rows()
            .filter_map(|(row, _)| {
                let raw = self.cell(row, Field::Id).unwrap_or("");
                let id = parse_id(raw);
                if id.is_none() {
                    warn!(row, id = raw, "ignoring unparsable id during allocation");
                }
                id
            })
            .max()
    }
}

#[derive(Clone)]
pub struct TaskRepository {
    conn: StoreConnection,
    clock: Arc<dyn Clock>,
    /// Held across the read and append of `append_task`.
    allocation: Arc<Mutex<()>>,
}

impl TaskRepository {
    pub fn new(conn: StoreConnection) -> Self {
        Self {
            conn,
            clock: Arc::new(SystemClock::default()),
            allocation: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn connection(&self) -> &StoreConnection {
        &self.conn
    }

    fn read_table(&self) -> Result<Table, StoreError> {
        self.conn.read_all_rows().map(Table::new)
    }

    /// Fresh snapshot of every row, in storage order.
    ///
    /// Never fails: a read error yields an empty snapshot with `failure` set.
    pub fn fetch_all(&self) -> Snapshot {
        match self.read_table() {
            Ok(table) => {
                let snap = table.into_snapshot();
                debug!(tasks = snap.tasks.len(), faults = snap.faults.len(), "fetched task table");
                let dups = snap.duplicate_ids();
                if !dups.is_empty() {
                    warn!(ids = ?dups, "task table holds duplicate ids");
                }
                snap
            }
            Err(e) => {
                warn!(error = %e, "task fetch failed");
                Snapshot::failed(RepoError::Fetch(e))
            }
        }
    }

    /// Strict variant of [`fetch_all`](Self::fetch_all): read errors are returned.
    pub fn try_fetch_all(&self) -> Result<Snapshot, RepoError> {
        let table = self.read_table().map_err(RepoError::Fetch)?;
        Ok(table.into_snapshot())
    }

    /// Id → row index over a fresh read.
    pub fn row_index(&self) -> Result<RowIndex, RepoError> {
        Ok(self.read_table().map_err(RepoError::Fetch)?.index())
    }

    /// Physical row and parsed task for `id`. Re-reads the whole table; the
    /// first row whose normalized id matches wins.
    pub fn find_by_id(&self, id: impl Display) -> Result<(usize, Task), RepoError> {
        let key = normalize_id(&id.to_string());
        let table = self.read_table().map_err(RepoError::Fetch)?;
        let row = table
            .index()
            .get(&key)
            .ok_or_else(|| RepoError::NotFound(key.clone()))?;
        let task = table.parse(row)?;
        Ok((row, task))
    }

    /// Write each change into the task's row, then stamp `Last Updated`.
    ///
    /// Values are checked up front; after that, writes go out one field at a
    /// time. On `PartialFailure` the row holds some unknown prefix of
    /// `changes`. `Task ID` and `Last Updated` entries are ignored, and fields
    /// whose column is missing from the header are skipped.
    pub fn update_fields(&self, id: impl Display, changes: &Changes) -> Result<(), RepoError> {
        let key = normalize_id(&id.to_string());

        let mut cells = Vec::with_capacity(changes.len());
        for (field, value) in changes.entries() {
            if matches!(field, Field::Id | Field::LastUpdated) {
                warn!(task_id = %key, %field, "ignoring write to repository-owned column");
                continue;
            }
            cells.push((*field, cell_for(*field, value)?));
        }

        let table = self.read_table().map_err(RepoError::Fetch)?;
        let row = table
            .index()
            .get(&key)
            .ok_or_else(|| RepoError::NotFound(key.clone()))?;
        let previous = table.cell(row, Field::LastUpdated).and_then(parse_timestamp);

        let partial = |source: StoreError| {
            warn!(task_id = %key, row, error = %source, "task update failed part way");
            RepoError::PartialFailure {
                id: key.clone(),
                source,
            }
        };

        let mut writes = Vec::with_capacity(cells.len());
        for (field, text) in cells {
            match ColumnIndex::resolve_field(&self.conn, field).map_err(partial)? {
                Some(col) => writes.push((col, text)),
                None => warn!(task_id = %key, %field, "column not in header; skipping"),
            }
        }
        self.conn.write_cells(row, &writes).map_err(partial)?;

        let stamp = self.stamp_after(previous);
        match ColumnIndex::resolve_field(&self.conn, Field::LastUpdated).map_err(partial)? {
            Some(col) => self
                .conn
                .write_cell(row, col, &format_timestamp(stamp))
                .map_err(partial)?,
            None => warn!(task_id = %key, "no 'Last Updated' column; update left unstamped"),
        }

        info!(task_id = %key, row, fields = writes.len(), "task updated");
        Ok(())
    }

    /// Mark a task `Deleted`. The row stays in the table.
    pub fn soft_delete(&self, id: impl Display) -> Result<(), RepoError> {
        self.update_fields(id, &Changes::new().status(Status::Deleted))
    }

    /// Append a new task with id `max(existing) + 1` (1 on an empty table).
    pub fn append_task(&self, new: NewTask) -> Result<Task, RepoError> {
        new.validate().map_err(RepoError::Invalid)?;

        let _guard = self.allocation.lock();
        let table = self.read_table().map_err(RepoError::Append)?;
        let id = match table.max_id() {
            None => 1,
            Some(max) => max.checked_add(1).ok_or_else(|| {
                RepoError::Invalid(format!("no task id left after {max}"))
            })?,
        };

        let task = new.into_task(id, self.clock.now());
        self.conn
            .append_row(&task_to_row(&task))
            .map_err(RepoError::Append)?;

        info!(task_id = id, "task appended");
        Ok(task)
    }

    /// Never earlier than the stamp already on the row.
    fn stamp_after(&self, previous: Option<NaiveDateTime>) -> NaiveDateTime {
        let now = self.clock.now();
        previous.map_or(now, |p| now.max(p))
    }
}

/// Cell text for a change, rejecting values that would corrupt the row.
fn cell_for(field: Field, value: &Value) -> Result<String, RepoError> {
    let value = match value {
        Value::Text(raw) => Value::parse_for(field, raw).map_err(RepoError::Invalid)?,
        other => other.clone(),
    };
    let ok = match (field, &value) {
        (Field::Status, Value::Status(_)) => true,
        (Field::Priority, Value::Priority(_)) => true,
        (Field::Progress, Value::Int(n)) => (0..=100).contains(n),
        (Field::StartDate | Field::Deadline, Value::Date(_)) => true,
        (Field::StartDate | Field::Deadline, Value::Text(t)) => t.is_empty(),
        (Field::Description | Field::Responsible, Value::Text(t)) => !t.trim().is_empty(),
        (Field::Status | Field::Priority | Field::Progress, _) => false,
        (Field::StartDate | Field::Deadline, _) => false,
        _ => true,
    };
    if !ok && matches!(field, Field::Description | Field::Responsible) {
        return Err(RepoError::Invalid(format!("{field} cannot be blank")));
    }
    if !ok {
        return Err(RepoError::Invalid(format!(
            "'{}' is not a valid {field}",
            value.to_cell()
        )));
    }
    Ok(value.to_cell())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;
    use crate::task::Priority;
    use crate::time::FixedClock;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn seeded() -> (MemoryTable, TaskRepository) {
        let table = MemoryTable::with_header();
        table.push_row(&["1", "Fix roof", "Building", "A. Lee", "2026-03-01", "2026-03-09", "Not Started", "High", "0", "", "2026-03-01 08:00:00"]);
        table.push_row(&["2", "Paint hall", "", "B. Roy", "soon", "", "In Progress", "Low", "50", "two coats", ""]);
        let conn = StoreConnection::open(table.clone()).unwrap();
        let repo = TaskRepository::new(conn).with_clock(FixedClock(ts(9)));
        (table, repo)
    }

    #[test]
    fn fetch_all_keeps_storage_order_and_nulls_bad_dates() {
        let (_, repo) = seeded();
        let snap = repo.fetch_all();
        assert!(snap.failure.is_none());
        assert_eq!(snap.tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(snap.tasks[1].start_date, None);
        assert_eq!(snap.tasks[1].remarks.as_deref(), Some("two coats"));
        assert_eq!(snap.tasks[0].last_updated, Some(ts(8)));
    }

    #[test]
    fn fetch_all_surfaces_corrupt_rows() {
        let (table, repo) = seeded();
        table.put(3, 7, "Someday");
        let snap = repo.fetch_all();
        assert_eq!(snap.tasks.len(), 1);
        assert_eq!(snap.faults.len(), 1);
        assert_eq!(snap.faults[0].row, 3);
        assert_eq!(snap.faults[0].field, Field::Status);
    }

    #[test]
    fn fetch_failure_is_empty_with_recorded_error() {
        let (table, repo) = seeded();
        table.fail_reads(true);
        let snap = repo.fetch_all();
        assert!(snap.is_empty());
        assert!(matches!(snap.failure, Some(RepoError::Fetch(_))));
    }

    #[test]
    fn header_only_table_is_empty_not_error() {
        let repo = TaskRepository::new(StoreConnection::open(MemoryTable::with_header()).unwrap());
        let snap = repo.fetch_all();
        assert!(snap.is_empty());
        assert!(snap.failure.is_none());
    }

    #[test]
    fn find_by_id_matches_normalized_ids() {
        let (table, repo) = seeded();
        table.put(2, 1, "1.0");
        let (row, task) = repo.find_by_id("1").unwrap();
        assert_eq!(row, 2);
        assert_eq!(task.description, "Fix roof");
        assert!(repo.find_by_id(99).unwrap_err().is_not_found());
    }

    #[test]
    fn find_by_id_returns_first_duplicate() {
        let (table, repo) = seeded();
        table.push_row(&["1", "Shadow", "", "C. Poe", "", "", "Delayed", "Low", "0", "", ""]);
        let (row, task) = repo.find_by_id(1).unwrap();
        assert_eq!(row, 2);
        assert_eq!(task.description, "Fix roof");
        assert_eq!(repo.fetch_all().duplicate_ids(), vec![1]);
    }

    #[test]
    fn update_rejects_invalid_values_before_writing() {
        let (table, repo) = seeded();
        let err = repo
            .update_fields(1, &Changes::new().set(Field::Status, "Done"))
            .unwrap_err();
        assert!(matches!(err, RepoError::Invalid(_)));
        let err = repo
            .update_fields(1, &Changes::new().set(Field::Progress, Value::Int(130)))
            .unwrap_err();
        assert!(matches!(err, RepoError::Invalid(_)));
        assert_eq!(table.cell_writes(), 0);
    }

    #[test]
    fn update_refuses_to_blank_required_fields() {
        let (table, repo) = seeded();
        for changes in [
            Changes::new().set(Field::Description, ""),
            Changes::new().set(Field::Responsible, "  "),
            Changes::new().remarks("ok").set(Field::Description, "\t"),
        ] {
            let err = repo.update_fields(1, &changes).unwrap_err();
            assert!(matches!(err, RepoError::Invalid(_)), "{err:?}");
        }
        assert_eq!(table.cell_writes(), 0);
        let (_, task) = repo.find_by_id(1).unwrap();
        assert_eq!(task.description, "Fix roof");
        assert_eq!(task.responsible, "A. Lee");
    }

    #[test]
    fn update_keeps_free_text_as_given() {
        let (table, repo) = seeded();
        repo.update_fields(2, &Changes::new().remarks("  indented note")).unwrap();
        assert_eq!(table.rows()[2][9], "  indented note");
        assert_eq!(
            repo.find_by_id(2).unwrap().1.remarks.as_deref(),
            Some("  indented note")
        );
    }

    #[test]
    fn large_ids_address_their_own_rows() {
        let (table, repo) = seeded();
        table.put(2, 1, "9007199254740992");
        table.put(3, 1, "9007199254740993");
        let (row, task) = repo.find_by_id(9_007_199_254_740_993u64).unwrap();
        assert_eq!(row, 3);
        assert_eq!(task.id, 9_007_199_254_740_993);
        assert!(repo.fetch_all().duplicate_ids().is_empty());

        let next = repo.append_task(NewTask::new("Sweep", "D. Ng")).unwrap();
        assert_eq!(next.id, 9_007_199_254_740_994);
    }

    #[test]
    fn exponent_ids_are_faults_not_allocation_input() {
        let (table, repo) = seeded();
        table.push_row(&["1e20", "Legacy", "", "E. Fox", "", "", "Completed", "Low", "100", "", ""]);
        let snap = repo.fetch_all();
        assert_eq!(snap.faults.len(), 1);
        assert_eq!(snap.faults[0].field, Field::Id);
        assert_eq!(repo.append_task(NewTask::new("Sweep", "D. Ng")).unwrap().id, 3);
    }

    #[test]
    fn exhausted_id_space_is_an_error_not_a_wrap() {
        let (table, repo) = seeded();
        table.put(3, 1, &u64::MAX.to_string());
        let err = repo.append_task(NewTask::new("Sweep", "D. Ng")).unwrap_err();
        assert!(matches!(err, RepoError::Invalid(_)));
        assert_eq!(table.rows().len(), 3);
    }

    #[test]
    fn update_can_repair_a_corrupt_row() {
        let (table, repo) = seeded();
        table.put(2, 8, "Urgent");
        assert!(matches!(repo.find_by_id(1), Err(RepoError::Corrupt(_))));
        repo.update_fields(1, &Changes::new().priority(Priority::High)).unwrap();
        assert_eq!(repo.find_by_id(1).unwrap().1.priority, Priority::High);
    }

    #[test]
    fn update_skips_columns_missing_from_header() {
        let (table, repo) = seeded();
        table.rename_header(10, "Notes");
        repo.update_fields(2, &Changes::new().remarks("ignored").progress(60))
            .unwrap();
        let rows = table.rows();
        assert_eq!(rows[2][9], "two coats");
        assert_eq!(rows[2][8], "60");
        assert_eq!(rows[2][10], "2026-03-02 09:00:00");
    }

    #[test]
    fn stamp_never_moves_backwards() {
        let (table, repo) = seeded();
        table.put(2, 11, "2026-03-02 23:00:00");
        repo.update_fields(1, &Changes::new().progress(10)).unwrap();
        assert_eq!(table.rows()[1][10], "2026-03-02 23:00:00");
    }

    #[test]
    fn append_fails_instead_of_restarting_ids_when_read_fails() {
        let (table, repo) = seeded();
        table.fail_reads(true);
        let err = repo.append_task(NewTask::new("Sweep", "D. Ng")).unwrap_err();
        assert!(matches!(err, RepoError::Append(_)));
        assert_eq!(table.rows().len(), 3);
    }

    #[test]
    fn append_skips_unparsable_ids() {
        let (table, repo) = seeded();
        table.push_row(&["n/a", "Legacy", "", "E. Fox", "", "", "Completed", "Low", "100", "", ""]);
        let task = repo.append_task(NewTask::new("Sweep", "D. Ng")).unwrap();
        assert_eq!(task.id, 3);
        assert_eq!(task.last_updated, Some(ts(9)));
    }

    #[test]
    fn append_writes_fixed_logical_order() {
        let table = MemoryTable::from_rows(vec![
            ["Status", "Task ID", "Task Description", "Responsible", "Priority"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ]);
        let repo = TaskRepository::new(StoreConnection::open(table.clone()).unwrap())
            .with_clock(FixedClock(ts(7)));
        repo.append_task(NewTask::new("Fix gate", "A. Lee")).unwrap();
        let row = &table.rows()[1];
        assert_eq!(row[0], "1");
        assert_eq!(row[1], "Fix gate");
        assert_eq!(row.len(), Field::ORDER.len());
    }

    #[test]
    fn blank_rows_are_ignored() {
        let (table, repo) = seeded();
        table.push_row(&["", "", ""]);
        let snap = repo.fetch_all();
        assert_eq!(snap.tasks.len(), 2);
        assert!(snap.faults.is_empty());
        assert_eq!(repo.row_index().unwrap().len(), 2);
    }
}
