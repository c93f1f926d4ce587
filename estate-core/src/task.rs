//! Task model for the estate task table.
//!
//! A task is one row of the shared sheet. Every value is stored as text, so this
//! module owns the conversions in both directions: lenient for dates (bad dates
//! become `None`), strict for the enumerations (bad values are a [`RowFault`]).

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RowFault;

/// Stored date format for `Start Date` / `Deadline`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stored timestamp format for `Last Updated`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    InProgress,
    Completed,
    Delayed,
    /// Soft-delete marker. The row stays in the table.
    Deleted,
}

impl Status {
    /// Workflow states a task can be moved through (everything except `Deleted`).
    pub const WORKFLOW: [Status; 4] = [
        Status::NotStarted,
        Status::InProgress,
        Status::Completed,
        Status::Delayed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotStarted => "Not Started",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
            Status::Delayed => "Delayed",
            Status::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Not Started" | "NotStarted" => Ok(Status::NotStarted),
            "In Progress" | "InProgress" => Ok(Status::InProgress),
            "Completed" => Ok(Status::Completed),
            "Delayed" => Ok(Status::Delayed),
            "Deleted" => Ok(Status::Deleted),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "High" => Ok(Priority::High),
            "Medium" => Ok(Priority::Medium),
            "Low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Logical columns of the task table.
///
/// The sheet's header row decides where each one physically lives; [`Field::ORDER`]
/// is only the order used when appending a fresh row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Id,
    Description,
    Category,
    Responsible,
    StartDate,
    Deadline,
    Status,
    Priority,
    Progress,
    Remarks,
    LastUpdated,
}

impl Field {
    pub const ORDER: [Field; 11] = [
        Field::Id,
        Field::Description,
        Field::Category,
        Field::Responsible,
        Field::StartDate,
        Field::Deadline,
        Field::Status,
        Field::Priority,
        Field::Progress,
        Field::Remarks,
        Field::LastUpdated,
    ];

    /// Exact header text in the sheet.
    pub fn header(self) -> &'static str {
        match self {
            Field::Id => "Task ID",
            Field::Description => "Task Description",
            Field::Category => "Category",
            Field::Responsible => "Responsible",
            Field::StartDate => "Start Date",
            Field::Deadline => "Deadline",
            Field::Status => "Status",
            Field::Priority => "Priority",
            Field::Progress => "Progress %",
            Field::Remarks => "Remarks",
            Field::LastUpdated => "Last Updated",
        }
    }

    /// Header text or a snake_case key (`start_date`, `progress`).
    pub fn from_name(name: &str) -> Option<Field> {
        let name = name.trim();
        if let Some(f) = Field::ORDER.iter().find(|f| f.header() == name) {
            return Some(*f);
        }
        match name.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "id" | "task_id" => Some(Field::Id),
            "description" | "task_description" => Some(Field::Description),
            "category" => Some(Field::Category),
            "responsible" => Some(Field::Responsible),
            "start" | "start_date" => Some(Field::StartDate),
            "deadline" => Some(Field::Deadline),
            "status" => Some(Field::Status),
            "priority" => Some(Field::Priority),
            "progress" | "progress_%" => Some(Field::Progress),
            "remarks" => Some(Field::Remarks),
            "last_updated" => Some(Field::LastUpdated),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// A value headed for a single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Date(NaiveDate),
    Status(Status),
    Priority(Priority),
}

impl Value {
    /// Cell text: dates as `YYYY-MM-DD`, everything else via its string form.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::Status(s) => s.as_str().to_string(),
            Value::Priority(p) => p.as_str().to_string(),
        }
    }

    /// Interpret user-supplied text for a given field. Free-text fields keep
    /// their surrounding whitespace.
    pub fn parse_for(field: Field, raw: &str) -> Result<Value, String> {
        let trimmed = raw.trim();
        match field {
            Field::Status => trimmed.parse().map(Value::Status),
            Field::Priority => trimmed.parse().map(Value::Priority),
            Field::Progress => parse_progress(trimmed)
                .map(|p| Value::Int(p.into()))
                .map_err(|e| format!("progress: {e}")),
            Field::StartDate | Field::Deadline if trimmed.is_empty() => Ok(Value::Text(String::new())),
            Field::StartDate | Field::Deadline => parse_date(trimmed)
                .map(Value::Date)
                .ok_or_else(|| format!("{field}: '{trimmed}' is not a date")),
            Field::Id | Field::LastUpdated => Ok(Value::Text(trimmed.to_string())),
            _ => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Status> for Value {
    fn from(s: Status) -> Self {
        Value::Status(s)
    }
}

impl From<Priority> for Value {
    fn from(p: Priority) -> Self {
        Value::Priority(p)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Value::Int(n.into())
    }
}

/// Ordered set of field writes for `update_fields`.
///
/// Order is preserved because writes happen one cell at a time and a failure
/// leaves a prefix committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    entries: Vec<(Field, Value)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: Field, value: impl Into<Value>) -> Self {
        self.entries.push((field, value.into()));
        self
    }

    pub fn status(self, status: Status) -> Self {
        self.set(Field::Status, status)
    }

    pub fn priority(self, priority: Priority) -> Self {
        self.set(Field::Priority, priority)
    }

    pub fn progress(self, progress: u8) -> Self {
        self.set(Field::Progress, progress)
    }

    pub fn remarks(self, remarks: impl Into<String>) -> Self {
        self.set(Field::Remarks, Value::Text(remarks.into()))
    }

    pub fn deadline(self, deadline: NaiveDate) -> Self {
        self.set(Field::Deadline, deadline)
    }

    pub fn entries(&self) -> &[(Field, Value)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Field, Value)> for Changes {
    fn from_iter<I: IntoIterator<Item = (Field, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One task row as read from the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub category: Option<String>,
    pub responsible: String,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub status: Status,
    pub priority: Priority,
    /// 0-100.
    pub progress: u8,
    pub remarks: Option<String>,
    /// Stamped by the repository; `None` when the cell is empty or garbled.
    pub last_updated: Option<NaiveDateTime>,
}

impl Task {
    /// `false` once the task has been soft-deleted.
    pub fn is_active(&self) -> bool {
        self.status != Status::Deleted
    }

    pub fn is_deleted(&self) -> bool {
        !self.is_active()
    }

    /// Build a task from one physical row, using `columns` to find each field.
    pub(crate) fn from_row(
        row: usize,
        cells: &[String],
        columns: &crate::column::HeaderMap,
    ) -> Result<Task, RowFault> {
        let raw = |f: Field| cell_raw(cells, columns, f);
        let cell = |f: Field| raw(f).trim();
        let fault = |field: Field, reason: String| RowFault { row, field, reason };

        let id_text = cell(Field::Id);
        let id = parse_id(id_text)
            .ok_or_else(|| fault(Field::Id, format!("'{id_text}' is not a task id")))?;
        let status = cell(Field::Status)
            .parse::<Status>()
            .map_err(|e| fault(Field::Status, e))?;
        let priority = cell(Field::Priority)
            .parse::<Priority>()
            .map_err(|e| fault(Field::Priority, e))?;
        let progress = parse_progress(cell(Field::Progress)).map_err(|e| fault(Field::Progress, e))?;

        Ok(Task {
            id,
            description: raw(Field::Description).to_string(),
            category: non_empty(raw(Field::Category)),
            responsible: raw(Field::Responsible).to_string(),
            start_date: parse_date(cell(Field::StartDate)),
            deadline: parse_date(cell(Field::Deadline)),
            status,
            priority,
            progress,
            remarks: non_empty(raw(Field::Remarks)),
            last_updated: parse_timestamp(cell(Field::LastUpdated)),
        })
    }
}

fn cell_raw<'a>(cells: &'a [String], columns: &crate::column::HeaderMap, field: Field) -> &'a str {
    columns
        .position(field)
        .and_then(|c| cells.get(c - 1))
        .map(|s| s.as_str())
        .unwrap_or("")
}

/// Input to `append_task`. The id and `last_updated` are assigned by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    pub category: Option<String>,
    pub responsible: String,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub status: Status,
    pub priority: Priority,
    pub progress: u8,
    pub remarks: Option<String>,
}

impl NewTask {
    pub fn new(description: impl Into<String>, responsible: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: None,
            responsible: responsible.into(),
            start_date: None,
            deadline: None,
            status: Status::NotStarted,
            priority: Priority::Medium,
            progress: 0,
            remarks: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, deadline: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.deadline = deadline;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// Required fields present and progress in range.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("task description is required".to_string());
        }
        if self.responsible.trim().is_empty() {
            return Err("responsible person is required".to_string());
        }
        if self.progress > 100 {
            return Err(format!("progress {} is outside 0-100", self.progress));
        }
        Ok(())
    }

    pub(crate) fn into_task(self, id: u64, stamp: NaiveDateTime) -> Task {
        Task {
            id,
            description: self.description,
            category: self.category.filter(|c| !c.trim().is_empty()),
            responsible: self.responsible,
            start_date: self.start_date,
            deadline: self.deadline,
            status: self.status,
            priority: self.priority,
            progress: self.progress,
            remarks: self.remarks.filter(|r| !r.trim().is_empty()),
            last_updated: Some(stamp),
        }
    }
}

/// Row cells in [`Field::ORDER`].
pub(crate) fn task_to_row(task: &Task) -> Vec<String> {
    let date = |d: Option<NaiveDate>| d.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default();
    Field::ORDER
        .iter()
        .map(|f| match f {
            Field::Id => task.id.to_string(),
            Field::Description => task.description.clone(),
            Field::Category => task.category.clone().unwrap_or_default(),
            Field::Responsible => task.responsible.clone(),
            Field::StartDate => date(task.start_date),
            Field::Deadline => date(task.deadline),
            Field::Status => task.status.as_str().to_string(),
            Field::Priority => task.priority.as_str().to_string(),
            Field::Progress => task.progress.to_string(),
            Field::Remarks => task.remarks.clone().unwrap_or_default(),
            Field::LastUpdated => task
                .last_updated
                .map(format_timestamp)
                .unwrap_or_default(),
        })
        .collect()
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Normalize an id cell for comparison: `" 6 "`, `"6"`, `"06"` and `"6.0"` all
/// become `"6"`. Anything that is not a whole number in `u64` range (exponents,
/// fractions, overflow) is returned trimmed but otherwise unchanged.
pub fn normalize_id(raw: &str) -> String {
    let raw = raw.trim();
    match parse_id(raw) {
        Some(n) => n.to_string(),
        None => raw.to_string(),
    }
}

/// Whole-number id, accepting a zero fraction (`"6.0"`) as spreadsheets often
/// write one.
pub fn parse_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(whole) || !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse().ok()
}

fn parse_progress(raw: &str) -> Result<u8, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    let n: f64 = raw
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if n.fract() != 0.0 || !(0.0..=100.0).contains(&n) {
        return Err(format!("'{raw}' is outside 0-100"));
    }
    Ok(n as u8)
}

/// Lenient date parsing; anything unrecognized is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in [DATE_FORMAT, "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    parse_timestamp(raw).map(|ts| ts.date())
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_canonical_and_compact_forms() {
        assert_eq!("Not Started".parse::<Status>().unwrap(), Status::NotStarted);
        assert_eq!("InProgress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!(Status::InProgress.to_string(), "In Progress");
        assert!("Done".parse::<Status>().is_err());
        assert!("completed".parse::<Status>().is_err());
    }

    #[test]
    fn field_names_resolve_from_header_or_key() {
        assert_eq!(Field::from_name("Progress %"), Some(Field::Progress));
        assert_eq!(Field::from_name("progress"), Some(Field::Progress));
        assert_eq!(Field::from_name("start-date"), Some(Field::StartDate));
        assert_eq!(Field::from_name("Task ID"), Some(Field::Id));
        assert_eq!(Field::from_name("colour"), None);
    }

    #[test]
    fn ids_normalize_across_numeric_spellings() {
        assert_eq!(normalize_id(" 6 "), "6");
        assert_eq!(normalize_id("6.0"), "6");
        assert_eq!(normalize_id("abc"), "abc");
        assert_eq!(parse_id("12"), Some(12));
        assert_eq!(parse_id("6.5"), None);
        assert_eq!(parse_id(""), None);
    }

    #[test]
    fn ids_never_round_through_floating_point() {
        assert_eq!(parse_id("9007199254740993"), Some(9_007_199_254_740_993));
        assert_eq!(normalize_id("9007199254740993.0"), "9007199254740993");
        assert_eq!(normalize_id("9007199254740992"), "9007199254740992");
        assert_eq!(parse_id("1e20"), None);
        assert_eq!(normalize_id("1e20"), "1e20");
        assert_eq!(parse_id("18446744073709551616"), None);
        assert_eq!(parse_id("-3"), None);
        assert_eq!(parse_id("+3"), None);
        assert_eq!(parse_id(".0"), None);
        assert_eq!(normalize_id("006"), "6");
    }

    #[test]
    fn unparsable_dates_become_none() {
        assert_eq!(parse_date("2026-03-01"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_date("03/01/2026"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_date("2026-03-01 10:00:00"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn progress_parsing_rejects_out_of_range() {
        assert_eq!(parse_progress("").unwrap(), 0);
        assert_eq!(parse_progress("40").unwrap(), 40);
        assert_eq!(parse_progress("40.0").unwrap(), 40);
        assert!(parse_progress("140").is_err());
        assert!(parse_progress("4.5").is_err());
        assert!(parse_progress("lots").is_err());
    }

    #[test]
    fn value_cells_use_stored_formats() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        assert_eq!(Value::Date(d).to_cell(), "2026-01-09");
        assert_eq!(Value::Status(Status::NotStarted).to_cell(), "Not Started");
        assert_eq!(Value::Int(40).to_cell(), "40");
        assert_eq!(
            Value::parse_for(Field::Deadline, "2026-01-09").unwrap(),
            Value::Date(d)
        );
        assert!(Value::parse_for(Field::Priority, "Urgent").is_err());
    }

    #[test]
    fn parse_for_trims_structured_values_only() {
        assert_eq!(
            Value::parse_for(Field::Remarks, "  indented").unwrap(),
            Value::Text("  indented".to_string())
        );
        assert_eq!(
            Value::parse_for(Field::Status, " Delayed ").unwrap(),
            Value::Status(Status::Delayed)
        );
        assert_eq!(Value::parse_for(Field::Progress, " 40% ").unwrap(), Value::Int(40));
        assert_eq!(
            Value::parse_for(Field::Deadline, "  ").unwrap(),
            Value::Text(String::new())
        );
    }

    #[test]
    fn new_task_requires_description_and_owner() {
        assert!(NewTask::new("Fix roof", "A. Lee").validate().is_ok());
        assert!(NewTask::new("  ", "A. Lee").validate().is_err());
        assert!(NewTask::new("Fix roof", "").validate().is_err());
        assert!(NewTask::new("Fix roof", "A. Lee").with_progress(101).validate().is_err());
    }
}
