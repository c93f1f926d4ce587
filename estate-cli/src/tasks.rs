use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use estate_core::task::parse_date;
use estate_core::{Changes, Field, NewTask, Priority, Snapshot, Status, Task, Value};

/// Filters applied by `estate list`.
#[derive(Debug, Default)]
pub struct ListFilter {
    pub all: bool,
    pub status: Option<Status>,
    pub responsible: Option<String>,
    /// Exact category, ignoring case.
    pub category: Option<String>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring of the description.
    pub search: Option<String>,
}

impl ListFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if !self.all && task.is_deleted() && self.status != Some(Status::Deleted) {
            return false;
        }
        if let Some(s) = self.status {
            if task.status != s {
                return false;
            }
        }
        if let Some(r) = &self.responsible {
            if !task.responsible.to_lowercase().contains(&r.to_lowercase()) {
                return false;
            }
        }
        if let Some(c) = &self.category {
            match &task.category {
                Some(tc) if tc.trim().eq_ignore_ascii_case(c.trim()) => {}
                _ => return false,
            }
        }
        if let Some(p) = self.priority {
            if task.priority != p {
                return false;
            }
        }
        if let Some(q) = &self.search {
            if !task.description.to_lowercase().contains(&q.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

pub fn print_snapshot(snap: &Snapshot, filter: &ListFilter) {
    if let Some(err) = &snap.failure {
        eprintln!("Could not read the task table: {err}");
    }

    let rows: Vec<&Task> = snap.tasks.iter().filter(|t| filter.matches(t)).collect();
    if rows.is_empty() {
        println!("No tasks.");
    } else {
        println!(
            "{:>4}  {:<11}  {:<6}  {:>4}  {:<10}  {:<16}  {}",
            "ID", "STATUS", "PRIO", "DONE", "DEADLINE", "RESPONSIBLE", "DESCRIPTION"
        );
        for t in &rows {
            println!("{}", summary_line(t));
        }
    }

    for f in &snap.faults {
        eprintln!("warning: {f}");
    }
}

pub fn summary_line(t: &Task) -> String {
    let deadline = t.deadline.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
    format!(
        "{:>4}  {:<11}  {:<6}  {:>3}%  {:<10}  {:<16}  {}",
        t.id,
        t.status.as_str(),
        t.priority.as_str(),
        t.progress,
        deadline,
        truncate(&t.responsible, 16),
        t.description
    )
}

pub fn print_task(t: &Task) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();

    println!("{:<13} {}", "Task ID:", t.id);
    println!("{:<13} {}", "Description:", t.description);
    println!("{:<13} {}", "Category:", opt(&t.category));
    println!("{:<13} {}", "Responsible:", t.responsible);
    println!("{:<13} {}", "Start Date:", date(t.start_date));
    println!("{:<13} {}", "Deadline:", date(t.deadline));
    println!("{:<13} {}", "Status:", t.status);
    println!("{:<13} {}", "Priority:", t.priority);
    println!("{:<13} {}%", "Progress:", t.progress);
    println!("{:<13} {}", "Remarks:", opt(&t.remarks));
    println!(
        "{:<13} {}",
        "Last Updated:",
        t.last_updated
            .map(estate_core::task::format_timestamp)
            .unwrap_or_default()
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// `status=Completed` `progress=100` ... into a change set.
pub fn parse_assignments(pairs: &[String]) -> Result<Changes> {
    if pairs.is_empty() {
        bail!("nothing to update (pass field=value pairs, e.g. status=Completed)");
    }
    let mut entries = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected field=value, got '{pair}'"))?;
        let field = Field::from_name(name.trim())
            .ok_or_else(|| anyhow!("unknown field '{}'", name.trim()))?;
        let value = Value::parse_for(field, raw).map_err(|e| anyhow!("{field}: {e}"))?;
        entries.push((field, value));
    }
    Ok(entries.into_iter().collect())
}

/// Raw `estate add` arguments.
#[derive(Debug, Default)]
pub struct AddArgs {
    pub description: String,
    pub responsible: String,
    pub category: Option<String>,
    pub start: Option<String>,
    pub deadline: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub progress: Option<u8>,
    pub remarks: Option<String>,
}

/// Build the new task. Start defaults to `today`, deadline to a week later.
pub fn build_new_task(args: AddArgs, today: NaiveDate) -> Result<NewTask> {
    let date_arg = |label: &str, raw: Option<&String>| -> Result<Option<NaiveDate>> {
        match raw {
            None => Ok(None),
            Some(s) => parse_date(s)
                .map(Some)
                .with_context(|| format!("{label}: unrecognised date '{s}'")),
        }
    };
    let start = date_arg("start", args.start.as_ref())?.unwrap_or(today);
    let deadline = date_arg("deadline", args.deadline.as_ref())?
        .unwrap_or_else(|| today + chrono::Duration::days(7));

    let mut new = NewTask::new(args.description, args.responsible)
        .with_dates(Some(start), Some(deadline));
    if let Some(c) = args.category {
        new = new.with_category(c);
    }
    if let Some(s) = args.status {
        new = new.with_status(s.parse::<Status>().map_err(|e| anyhow!(e))?);
    }
    if let Some(p) = args.priority {
        new = new.with_priority(p.parse::<Priority>().map_err(|e| anyhow!(e))?);
    }
    if let Some(p) = args.progress {
        new = new.with_progress(p);
    }
    if let Some(r) = args.remarks {
        new = new.with_remarks(r);
    }
    new.validate().map_err(|e| anyhow!(e))?;
    Ok(new)
}
