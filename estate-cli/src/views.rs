//! Read-only views over a snapshot: dashboard summary, status board, and the
//! seven-day deadline calendar. Callers pass the tasks to include (normally
//! `Snapshot::active`).

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use estate_core::{Status, Task};

/// How far ahead `upcoming` and the week view look.
pub const HORIZON_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    /// Deadline before today and not Completed.
    pub overdue: usize,
    /// Deadline between today and today + 7, inclusive.
    pub upcoming: usize,
    /// Mean of `progress`; 0 when there are no tasks.
    pub mean_progress: f64,
    pub by_category: Vec<(String, usize)>,
    pub by_status: Vec<(Status, usize)>,
    pub by_responsible: Vec<(String, usize)>,
}

impl Summary {
    pub fn of<'a>(tasks: impl IntoIterator<Item = &'a Task>, today: NaiveDate) -> Self {
        let tasks: Vec<&Task> = tasks.into_iter().collect();
        let horizon = today + Duration::days(HORIZON_DAYS);

        let overdue = tasks
            .iter()
            .filter(|t| t.status != Status::Completed && t.deadline.is_some_and(|d| d < today))
            .count();
        let upcoming = tasks
            .iter()
            .filter(|t| t.deadline.is_some_and(|d| d >= today && d <= horizon))
            .count();
        let mean_progress = if tasks.is_empty() {
            0.0
        } else {
            tasks.iter().map(|t| f64::from(t.progress)).sum::<f64>() / tasks.len() as f64
        };

        let by_status = Status::WORKFLOW
            .iter()
            .map(|s| (*s, tasks.iter().filter(|t| t.status == *s).count()))
            .collect();

        Self {
            total: tasks.len(),
            overdue,
            upcoming,
            mean_progress,
            by_category: tally(tasks.iter().filter_map(|t| t.category.as_deref())),
            by_status,
            by_responsible: tally(tasks.iter().map(|t| t.responsible.as_str())),
        }
    }
}

/// Counts, largest first; ties by name.
fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for k in keys {
        let k = k.trim();
        if !k.is_empty() {
            *counts.entry(k).or_default() += 1;
        }
    }
    let mut out: Vec<(String, usize)> = counts.into_iter().map(|(k, n)| (k.to_string(), n)).collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Tasks grouped by workflow status, in workflow order. Deleted tasks have no column.
pub fn board<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<(Status, Vec<&'a Task>)> {
    let mut columns: Vec<(Status, Vec<&Task>)> =
        Status::WORKFLOW.iter().map(|s| (*s, Vec::new())).collect();
    for t in tasks {
        if let Some((_, col)) = columns.iter_mut().find(|(s, _)| *s == t.status) {
            col.push(t);
        }
    }
    columns
}

/// The seven days starting today, each with the tasks due that day.
pub fn week<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    today: NaiveDate,
) -> Vec<(NaiveDate, Vec<&'a Task>)> {
    let tasks: Vec<&Task> = tasks.into_iter().collect();
    (0..HORIZON_DAYS)
        .map(|i| {
            let day = today + Duration::days(i);
            let due: Vec<&Task> = tasks.iter().copied().filter(|t| t.deadline == Some(day)).collect();
            (day, due)
        })
        .collect()
}

pub fn print_summary(s: &Summary) {
    println!("Total tasks:        {}", s.total);
    println!("Overdue:            {}", s.overdue);
    println!("Upcoming (7 days):  {}", s.upcoming);
    println!("Overall progress:   {:.1}%", s.mean_progress);

    println!("\nBy status");
    for (status, n) in &s.by_status {
        println!("  {:<12} {n}", status.as_str());
    }
    if !s.by_category.is_empty() {
        println!("\nBy category");
        for (c, n) in &s.by_category {
            println!("  {c:<20} {n}");
        }
    }
    if !s.by_responsible.is_empty() {
        println!("\nWorkload");
        for (r, n) in &s.by_responsible {
            println!("  {r:<20} {n}");
        }
    }
}

pub fn print_board(columns: &[(Status, Vec<&Task>)]) {
    for (status, tasks) in columns {
        println!("== {} ({})", status, tasks.len());
        for t in tasks {
            let due = t
                .deadline
                .map(|d| d.to_string())
                .unwrap_or_else(|| "No deadline".to_string());
            println!(
                "  #{} {} | {} | {} | {}%",
                t.id, t.description, due, t.responsible, t.progress
            );
        }
    }
}

pub fn print_week(days: &[(NaiveDate, Vec<&Task>)]) {
    for (day, tasks) in days {
        println!("{}", day.format("%a %m/%d"));
        if tasks.is_empty() {
            println!("  -");
        }
        for t in tasks {
            println!(
                "  [{}] #{} {} | {} | {}%",
                t.priority, t.id, t.description, t.responsible, t.progress
            );
        }
    }
}
