//! Task command handlers

use anyhow::{anyhow, bail, Result};

use meridian_core::{Dataset, DateKey};

use super::{save, Session};
use crate::output::{DayView, Output, OutputFormat};

/// Add a task to a date
pub async fn add(session: &mut Session, date: DateKey, text: String, output: &Output) -> Result<()> {
    let Some(id) = session.dataset_mut().add_task(date, &text) else {
        bail!("Task text cannot be empty");
    };
    save(session, output).await?;

    match (output.format, session.dataset().task(date, id)) {
        (OutputFormat::Human, _) | (_, None) => {
            output.success(&format!("Added task {} on {}", id, date));
        }
        (_, Some(task)) => output.print_task(date, task),
    }
    Ok(())
}

/// List one date's tasks and memo
pub fn list(session: &Session, date: DateKey, output: &Output) -> Result<()> {
    output.print_day(&day_view(session.dataset(), date));
    Ok(())
}

/// List every date that has tasks or a memo, in date order
pub fn list_all(session: &Session, output: &Output) -> Result<()> {
    let dataset = session.dataset();
    let mut dates: Vec<DateKey> = dataset
        .tasks
        .keys()
        .chain(dataset.memos.keys())
        .copied()
        .collect();
    dates.sort();
    dates.dedup();

    let days: Vec<_> = dates.into_iter().map(|d| day_view(dataset, d)).collect();
    output.print_days(&days);
    Ok(())
}

fn day_view(dataset: &Dataset, date: DateKey) -> DayView<'_> {
    DayView {
        date,
        tasks: dataset.tasks_for(date),
        memo: dataset.memo(date),
        completed: dataset.is_date_completed(date),
    }
}

/// Toggle a task's completed flag
pub async fn toggle(
    session: &mut Session,
    id: u64,
    date: Option<DateKey>,
    output: &Output,
) -> Result<()> {
    let date = locate(session.dataset(), id, date)?;
    let completed = session
        .dataset_mut()
        .toggle_task(date, id)
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;
    save(session, output).await?;

    let state = if completed { "done" } else { "not done" };
    output.success(&format!("Marked task {} {}", id, state));
    if session.dataset().is_date_completed(date) {
        output.message(&format!("All tasks on {} are complete", date));
    }
    Ok(())
}

/// Replace a task's text
pub async fn edit(
    session: &mut Session,
    id: u64,
    date: Option<DateKey>,
    text: String,
    output: &Output,
) -> Result<()> {
    let date = locate(session.dataset(), id, date)?;
    if !session.dataset_mut().edit_task(date, id, &text) {
        bail!("Task text cannot be empty");
    }
    save(session, output).await?;

    output.success(&format!("Updated task {}", id));
    Ok(())
}

/// Delete a task
pub async fn delete(
    session: &mut Session,
    id: u64,
    date: Option<DateKey>,
    output: &Output,
) -> Result<()> {
    let date = locate(session.dataset(), id, date)?;
    let removed = session
        .dataset_mut()
        .delete_task(date, id)
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;
    save(session, output).await?;

    output.success(&format!("Deleted task {}: {}", removed.id, removed.text));
    Ok(())
}

/// Copy a task to the following day
pub async fn copy_next(
    session: &mut Session,
    id: u64,
    date: Option<DateKey>,
    output: &Output,
) -> Result<()> {
    let date = locate(session.dataset(), id, date)?;
    let new_id = session
        .dataset_mut()
        .copy_task_to_next_day(date, id)
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;
    save(session, output).await?;

    let next = date.succ_opt().unwrap_or(date);
    output.success(&format!("Copied task {} to {} as {}", id, next, new_id));
    Ok(())
}

/// Move a task onto another task's position within one day
pub async fn reorder(
    session: &mut Session,
    id: u64,
    onto: u64,
    date: Option<DateKey>,
    output: &Output,
) -> Result<()> {
    let date = locate(session.dataset(), id, date)?;
    if session.dataset().task(date, onto).is_none() {
        bail!("Task {} is not on {}", onto, date);
    }
    if !session.dataset_mut().reorder_task(date, id, onto) {
        output.message("Nothing to move");
        return Ok(());
    }
    save(session, output).await?;

    output.success(&format!("Moved task {}", id));
    output.print_day(&day_view(session.dataset(), date));
    Ok(())
}

/// Find the date a task belongs to
///
/// With an explicit date only that bucket is searched.
fn locate(dataset: &Dataset, id: u64, date: Option<DateKey>) -> Result<DateKey> {
    match date {
        Some(date) => dataset
            .task(date, id)
            .map(|_| date)
            .ok_or_else(|| anyhow!("Task {} not found on {}", id, date)),
        None => dataset
            .tasks
            .iter()
            .find(|(_, tasks)| tasks.iter().any(|t| t.id == id))
            .map(|(date, _)| *date)
            .ok_or_else(|| anyhow!("Task not found: {}", id)),
    }
}
