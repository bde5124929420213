//! Day command handlers

use anyhow::Result;

use meridian_core::DateKey;

use super::{save, Session};
use crate::output::Output;

/// Delete every task of a date
pub async fn clear(session: &mut Session, date: DateKey, output: &Output) -> Result<()> {
    let removed = session.dataset_mut().clear_date(date);
    if removed == 0 {
        output.message(&format!("No tasks on {}", date));
        return Ok(());
    }
    save(session, output).await?;

    output.success(&format!("Removed {} task(s) from {}", removed, date));
    Ok(())
}

/// Paste a copy of one date's tasks onto another
pub async fn copy(session: &mut Session, from: DateKey, to: DateKey, output: &Output) -> Result<()> {
    let clipboard = session.dataset().copy_tasks(from);
    if clipboard.is_empty() {
        output.message(&format!("No tasks on {}", from));
        return Ok(());
    }

    let pasted = session.dataset_mut().paste_tasks(to, &clipboard);
    save(session, output).await?;

    output.success(&format!("Copied {} task(s) from {} to {}", pasted, from, to));
    Ok(())
}
