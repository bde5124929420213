//! Memo command handlers

use anyhow::Result;

use meridian_core::DateKey;

use super::{save, Session};
use crate::output::{Output, OutputFormat};

/// Set a date's memo; empty text removes it
pub async fn set(session: &mut Session, date: DateKey, text: String, output: &Output) -> Result<()> {
    let had_memo = session.dataset().memo(date).is_some();
    if text.trim().is_empty() && !had_memo {
        output.message(&format!("No memo on {}", date));
        return Ok(());
    }

    session.dataset_mut().set_memo(date, &text);
    save(session, output).await?;

    if session.dataset().memo(date).is_some() {
        output.success(&format!("Saved memo for {}", date));
    } else {
        output.success(&format!("Removed memo for {}", date));
    }
    Ok(())
}

/// Print a date's memo
pub fn show(session: &Session, date: DateKey, output: &Output) -> Result<()> {
    let memo = session.dataset().memo(date);

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({ "date": date, "memo": memo }));
        }
        OutputFormat::Quiet => {
            if let Some(memo) = memo {
                println!("{}", memo);
            }
        }
        OutputFormat::Human => match memo {
            Some(memo) => {
                println!("Memo for {}:", date.format("%Y-%m-%d (%a)"));
                println!();
                println!("{}", memo);
            }
            None => println!("No memo on {}.", date),
        },
    }

    Ok(())
}
