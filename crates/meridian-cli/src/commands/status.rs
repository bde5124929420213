//! Status command handler

use anyhow::Result;

use meridian_core::{Config, LocalStore};

use super::Session;
use crate::output::{Output, OutputFormat};

/// Show sync mode, storage and dataset summary
pub fn show(session: &Session, config: &Config, output: &Output) -> Result<()> {
    let dataset = session.dataset();
    let status = session.status();
    let credentials = session.credentials();
    let store = meridian_core::FileStore::new(config);

    let token_source = if config.token_override.is_some() {
        "environment"
    } else if credentials.has_token() {
        "stored"
    } else {
        "none"
    };

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({
                "status": status,
                "remote": {
                    "enabled": session.remote_enabled(),
                    "sync_enabled": config.sync_enabled,
                    "url": config.remote_url,
                    "token": token_source,
                    "document_id": credentials.document_id,
                },
                "storage": {
                    "data_dir": config.data_dir,
                    "dataset_exists": store.exists(),
                    "dataset_size": store.dataset_size(),
                    "capacity": config.local_capacity_bytes,
                },
                "dataset": {
                    "dates": dataset.tasks.len(),
                    "tasks": dataset.task_count(),
                    "memos": dataset.memos.len(),
                    "task_id_counter": dataset.task_id_counter,
                    "last_sync": dataset.last_sync,
                    "version": dataset.version,
                }
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", status.status);
        }
        OutputFormat::Human => {
            println!("Meridian Status");
            println!("===============");
            println!();
            print!("Sync: ");
            output.print_status(status);
            println!(
                "  Mode:     {}",
                if session.remote_enabled() {
                    "remote"
                } else {
                    "local"
                }
            );
            println!("  Enabled:  {}", config.sync_enabled);
            println!("  Token:    {}", token_source);
            println!("  Server:   {}", config.remote_url);
            println!(
                "  Document: {}",
                credentials.document_id.as_deref().unwrap_or("(not yet known)")
            );
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!(
                "  Size:     {} / {} bytes",
                store.dataset_size(),
                config.local_capacity_bytes
            );
            println!();
            println!("Contents:");
            println!("  Tasks: {} on {} day(s)", dataset.task_count(), dataset.tasks.len());
            println!("  Memos: {}", dataset.memos.len());
            if let Some(last_sync) = dataset.last_sync {
                println!("  Last saved: {}", last_sync.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }

    // A readable credential slot is part of a healthy setup
    if let Err(e) = store.load_credentials() {
        output.warning(&format!("Sync settings unreadable: {}", e));
        if let Some(hint) = e.recovery_suggestion() {
            output.warning(hint);
        }
    }

    Ok(())
}
