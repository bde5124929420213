//! Sync command handlers

use anyhow::{bail, Context, Result};

use meridian_core::{spawn_engine, Config, SyncCredentials, SyncStatus};

use super::Session;
use crate::output::Output;

/// Store credentials and push the current dataset
pub async fn login(
    session: &mut Session,
    token: String,
    document_id: Option<String>,
    output: &Output,
) -> Result<()> {
    let credentials = SyncCredentials::new(token, document_id);
    if !credentials.has_token() {
        bail!("Token cannot be empty");
    }

    session
        .set_credentials(credentials)
        .await
        .context("Failed to store sync settings")?;

    if !session.remote_enabled() {
        output.success("Token stored");
        output.warning(
            "Sync is disabled. Enable it with:\n  meridian config set sync_enabled true",
        );
        return Ok(());
    }

    let status = session.status();
    if status.status == SyncStatus::Error {
        bail!("Token stored but the first push failed: {}", status.message);
    }

    output.success("Token stored");
    if let Some(id) = &session.credentials().document_id {
        output.message(&format!("  Remote document: {}", id));
    }
    Ok(())
}

/// Forget stored credentials
pub fn logout(session: &mut Session, output: &Output) -> Result<()> {
    if !session.credentials().has_token() {
        output.message("No stored token");
        return Ok(());
    }

    session
        .clear_credentials()
        .context("Failed to clear sync settings")?;

    output.success("Token removed; data stays on this device");
    Ok(())
}

/// Pull the remote document, then push the merged result back
///
/// Loading already fetched the remote copy, so this reports what was pulled
/// and writes it to both stores.
pub async fn sync(session: &mut Session, output: &Output) -> Result<()> {
    require_remote(session)?;

    if session.status().status == SyncStatus::Error {
        bail!("Sync failed: {}", session.status().message);
    }

    let dataset = session.dataset();
    output.message(&format!(
        "Pulled {} task(s) and {} memo(s)",
        dataset.task_count(),
        dataset.memos.len()
    ));

    push(session, output).await
}

/// Write the dataset to the local slot and the remote document now
pub async fn push(session: &mut Session, output: &Output) -> Result<()> {
    let ok = session.persist_now().await;
    let status = session.status().clone();

    if !ok {
        bail!("{}", status.message);
    }
    output.success(&status.message);
    Ok(())
}

/// Run the persistence engine in the foreground, printing status changes
///
/// Debounced saves and polling run until Ctrl-C, which flushes pending edits.
pub async fn watch(config: &Config, output: &Output) -> Result<()> {
    let session = Session::open(config)?;
    let handle = spawn_engine(session);
    let mut status_rx = handle.subscribe_status();

    output.message("Watching for changes (Ctrl-C to stop)");
    output.print_status(&status_rx.borrow_and_update().clone());

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status_rx.borrow_and_update().clone();
                output.print_status(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                output.message("Stopping...");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn require_remote(session: &Session) -> Result<()> {
    if session.remote_enabled() {
        return Ok(());
    }
    if !session.credentials().has_token() {
        bail!(
            "No remote token configured. Log in with:\n  \
             meridian login <TOKEN>\n\
             or set MERIDIAN_TOKEN for this session"
        );
    }
    bail!("Sync is not enabled. Enable it with:\n  meridian config set sync_enabled true")
}
