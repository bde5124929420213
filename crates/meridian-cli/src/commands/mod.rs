//! Command handlers

pub mod config;
pub mod day;
pub mod memo;
pub mod status;
pub mod sync;
pub mod task;

use anyhow::{bail, Result};

use meridian_core::{Coordinator, FileStore, RemoteClient};

use crate::output::Output;

/// Coordinator over the on-disk store and the HTTP remote client
pub type Session = Coordinator<FileStore, RemoteClient>;

/// Schedule a save for the edit just made and flush it before exit
///
/// A failed remote push is only a warning since the local slot still holds
/// the data; a failed local write is an error.
pub async fn save(session: &mut Session, output: &Output) -> Result<()> {
    session.request_save();
    if session.flush().await {
        return Ok(());
    }

    let status = session.status().clone();
    match status.error {
        Some(kind) if kind.is_remote() => {
            output.warning(&status.message);
            Ok(())
        }
        _ => bail!("{}", status.message),
    }
}
