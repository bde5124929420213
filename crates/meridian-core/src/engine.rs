//! Background persistence engine
//!
//! Runs a [`Coordinator`] on its own task. Consumers talk to it through an
//! [`EngineHandle`]; the task multiplexes their commands with the
//! coordinator's timers and with the network requests already out, so edits
//! and snapshots are served while a save or refresh waits on the remote. The
//! dataset itself is only touched by the task and needs no lock.
//!
//! The task loads the dataset on start, arms the poll timer, and flushes any
//! pending save on shutdown.

use std::future;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::coordinator::{Coordinator, Progress, RemoteOutcome};
use crate::models::{Dataset, SyncCredentials};
use crate::storage::{LocalStore, StorageResult};
use crate::sync::{RemoteStore, StatusSnapshot};

type Mutation = Box<dyn FnOnce(&mut Dataset) + Send>;

/// Network requests in flight, each with the caller waiting on it (if any)
type InFlight = JoinSet<(RemoteOutcome, Option<oneshot::Sender<bool>>)>;

/// Commands sent to the engine task
pub enum EngineCommand {
    /// Edit the dataset, then request a debounced save
    Mutate(Mutation),
    /// Copy of the current dataset
    Snapshot(oneshot::Sender<Dataset>),
    /// Pull from the remote document now
    Refresh(oneshot::Sender<bool>),
    /// Persist now, skipping the debounce window
    Push(oneshot::Sender<bool>),
    /// Persist a pending save, if any
    Flush(oneshot::Sender<bool>),
    SetCredentials(SyncCredentials, oneshot::Sender<StorageResult<()>>),
    ClearCredentials(oneshot::Sender<StorageResult<()>>),
    /// Flush and stop the task
    Shutdown,
}

/// The engine task is gone
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Persistence engine has stopped")]
pub struct EngineStopped;

/// Handle to control the engine task
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    status_rx: watch::Receiver<StatusSnapshot>,
    task: JoinHandle<()>,
}

/// Spawn the engine task
///
/// Must be called from within a tokio runtime.
pub fn spawn_engine<L, R>(coordinator: Coordinator<L, R>) -> EngineHandle
where
    L: LocalStore + Send + 'static,
    R: RemoteStore + Send + Sync + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    let status_rx = coordinator.subscribe_status();
    let task = tokio::spawn(engine_loop(coordinator, command_rx));

    EngineHandle {
        command_tx,
        status_rx,
        task,
    }
}

async fn engine_loop<L, R>(
    mut coordinator: Coordinator<L, R>,
    mut command_rx: mpsc::Receiver<EngineCommand>,
) where
    L: LocalStore,
    R: RemoteStore + Send + Sync + 'static,
{
    // Commands queue up until the first load is done
    coordinator.load_initial().await;
    coordinator.start_polling();
    info!("Persistence engine started");

    let mut in_flight = InFlight::new();

    loop {
        let deadline = coordinator.next_deadline();

        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(cmd) => handle_command(&mut coordinator, &mut in_flight, cmd),
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                finish(&mut coordinator, joined);
            }
            _ = sleep_until(deadline) => {
                let tasks = coordinator.fire_due_timers();
                debug!("Timers started {} request(s)", tasks.len());
                for task in tasks {
                    track(&mut in_flight, Progress::Pending(task), None);
                }
            }
        }
    }

    let progress = coordinator.start_flush();
    track(&mut in_flight, progress, None);
    while let Some(joined) = in_flight.join_next().await {
        finish(&mut coordinator, joined);
    }

    coordinator.stop_polling();
    info!("Persistence engine stopped");
}

fn track(in_flight: &mut InFlight, progress: Progress, reply: Option<oneshot::Sender<bool>>) {
    match progress {
        Progress::Done(ok) => {
            if let Some(reply) = reply {
                let _ = reply.send(ok);
            }
        }
        Progress::Pending(task) => {
            in_flight.spawn(async move { (task.await, reply) });
        }
    }
}

fn finish<L, R>(
    coordinator: &mut Coordinator<L, R>,
    joined: Result<(RemoteOutcome, Option<oneshot::Sender<bool>>), tokio::task::JoinError>,
) where
    L: LocalStore,
    R: RemoteStore + Send + Sync + 'static,
{
    match joined {
        Ok((outcome, reply)) => {
            let ok = coordinator.complete(outcome);
            if let Some(reply) = reply {
                let _ = reply.send(ok);
            }
        }
        Err(e) => {
            warn!("Remote request task failed: {}", e);
            coordinator.abandon(&e.to_string());
        }
    }
}

fn handle_command<L, R>(
    coordinator: &mut Coordinator<L, R>,
    in_flight: &mut InFlight,
    cmd: EngineCommand,
) where
    L: LocalStore,
    R: RemoteStore + Send + Sync + 'static,
{
    match cmd {
        EngineCommand::Mutate(mutation) => {
            mutation(coordinator.dataset_mut());
            coordinator.request_save();
        }
        EngineCommand::Snapshot(reply) => {
            let _ = reply.send(coordinator.dataset().clone());
        }
        EngineCommand::Refresh(reply) => {
            track(in_flight, coordinator.start_refresh(), Some(reply));
        }
        EngineCommand::Push(reply) => {
            track(in_flight, coordinator.start_persist(), Some(reply));
        }
        EngineCommand::Flush(reply) => {
            track(in_flight, coordinator.start_flush(), Some(reply));
        }
        EngineCommand::SetCredentials(credentials, reply) => {
            match coordinator.apply_credentials(credentials) {
                Ok(progress) => {
                    let _ = reply.send(Ok(()));
                    track(in_flight, progress, None);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        }
        EngineCommand::ClearCredentials(reply) => {
            let _ = reply.send(coordinator.clear_credentials());
        }
        EngineCommand::Shutdown => {}
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

impl EngineHandle {
    /// Current status
    pub fn status(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    /// Apply an edit to the dataset and schedule a debounced save
    ///
    /// Returns the closure's result once the edit has been applied.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T, EngineStopped>
    where
        F: FnOnce(&mut Dataset) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mutation: Mutation = Box::new(move |dataset| {
            let _ = tx.send(f(dataset));
        });
        self.send(EngineCommand::Mutate(mutation)).await?;
        rx.await.map_err(|_| EngineStopped)
    }

    pub async fn snapshot(&self) -> Result<Dataset, EngineStopped> {
        self.request(EngineCommand::Snapshot).await
    }

    /// Pull from the remote document; true if the dataset was replaced
    pub async fn refresh(&self) -> Result<bool, EngineStopped> {
        self.request(EngineCommand::Refresh).await
    }

    /// Persist immediately; true if every write succeeded
    pub async fn push(&self) -> Result<bool, EngineStopped> {
        self.request(EngineCommand::Push).await
    }

    pub async fn flush(&self) -> Result<bool, EngineStopped> {
        self.request(EngineCommand::Flush).await
    }

    pub async fn set_credentials(
        &self,
        credentials: SyncCredentials,
    ) -> Result<StorageResult<()>, EngineStopped> {
        self.request(|reply| EngineCommand::SetCredentials(credentials, reply))
            .await
    }

    pub async fn clear_credentials(&self) -> Result<StorageResult<()>, EngineStopped> {
        self.request(EngineCommand::ClearCredentials).await
    }

    /// Flush pending edits and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown).await;
        let _ = self.task.await;
    }

    async fn send(&self, cmd: EngineCommand) -> Result<(), EngineStopped> {
        self.command_tx.send(cmd).await.map_err(|_| EngineStopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Timing};
    use crate::models::parse_date_key;
    use crate::storage::FileStore;
    use crate::sync::{RemoteError, RemoteResult, SyncStatus};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Remote double for local-mode tests; never reached
    struct Unreachable;

    impl RemoteStore for Unreachable {
        async fn find_existing_document(&self, _token: &str) -> RemoteResult<Option<String>> {
            Err(RemoteError::Auth { status: 401 })
        }

        async fn fetch_document(&self, _token: &str, _id: &str) -> RemoteResult<Option<Dataset>> {
            Err(RemoteError::Auth { status: 401 })
        }

        async fn push_document(
            &self,
            _token: &str,
            _id: Option<&str>,
            _dataset: &Dataset,
        ) -> RemoteResult<String> {
            Err(RemoteError::Auth { status: 401 })
        }
    }

    fn spawn_local(temp_dir: &TempDir) -> EngineHandle {
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        spawn_engine(Coordinator::new(local, Unreachable, Timing::default(), true))
    }

    fn stored(temp_dir: &TempDir) -> Option<Dataset> {
        FileStore::new(&Config::with_data_dir(temp_dir.path()))
            .load()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_is_saved_after_debounce() {
        let temp_dir = TempDir::new().unwrap();
        let engine = spawn_local(&temp_dir);
        let d = parse_date_key("2024-05-01").unwrap();

        let id = engine.mutate(move |ds| ds.add_task(d, "write tests")).await.unwrap();
        assert_eq!(id, Some(1));
        assert!(stored(&temp_dir).is_none());

        time::sleep(Duration::from_millis(1_100)).await;
        engine.snapshot().await.unwrap();
        assert_eq!(stored(&temp_dir).unwrap().task_count(), 1);

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_edit() {
        let temp_dir = TempDir::new().unwrap();
        let engine = spawn_local(&temp_dir);
        let d = parse_date_key("2024-05-01").unwrap();

        engine.mutate(move |ds| ds.set_memo(d, "remember")).await.unwrap();
        engine.shutdown().await;

        assert_eq!(stored(&temp_dir).unwrap().memo(d), Some("remember"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reaches_subscribers() {
        let temp_dir = TempDir::new().unwrap();
        let engine = spawn_local(&temp_dir);
        let mut status_rx = engine.subscribe_status();

        assert!(engine.push().await.unwrap());
        assert_eq!(engine.status().status, SyncStatus::Saved);

        // Saved decays back to local after the dwell time
        status_rx
            .wait_for(|s| s.status == SyncStatus::Local)
            .await
            .unwrap();

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_in_local_mode_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let engine = spawn_local(&temp_dir);

        assert!(!engine.refresh().await.unwrap());
        assert_eq!(engine.status().status, SyncStatus::Local);

        engine.shutdown().await;
    }
}
