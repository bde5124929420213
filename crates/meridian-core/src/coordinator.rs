//! Persistence coordinator
//!
//! The `Coordinator` owns the live [`Dataset`] and decides where it comes from
//! and where it goes:
//!
//! - **Load**: remote first when sync is enabled, then the local slot, then an
//!   empty dataset. Failures fall through to the next source.
//! - **Save**: debounced through [`Coordinator::request_save`]. A save always
//!   writes the local slot first and then pushes to the remote document; each
//!   side fails independently.
//! - **Refresh**: pulls the remote dataset and replaces the in-memory one
//!   wholesale. Edits that have not been saved yet are lost (last write
//!   wins).
//!
//! Saves and refreshes are split in two. `start_*` does the synchronous part
//! (local write, status change) and hands back a [`RemoteTask`] that owns
//! everything the network call needs; [`Coordinator::complete`] applies its
//! outcome. The engine runs those tasks alongside new commands, so several
//! may be in flight at once and the last response to arrive wins.
//!
//! ## Usage
//!
//! ```ignore
//! let mut coordinator = Coordinator::open(&config)?;
//! coordinator.load_initial().await;
//!
//! coordinator.dataset_mut().add_task(today, "Write report");
//! coordinator.request_save();
//!
//! // Drive timers (debounce, dwell, poll) and wait for their network calls
//! coordinator.run_due_timers().await;
//! ```
//!
//! All errors are absorbed here. They surface as an `error` status with a
//! short message, never as a failure returned to the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, Timing};
use crate::error::ErrorKind;
use crate::models::{Dataset, SyncCredentials};
use crate::scheduler::{Scheduler, TimerKind, TimerToken};
use crate::storage::{FileStore, LocalStore, StorageResult};
use crate::sync::{RemoteClient, RemoteError, RemoteResult, RemoteStore, StatusMachine};
use crate::sync::{StatusSnapshot, SyncStatus};

/// Network half of a save or refresh, detached from the coordinator
pub type RemoteTask = Pin<Box<dyn Future<Output = RemoteOutcome> + Send>>;

/// Response of a [`RemoteTask`], applied with [`Coordinator::complete`]
pub struct RemoteOutcome(Outcome);

enum Outcome {
    Pushed {
        local: LocalWrite,
        result: RemoteResult<String>,
    },
    Fetched {
        discovered: Option<String>,
        result: RemoteResult<Option<Dataset>>,
    },
}

/// Where an operation stands once its synchronous part has run
pub enum Progress {
    /// Finished; true on success
    Done(bool),
    /// Waiting on the network
    Pending(RemoteTask),
}

/// Result of the local half of a save
struct LocalWrite {
    written: bool,
    failure: Option<(ErrorKind, String)>,
    last_sync: Option<DateTime<Utc>>,
    version: String,
    task_count: usize,
}

/// Owner of the in-memory dataset and its persistence
pub struct Coordinator<L, R> {
    local: L,
    remote: Arc<R>,
    dataset: Dataset,
    credentials: SyncCredentials,
    /// Token from the environment; used instead of the stored one, never saved
    session_token: Option<String>,
    sync_enabled: bool,
    status: StatusMachine,
    scheduler: Scheduler,
    timing: Timing,
    /// Remote requests started and not yet completed
    in_flight: usize,
    /// Armed dwell timer and the transient status it is allowed to decay
    dwell: Option<(TimerToken, SyncStatus)>,
    polling: bool,
}

impl Coordinator<FileStore, RemoteClient> {
    /// Build a coordinator over the file store and HTTP client described by
    /// the configuration
    pub fn open(config: &Config) -> Result<Self> {
        let local = FileStore::new(config);
        let remote = RemoteClient::new(&config.remote_url, config.timing.request_timeout())
            .context("Failed to build remote store client")?;

        let mut coordinator = Self::new(local, remote, config.timing.clone(), config.sync_enabled);
        if let Some(token) = &config.token_override {
            coordinator.set_session_token(Some(token.clone()));
        }
        Ok(coordinator)
    }
}

impl<L, R> Coordinator<L, R>
where
    L: LocalStore,
    R: RemoteStore + Send + Sync + 'static,
{
    /// Create a coordinator with an empty dataset
    ///
    /// Stored credentials are read immediately; an unreadable credential slot
    /// is treated as "no credentials".
    pub fn new(local: L, remote: R, timing: Timing, sync_enabled: bool) -> Self {
        let credentials = match local.load_credentials() {
            Ok(credentials) => credentials.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable sync settings: {}", e);
                SyncCredentials::default()
            }
        };

        let remote_enabled = sync_enabled && credentials.has_token();
        Self {
            local,
            remote: Arc::new(remote),
            dataset: Dataset::new(),
            credentials,
            session_token: None,
            sync_enabled,
            status: StatusMachine::new(remote_enabled),
            scheduler: Scheduler::new(),
            timing,
            in_flight: 0,
            dwell: None,
            polling: false,
        }
    }

    // ==================== Accessors ====================

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Mutable access for edits; follow every change with [`Self::request_save`]
    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    pub fn status(&self) -> &StatusSnapshot {
        self.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn credentials(&self) -> &SyncCredentials {
        &self.credentials
    }

    /// True when sync is enabled and a token is available
    pub fn remote_enabled(&self) -> bool {
        self.remote_token().is_some()
    }

    fn remote_token(&self) -> Option<String> {
        if !self.sync_enabled {
            return None;
        }
        self.session_token
            .clone()
            .or_else(|| self.credentials.has_token().then(|| self.credentials.token.clone()))
    }

    /// True while a debounced save is waiting to fire
    pub fn has_pending_save(&self) -> bool {
        self.scheduler.pending(TimerKind::Debounce).is_some()
    }

    /// Number of remote requests started and not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Earliest timer deadline, for the driver loop to sleep until
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    // ==================== Mode ====================

    /// Use a token for this session only
    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token.filter(|t| !t.trim().is_empty());
        self.mode_changed();
    }

    pub fn set_sync_enabled(&mut self, enabled: bool) {
        self.sync_enabled = enabled;
        self.mode_changed();
    }

    /// Store new credentials and push the dataset if remote sync is now active
    pub async fn set_credentials(&mut self, credentials: SyncCredentials) -> StorageResult<()> {
        let progress = self.apply_credentials(credentials)?;
        self.drive(progress).await;
        Ok(())
    }

    /// Store new credentials and start a push if remote sync is now active
    pub fn apply_credentials(&mut self, mut credentials: SyncCredentials) -> StorageResult<Progress> {
        credentials.normalize();
        self.local.save_credentials(&credentials)?;
        info!("Stored sync credentials");
        self.credentials = credentials;
        self.mode_changed();

        if self.remote_enabled() {
            Ok(self.start_persist())
        } else {
            Ok(Progress::Done(true))
        }
    }

    /// Forget stored credentials and fall back to local mode
    pub fn clear_credentials(&mut self) -> StorageResult<()> {
        self.local.clear_credentials()?;
        info!("Cleared sync credentials");
        self.credentials = SyncCredentials::default();
        self.mode_changed();
        Ok(())
    }

    fn mode_changed(&mut self) {
        let enabled = self.remote_enabled();
        self.status.set_remote_enabled(enabled);
        if self.polling {
            self.schedule_poll();
        }
    }

    fn remember_document_id(&mut self, id: String) {
        if self.credentials.document_id.as_deref() == Some(id.as_str()) {
            return;
        }
        info!("Using remote document {}", id);
        self.credentials.document_id = Some(id);
        if let Err(e) = self.local.save_credentials(&self.credentials) {
            warn!("Could not store remote document id: {}", e);
        }
    }

    fn forget_document_id(&mut self) {
        if self.credentials.document_id.take().is_some() {
            warn!("Remote document is gone; a new one will be created on next save");
            if let Err(e) = self.local.save_credentials(&self.credentials) {
                warn!("Could not update sync settings: {}", e);
            }
        }
    }

    // ==================== Load ====================

    /// Load the dataset at startup
    ///
    /// Tries the remote document (when sync is enabled), then the local slot,
    /// then starts empty. A remote failure shows a transient error and falls
    /// back to local data. Reads never create a remote document.
    pub async fn load_initial(&mut self) -> &Dataset {
        let mut loaded = None;

        if let Some(token) = self.remote_token() {
            self.begin_syncing("Loading from remote...");
            let cached = self.credentials.document_id.clone();
            self.in_flight += 1;
            let (discovered, result) = fetch_remote(self.remote.as_ref(), &token, cached).await;
            self.in_flight -= 1;
            if let Some(id) = discovered {
                self.remember_document_id(id);
            }

            match result {
                Ok(Some(dataset)) => {
                    info!("Loaded {} tasks from remote", dataset.task_count());
                    loaded = Some(dataset);
                    self.succeed("Loaded from remote");
                }
                Ok(None) => {
                    debug!("No remote dataset yet, reading local slot");
                    self.settle();
                }
                Err(e) => {
                    warn!("Remote load failed, falling back to local data: {}", e);
                    self.fail(e.kind(), format!("Remote load failed: {}", e));
                }
            }
        }

        if loaded.is_none() {
            match self.local.load() {
                Ok(Some(dataset)) => {
                    info!("Loaded {} tasks from local slot", dataset.task_count());
                    loaded = Some(dataset);
                    if !self.remote_enabled() {
                        self.succeed("Loaded local data");
                    }
                }
                Ok(None) => debug!("Local slot is empty"),
                Err(e) => {
                    warn!("Local data unreadable, starting empty: {}", e);
                    let (kind, message) = match self.status.snapshot().error {
                        Some(kind) => (
                            kind,
                            format!("{}; local data unreadable: {}", self.status().message, e),
                        ),
                        None => (e.kind(), format!("Local data unreadable: {}", e)),
                    };
                    self.fail(kind, message);
                }
            }
        }

        self.adopt(loaded.unwrap_or_default());
        &self.dataset
    }

    /// Replace the in-memory dataset, keeping the id counter monotonic
    fn adopt(&mut self, mut incoming: Dataset) {
        incoming.normalize();
        incoming.task_id_counter = incoming.task_id_counter.max(self.dataset.task_id_counter);
        self.dataset = incoming;
    }

    // ==================== Save ====================

    /// Ask for the dataset to be saved after the debounce window
    ///
    /// Each call restarts the window, so a burst of edits produces one save.
    pub fn request_save(&mut self) {
        self.scheduler
            .schedule_in(TimerKind::Debounce, Instant::now(), self.timing.debounce());
        debug!("Save requested, waiting {:?}", self.timing.debounce());
    }

    /// Persist a pending debounced save immediately, if there is one
    pub async fn flush(&mut self) -> bool {
        let progress = self.start_flush();
        self.drive(progress).await
    }

    pub fn start_flush(&mut self) -> Progress {
        if self.has_pending_save() {
            self.start_persist()
        } else {
            Progress::Done(true)
        }
    }

    /// Write the dataset now: local slot first, then the remote document
    ///
    /// A local failure does not stop the remote push and vice versa. When the
    /// local write fails a degraded copy goes to the fallback slot. Returns
    /// true when every write succeeded.
    pub async fn persist_now(&mut self) -> bool {
        let progress = self.start_persist();
        self.drive(progress).await
    }

    /// Write the local slot and start the remote push
    pub fn start_persist(&mut self) -> Progress {
        self.scheduler.cancel_kind(TimerKind::Debounce);

        let mut snapshot = self.dataset.clone();
        snapshot.stamp(Utc::now());

        self.begin_saving("Saving...");
        let local = self.write_local(&snapshot);

        let Some(token) = self.remote_token() else {
            return Progress::Done(self.finish_persist(local, None));
        };

        self.begin_syncing("Syncing to remote...");
        self.in_flight += 1;
        let remote = Arc::clone(&self.remote);
        let document_id = self.credentials.document_id.clone();
        Progress::Pending(Box::pin(async move {
            let result = remote
                .push_document(&token, document_id.as_deref(), &snapshot)
                .await;
            RemoteOutcome(Outcome::Pushed { local, result })
        }))
    }

    fn write_local(&mut self, snapshot: &Dataset) -> LocalWrite {
        let mut failure = None;
        match self.local.save(snapshot) {
            Ok(()) => debug!("Local slot written"),
            Err(e) => {
                warn!("Local save failed: {}", e);
                if let Some(suggestion) = e.recovery_suggestion() {
                    debug!("{}", suggestion);
                }
                match self.local.save_fallback(snapshot) {
                    Ok(()) => info!("Wrote degraded copy to fallback slot"),
                    Err(fallback) => warn!("Fallback save failed too: {}", fallback),
                }
                failure = Some((e.kind(), format!("Local save failed: {}", e)));
            }
        }

        LocalWrite {
            written: failure.is_none(),
            failure,
            last_sync: snapshot.last_sync,
            version: snapshot.version.clone(),
            task_count: snapshot.task_count(),
        }
    }

    fn finish_persist(&mut self, local: LocalWrite, pushed: Option<RemoteResult<String>>) -> bool {
        let LocalWrite {
            mut written,
            failure,
            last_sync,
            version,
            task_count,
        } = local;
        let mut failures: Vec<(ErrorKind, String)> = failure.into_iter().collect();
        let remote = pushed.is_some();

        match pushed {
            Some(Ok(id)) => {
                debug!("Remote document {} written", id);
                self.remember_document_id(id);
                written = true;
            }
            Some(Err(e)) => {
                warn!("Remote push failed: {}", e);
                if matches!(e, RemoteError::DocumentNotFound { .. }) {
                    self.forget_document_id();
                }
                failures.push((e.kind(), format!("Sync failed: {}", e)));
            }
            None => {}
        }

        if written {
            self.dataset.last_sync = last_sync;
            self.dataset.version = version;
        }

        match failures.first() {
            None => {
                info!("Saved {} tasks", task_count);
                self.succeed(if remote {
                    "Synced to remote"
                } else {
                    "Saved locally"
                });
                true
            }
            Some(&(kind, _)) => {
                let message = failures
                    .iter()
                    .map(|(_, m)| m.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                self.fail(kind, message);
                false
            }
        }
    }

    // ==================== Refresh ====================

    /// Pull the remote dataset and replace the in-memory one
    ///
    /// Last write wins: edits made since the last save are discarded. Returns
    /// true when the dataset was replaced. Does nothing in local mode.
    pub async fn refresh_from_remote(&mut self) -> bool {
        let progress = self.start_refresh();
        self.drive(progress).await
    }

    /// Start a pull of the remote dataset
    pub fn start_refresh(&mut self) -> Progress {
        let Some(token) = self.remote_token() else {
            return Progress::Done(false);
        };

        self.begin_syncing("Checking remote...");
        self.in_flight += 1;
        let remote = Arc::clone(&self.remote);
        let cached = self.credentials.document_id.clone();
        Progress::Pending(Box::pin(async move {
            let (discovered, result) = fetch_remote(remote.as_ref(), &token, cached).await;
            RemoteOutcome(Outcome::Fetched { discovered, result })
        }))
    }

    fn finish_refresh(
        &mut self,
        discovered: Option<String>,
        result: RemoteResult<Option<Dataset>>,
    ) -> bool {
        if let Some(id) = discovered {
            self.remember_document_id(id);
        }

        match result {
            Ok(Some(dataset)) => {
                if self.has_pending_save() {
                    warn!("Remote refresh replaces unsaved local edits");
                }
                self.adopt(dataset);
                self.succeed("Refreshed from remote");
                true
            }
            Ok(None) => {
                debug!("No remote dataset to refresh from");
                self.settle();
                false
            }
            Err(e) => {
                warn!("Remote refresh failed: {}", e);
                self.fail(e.kind(), format!("Refresh failed: {}", e));
                false
            }
        }
    }

    // ==================== Completion ====================

    /// Apply the response of a finished [`RemoteTask`]
    ///
    /// Returns true when the operation succeeded.
    pub fn complete(&mut self, outcome: RemoteOutcome) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome.0 {
            Outcome::Pushed { local, result } => self.finish_persist(local, Some(result)),
            Outcome::Fetched { discovered, result } => self.finish_refresh(discovered, result),
        }
    }

    /// Account for a [`RemoteTask`] that ended without a response
    pub fn abandon(&mut self, reason: &str) {
        self.in_flight = self.in_flight.saturating_sub(1);
        warn!("Remote request abandoned: {}", reason);
        self.fail(ErrorKind::NetworkFailure, format!("Sync interrupted: {}", reason));
    }

    async fn drive(&mut self, progress: Progress) -> bool {
        match progress {
            Progress::Done(ok) => ok,
            Progress::Pending(task) => {
                let outcome = task.await;
                self.complete(outcome)
            }
        }
    }

    // ==================== Timers ====================

    /// Arm the periodic refresh (remote mode) or autosave (local mode)
    pub fn start_polling(&mut self) {
        self.polling = true;
        self.schedule_poll();
    }

    pub fn stop_polling(&mut self) {
        self.polling = false;
        self.scheduler.cancel_kind(TimerKind::Poll);
    }

    fn schedule_poll(&mut self) {
        let interval = self.timing.poll_interval(self.remote_enabled());
        self.scheduler
            .schedule_in(TimerKind::Poll, Instant::now(), interval);
    }

    /// Fire every timer whose deadline has passed
    ///
    /// Returns the network tasks the timers started; the caller completes
    /// them.
    pub fn fire_due_timers(&mut self) -> Vec<RemoteTask> {
        let mut tasks = Vec::new();

        for token in self.scheduler.take_due(Instant::now()) {
            let progress = match token.kind() {
                TimerKind::Debounce => {
                    debug!("Debounce window elapsed");
                    self.start_persist()
                }
                TimerKind::Dwell => {
                    self.on_dwell(token);
                    continue;
                }
                TimerKind::Poll => self.on_poll(),
            };
            if let Progress::Pending(task) = progress {
                tasks.push(task);
            }
        }
        tasks
    }

    /// Fire due timers and wait for the requests they started, one by one
    pub async fn run_due_timers(&mut self) {
        for task in self.fire_due_timers() {
            let outcome = task.await;
            self.complete(outcome);
        }
    }

    fn on_dwell(&mut self, token: TimerToken) {
        match self.dwell {
            Some((armed, expected)) if armed == token => {
                self.dwell = None;
                self.status.decay(expected);
            }
            _ => debug!("Ignoring superseded dwell timer"),
        }
    }

    /// Refresh (remote mode) or autosave (local mode), unless a remote
    /// request is still out
    fn on_poll(&mut self) -> Progress {
        let progress = if self.in_flight > 0 {
            debug!("Skipping poll, {} request(s) in flight", self.in_flight);
            Progress::Done(true)
        } else if self.remote_enabled() {
            self.start_refresh()
        } else {
            self.start_persist()
        };

        if self.polling {
            self.schedule_poll();
        }
        progress
    }

    // ==================== Status ====================

    fn begin_saving(&mut self, message: &str) {
        self.disarm_dwell();
        self.status.begin_saving(message);
    }

    fn begin_syncing(&mut self, message: &str) {
        self.disarm_dwell();
        self.status.begin_syncing(message);
    }

    fn succeed(&mut self, message: &str) {
        self.status.succeed(message);
        self.arm_dwell(SyncStatus::Saved);
    }

    fn fail(&mut self, kind: ErrorKind, message: String) {
        self.status.fail(kind, message);
        self.arm_dwell(SyncStatus::Error);
    }

    fn settle(&mut self) {
        self.disarm_dwell();
        self.status.settle();
    }

    fn arm_dwell(&mut self, status: SyncStatus) {
        let delay = match status {
            SyncStatus::Error => self.timing.error_dwell(),
            _ => self.timing.saved_dwell(),
        };
        let token = self
            .scheduler
            .schedule_in(TimerKind::Dwell, Instant::now(), delay);
        self.dwell = Some((token, status));
    }

    fn disarm_dwell(&mut self) {
        if let Some((token, _)) = self.dwell.take() {
            self.scheduler.cancel(token);
        }
    }
}

/// Resolve the document id (cached, or discovered by listing) and fetch it
///
/// Returns the id found by discovery, if any, alongside the fetch result.
/// Discovery never creates a document.
async fn fetch_remote<R: RemoteStore>(
    remote: &R,
    token: &str,
    cached: Option<String>,
) -> (Option<String>, RemoteResult<Option<Dataset>>) {
    let (document_id, discovered) = match cached {
        Some(id) => (id, None),
        None => match remote.find_existing_document(token).await {
            Ok(Some(id)) => (id.clone(), Some(id)),
            Ok(None) => return (None, Ok(None)),
            Err(e) => return (None, Err(e)),
        },
    };

    let result = remote.fetch_document(token, &document_id).await;
    (discovered, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_date_key, DateKey};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    fn day(s: &str) -> DateKey {
        parse_date_key(s).unwrap()
    }

    #[derive(Default)]
    struct RemoteState {
        documents: BTreeMap<String, Dataset>,
        listed: Vec<String>,
        pushes: usize,
        fetches: usize,
        lists: usize,
        fail_with_auth: bool,
    }

    /// In-memory remote document store
    #[derive(Clone, Default)]
    struct FakeRemote {
        state: Arc<Mutex<RemoteState>>,
    }

    impl FakeRemote {
        fn with_document(id: &str, dataset: Dataset) -> Self {
            let remote = Self::default();
            {
                let mut state = remote.state.lock().unwrap();
                state.documents.insert(id.to_string(), dataset);
                state.listed.push(id.to_string());
            }
            remote
        }

        fn state(&self) -> std::sync::MutexGuard<'_, RemoteState> {
            self.state.lock().unwrap()
        }
    }

    impl RemoteStore for FakeRemote {
        async fn find_existing_document(&self, _token: &str) -> RemoteResult<Option<String>> {
            let mut state = self.state();
            state.lists += 1;
            if state.fail_with_auth {
                return Err(RemoteError::Auth { status: 401 });
            }
            Ok(state.listed.first().cloned())
        }

        async fn fetch_document(
            &self,
            _token: &str,
            document_id: &str,
        ) -> RemoteResult<Option<Dataset>> {
            let mut state = self.state();
            state.fetches += 1;
            if state.fail_with_auth {
                return Err(RemoteError::Auth { status: 401 });
            }
            Ok(state.documents.get(document_id).cloned())
        }

        async fn push_document(
            &self,
            _token: &str,
            document_id: Option<&str>,
            dataset: &Dataset,
        ) -> RemoteResult<String> {
            let mut state = self.state();
            state.pushes += 1;
            if state.fail_with_auth {
                return Err(RemoteError::Auth { status: 401 });
            }
            let id = match document_id {
                Some(id) if state.documents.contains_key(id) => id.to_string(),
                Some(id) => return Err(RemoteError::DocumentNotFound { id: id.to_string() }),
                None => format!("doc-{}", state.documents.len() + 1),
            };
            state.documents.insert(id.clone(), dataset.clone());
            Ok(id)
        }
    }

    fn local_coordinator(temp_dir: &TempDir) -> Coordinator<FileStore, FakeRemote> {
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        Coordinator::new(local, FakeRemote::default(), Timing::default(), true)
    }

    fn remote_coordinator(
        temp_dir: &TempDir,
        remote: FakeRemote,
    ) -> Coordinator<FileStore, FakeRemote> {
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        local
            .save_credentials(&SyncCredentials::new("token", None))
            .unwrap();
        Coordinator::new(local, remote, Timing::default(), true)
    }

    fn sample() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.add_task(day("2024-05-01"), "remote task");
        dataset.set_memo(day("2024-05-01"), "from elsewhere");
        dataset
    }

    #[tokio::test]
    async fn test_local_mode_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = local_coordinator(&temp_dir);

        assert!(!coordinator.remote_enabled());
        let dataset = coordinator.load_initial().await;
        assert!(dataset.is_empty());
        assert_eq!(dataset.task_id_counter, 1);
        assert_eq!(coordinator.status().status, SyncStatus::Local);
    }

    #[tokio::test]
    async fn test_persist_writes_local_then_remote() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::default();
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());
        coordinator.load_initial().await;

        coordinator.dataset_mut().add_task(day("2024-05-01"), "a");
        assert!(coordinator.persist_now().await);

        assert_eq!(coordinator.status().status, SyncStatus::Saved);
        assert_eq!(remote.state().pushes, 1);
        // New document id is cached and stored with the credentials
        assert_eq!(coordinator.credentials().document_id.as_deref(), Some("doc-1"));
        let stored = FileStore::new(&Config::with_data_dir(temp_dir.path()))
            .load_credentials()
            .unwrap()
            .unwrap();
        assert_eq!(stored.document_id.as_deref(), Some("doc-1"));
        assert!(coordinator.dataset().last_sync.is_some());
    }

    #[tokio::test]
    async fn test_remote_failure_does_not_block_local_write() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::default();
        remote.state().fail_with_auth = true;
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());

        coordinator.dataset_mut().add_task(day("2024-05-01"), "a");
        assert!(!coordinator.persist_now().await);

        let snapshot = coordinator.status().clone();
        assert_eq!(snapshot.status, SyncStatus::Error);
        assert_eq!(snapshot.error, Some(ErrorKind::AuthFailure));

        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        assert_eq!(local.load().unwrap().unwrap().task_count(), 1);
    }

    #[tokio::test]
    async fn test_load_prefers_remote_and_caches_id() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::with_document("gist-7", sample());
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());

        let dataset = coordinator.load_initial().await.clone();
        assert_eq!(dataset, sample());
        assert_eq!(coordinator.credentials().document_id.as_deref(), Some("gist-7"));

        // Cached id skips discovery on later fetches
        coordinator.refresh_from_remote().await;
        assert_eq!(remote.state().lists, 1);
        assert_eq!(remote.state().fetches, 2);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let temp_dir = TempDir::new().unwrap();
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        local.save(&sample()).unwrap();

        let remote = FakeRemote::default();
        remote.state().fail_with_auth = true;
        let mut coordinator = remote_coordinator(&temp_dir, remote);

        assert_eq!(coordinator.load_initial().await, &sample());
        assert_eq!(coordinator.status().status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_remote_document_does_not_create_one() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::default();
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());

        coordinator.load_initial().await;
        coordinator.refresh_from_remote().await;

        assert_eq!(remote.state().pushes, 0);
        assert!(remote.state().documents.is_empty());
        assert_eq!(coordinator.status().status, SyncStatus::Syncing);
    }

    #[tokio::test]
    async fn test_deleted_remote_document_is_recreated() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::default();
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        local
            .save_credentials(&SyncCredentials::new("token", Some("gone".to_string())))
            .unwrap();
        let mut coordinator = Coordinator::new(local, remote.clone(), Timing::default(), true);

        assert!(!coordinator.persist_now().await);
        assert_eq!(coordinator.status().error, Some(ErrorKind::DocumentNotFound));
        assert!(coordinator.credentials().document_id.is_none());

        assert!(coordinator.persist_now().await);
        assert_eq!(coordinator.credentials().document_id.as_deref(), Some("doc-1"));
    }

    #[tokio::test]
    async fn test_adopt_never_lowers_counter() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::with_document("gist", sample());
        let mut coordinator = remote_coordinator(&temp_dir, remote);

        for text in ["a", "b", "c", "d", "e"] {
            coordinator.dataset_mut().add_task(day("2024-06-01"), text);
        }
        assert_eq!(coordinator.dataset().task_id_counter, 6);

        coordinator.refresh_from_remote().await;
        assert_eq!(coordinator.dataset().tasks, sample().tasks);
        assert_eq!(coordinator.dataset().task_id_counter, 6);
    }

    #[tokio::test]
    async fn test_session_token_is_not_stored() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = local_coordinator(&temp_dir);

        coordinator.set_session_token(Some("env-token".to_string()));
        assert!(coordinator.remote_enabled());
        assert_eq!(coordinator.status().status, SyncStatus::Syncing);

        coordinator.set_sync_enabled(false);
        assert!(!coordinator.remote_enabled());
        assert_eq!(coordinator.status().status, SyncStatus::Local);

        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        assert!(local.load_credentials().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_credentials_pushes_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::default();
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        let mut coordinator = Coordinator::new(local, remote.clone(), Timing::default(), true);
        coordinator.dataset_mut().add_task(day("2024-05-01"), "a");

        coordinator
            .set_credentials(SyncCredentials::new("token", None))
            .await
            .unwrap();
        assert_eq!(remote.state().pushes, 1);

        coordinator.clear_credentials().unwrap();
        assert!(!coordinator.remote_enabled());
        assert_eq!(coordinator.status().status, SyncStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_decays_to_quiescent() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = local_coordinator(&temp_dir);

        coordinator.persist_now().await;
        assert_eq!(coordinator.status().status, SyncStatus::Saved);

        tokio::time::advance(Duration::from_millis(2_999)).await;
        coordinator.run_due_timers().await;
        assert_eq!(coordinator.status().status, SyncStatus::Saved);

        tokio::time::advance(Duration::from_millis(1)).await;
        coordinator.run_due_timers().await;
        assert_eq!(coordinator.status().status, SyncStatus::Local);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_dwell_is_longer() {
        let temp_dir = TempDir::new().unwrap();
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path())).with_capacity(8);
        let mut coordinator = Coordinator::new(local, FakeRemote::default(), Timing::default(), true);
        coordinator.dataset_mut().add_task(day("2024-05-01"), "too big");

        assert!(!coordinator.persist_now().await);
        tokio::time::advance(Duration::from_secs(3)).await;
        coordinator.run_due_timers().await;
        assert_eq!(coordinator.status().status, SyncStatus::Error);

        tokio::time::advance(Duration::from_secs(2)).await;
        coordinator.run_due_timers().await;
        assert_eq!(coordinator.status().status, SyncStatus::Local);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_dwell_does_not_revert_newer_status() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::with_document("gist", sample());
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());

        // Success arms a 3s dwell
        assert!(coordinator.persist_now().await);
        assert_eq!(coordinator.status().status, SyncStatus::Saved);

        // A refresh starting before it fires supersedes it, then fails with a 5s dwell
        tokio::time::advance(Duration::from_secs(2)).await;
        remote.state().fail_with_auth = true;
        coordinator.refresh_from_remote().await;
        assert_eq!(coordinator.status().status, SyncStatus::Error);

        // The first dwell's deadline passes without touching the newer error
        tokio::time::advance(Duration::from_secs(2)).await;
        coordinator.run_due_timers().await;
        assert_eq!(coordinator.status().status, SyncStatus::Error);

        tokio::time::advance(Duration::from_secs(3)).await;
        coordinator.run_due_timers().await;
        assert_eq!(coordinator.status().status, SyncStatus::Syncing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_poll_autosaves() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = local_coordinator(&temp_dir);
        coordinator.dataset_mut().add_task(day("2024-05-01"), "a");
        coordinator.start_polling();

        tokio::time::advance(Duration::from_secs(30)).await;
        coordinator.run_due_timers().await;

        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        assert_eq!(local.load().unwrap().unwrap().task_count(), 1);
        // Poll re-arms itself
        assert!(coordinator.next_deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skips_while_request_in_flight() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::with_document("gist", sample());
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());
        coordinator.start_polling();

        let Progress::Pending(push) = coordinator.start_persist() else {
            panic!("remote mode should push");
        };
        assert_eq!(coordinator.in_flight(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        coordinator.run_due_timers().await;
        assert_eq!(remote.state().fetches, 0);
        assert_eq!(remote.state().lists, 0);

        let outcome = push.await;
        assert!(coordinator.complete(outcome));
        assert_eq!(coordinator.in_flight(), 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        coordinator.run_due_timers().await;
        assert_eq!(remote.state().fetches, 1);
    }

    #[tokio::test]
    async fn test_edits_during_push_keep_and_stamp_applies() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::default();
        let mut coordinator = remote_coordinator(&temp_dir, remote.clone());
        coordinator.dataset_mut().add_task(day("2024-05-01"), "pushed");

        let Progress::Pending(push) = coordinator.start_persist() else {
            panic!("remote mode should push");
        };
        coordinator.dataset_mut().add_task(day("2024-05-01"), "after");
        assert!(coordinator.complete(push.await));

        assert_eq!(coordinator.dataset().task_count(), 2);
        assert!(coordinator.dataset().last_sync.is_some());
        assert_eq!(remote.state().documents["doc-1"].task_count(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_reports_network_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = remote_coordinator(&temp_dir, FakeRemote::default());

        let Progress::Pending(_dropped) = coordinator.start_refresh() else {
            panic!("remote mode should fetch");
        };
        coordinator.abandon("task cancelled");

        assert_eq!(coordinator.in_flight(), 0);
        assert_eq!(coordinator.status().error, Some(ErrorKind::NetworkFailure));
    }

    #[tokio::test]
    async fn test_corrupt_local_slot_starts_empty_with_error() {
        let temp_dir = TempDir::new().unwrap();
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        std::fs::write(local.dataset_path(), "{ not json").unwrap();
        let mut coordinator = local_coordinator(&temp_dir);

        assert!(coordinator.load_initial().await.is_empty());
        let status = coordinator.status();
        assert_eq!(status.status, SyncStatus::Error);
        assert_eq!(status.error, Some(ErrorKind::StorageCorrupt));
    }

    #[tokio::test]
    async fn test_remote_and_local_failure_keeps_first_kind() {
        let temp_dir = TempDir::new().unwrap();
        let remote = FakeRemote::with_document("gist", sample());
        remote.state().fail_with_auth = true;
        let mut coordinator = remote_coordinator(&temp_dir, remote);
        let local = FileStore::new(&Config::with_data_dir(temp_dir.path()));
        std::fs::write(local.dataset_path(), "{ not json").unwrap();

        assert!(coordinator.load_initial().await.is_empty());
        let status = coordinator.status();
        assert_eq!(status.status, SyncStatus::Error);
        assert_eq!(status.error, Some(ErrorKind::AuthFailure));
        assert!(status.message.contains("Remote load failed"));
        assert!(status.message.contains("local data unreadable"));
        assert!(coordinator.remote_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_persists_pending_save() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = local_coordinator(&temp_dir);

        assert!(coordinator.flush().await);
        assert!(!FileStore::new(&Config::with_data_dir(temp_dir.path())).exists());

        coordinator.dataset_mut().add_task(day("2024-05-01"), "a");
        coordinator.request_save();
        assert!(coordinator.has_pending_save());
        assert!(coordinator.flush().await);
        assert!(!coordinator.has_pending_save());
        assert!(FileStore::new(&Config::with_data_dir(temp_dir.path())).exists());
    }
}
