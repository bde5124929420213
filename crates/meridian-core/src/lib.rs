//! Meridian Core Library
//!
//! Persistence and sync engine for Meridian, a per-date task list with daily
//! memos. The dataset lives in memory, is saved to a local durable slot, and
//! is optionally mirrored to one remote document per user.
//!
//! # Architecture
//!
//! - **Local store**: atomic JSON files under the data directory, the single
//!   source of truth when remote sync is off
//! - **Remote store**: gist-like document API, whole dataset per write
//! - **Coordinator**: owns the dataset; loads, debounces saves, refreshes
//! - **Scheduler**: debounce, status dwell and poll timers
//! - **Engine**: background task driving the coordinator
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let engine = spawn_engine(Coordinator::open(&config)?);
//!
//! let today = chrono::Local::now().date_naive();
//! engine.mutate(move |ds| ds.add_task(today, "Buy milk")).await?;
//!
//! engine.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - `models`: Tasks, dataset and credentials
//! - `storage`: Local durable slots
//! - `sync`: Remote client and status machine
//! - `coordinator`: Load/save/refresh orchestration
//! - `scheduler`: Timer bookkeeping
//! - `engine`: Background task and its handle
//! - `config`: Application configuration

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod sync;

pub use config::{Config, Timing};
pub use coordinator::{Coordinator, Progress, RemoteOutcome, RemoteTask};
pub use engine::{spawn_engine, EngineCommand, EngineHandle, EngineStopped};
pub use error::ErrorKind;
pub use models::{parse_date_key, Dataset, DateKey, SyncCredentials, Task, DATASET_VERSION};
pub use scheduler::{Scheduler, TimerKind, TimerToken};
pub use storage::{FileStore, LocalStore, StorageError};
pub use sync::{RemoteClient, RemoteError, RemoteStore, StatusSnapshot, SyncStatus};
