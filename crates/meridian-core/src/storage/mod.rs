//! Storage layer
//!
//! Local durable persistence for the dataset and the sync credentials.
//!
//! ## Slots
//!
//! - **Dataset**: single source of truth when remote sync is off, and an
//!   unconditional backup when it is on
//! - **Fallback**: severely size-capped copy written only when the dataset
//!   slot rejects a write
//! - **Credentials**: `{ token, documentId }`, stored independently

pub mod error;
pub mod local;

pub use error::{StorageError, StorageResult};
pub use local::{FileStore, LocalStore, FALLBACK_CAPACITY};
