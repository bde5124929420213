//! Remote document sync
//!
//! Mirrors the dataset to a remote document-hosting service so the same data
//! is visible across devices, and tracks sync state for display.
//!
//! ## Protocol
//!
//! The whole dataset travels as one JSON file inside one remote document:
//! 1. If no document id is cached, list documents and pick the one carrying
//!    the app's marker file or description
//! 2. Fetch the document and parse the data file
//! 3. Create (first push) or overwrite (later pushes) the document
//!
//! ## Usage
//!
//! ```ignore
//! let client = RemoteClient::new("https://api.github.com/gists", timeout)?;
//! let id = client.find_existing_document(&token).await?;
//! ```

mod client;
mod message;
mod status;

pub use client::{RemoteClient, RemoteError, RemoteResult, RemoteStore};
pub use message::{
    select_document, DocumentSummary, RemoteDocument, WriteDocumentRequest, DATA_FILE_NAME,
    DOCUMENT_DESCRIPTION,
};
pub use status::{StatusMachine, StatusSnapshot, SyncStatus};
