//! Remote document API message types
//!
//! JSON bodies exchanged with the document-hosting service. One remote
//! document per user holds a single file whose content is the dataset JSON.
//!
//! Exactly one document per credential is assumed: discovery picks the first
//! listed document carrying the fixed file name or description below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Dataset;

/// Name of the file inside the remote document that holds the dataset
pub const DATA_FILE_NAME: &str = "meridian-todo-data.json";

/// Description written on the remote document, also used for discovery
pub const DOCUMENT_DESCRIPTION: &str = "Meridian Todo App Data";

/// Entry returned when listing the user's documents
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// File name to file metadata; contents are not included in listings
    #[serde(default)]
    pub files: BTreeMap<String, serde_json::Value>,
}

impl DocumentSummary {
    /// True if this document carries the app's marker file or description
    pub fn is_meridian_document(&self) -> bool {
        self.files.contains_key(DATA_FILE_NAME)
            || self.description.as_deref() == Some(DOCUMENT_DESCRIPTION)
    }
}

/// Pick the app's document from a listing
pub fn select_document(documents: &[DocumentSummary]) -> Option<&DocumentSummary> {
    documents.iter().find(|d| d.is_meridian_document())
}

/// A full document including file contents
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, RemoteFile>,
}

impl RemoteDocument {
    /// Content of the dataset file, if present
    pub fn data_content(&self) -> Option<&str> {
        self.files
            .get(DATA_FILE_NAME)
            .and_then(|f| f.content.as_deref())
    }
}

/// One file inside a document
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    #[serde(default)]
    pub content: Option<String>,
}

/// Body of a create (`POST`) or update (`PATCH`) request
#[derive(Debug, Clone, Serialize)]
pub struct WriteDocumentRequest {
    pub description: String,
    pub public: bool,
    pub files: BTreeMap<String, FileContent>,
}

/// File content in a write request
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub content: String,
}

impl WriteDocumentRequest {
    /// Build the write body carrying the dataset as the marker file
    pub fn for_dataset(dataset: &Dataset) -> Result<Self, serde_json::Error> {
        let mut files = BTreeMap::new();
        files.insert(
            DATA_FILE_NAME.to_string(),
            FileContent {
                content: dataset.to_json_pretty()?,
            },
        );

        Ok(Self {
            description: DOCUMENT_DESCRIPTION.to_string(),
            public: false,
            files,
        })
    }
}

/// Response to a create or update request
#[derive(Debug, Clone, Deserialize)]
pub struct WrittenDocument {
    pub id: String,
}
