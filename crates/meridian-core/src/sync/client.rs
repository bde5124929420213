//! Remote document store client
//!
//! HTTP client for a document-hosting service with gist-like semantics:
//!
//! - `GET    {base}`      list the user's documents
//! - `GET    {base}/{id}` fetch one document with file contents
//! - `POST   {base}`      create a document
//! - `PATCH  {base}/{id}` overwrite a document
//!
//! Every call is a single round-trip with a bearer token and no retry.
//! Failures come back as [`RemoteError`]; nothing panics or escapes.

use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use super::message::{
    select_document, DocumentSummary, RemoteDocument, WriteDocumentRequest, WrittenDocument,
};
use crate::error::ErrorKind;
use crate::models::Dataset;

const ACCEPT_JSON: &str = "application/vnd.github+json";

/// Errors from the remote store
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport failure: connection refused, timeout, TLS, ...
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Credential rejected
    #[error("Authorization failed (HTTP {status}). Check the access token.")]
    Auth { status: u16 },

    /// Addressed document does not exist
    #[error("Remote document '{id}' not found")]
    DocumentNotFound { id: String },

    /// Any other non-success response
    #[error("Remote store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response envelope could not be decoded
    #[error("Unexpected response from remote store: {0}")]
    Decode(#[source] serde_json::Error),

    /// The stored dataset inside the document is not valid JSON
    #[error("Remote dataset is corrupted: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

impl RemoteError {
    /// Map onto the engine-wide error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Auth { .. } => ErrorKind::AuthFailure,
            RemoteError::DocumentNotFound { .. } => ErrorKind::DocumentNotFound,
            RemoteError::InvalidPayload(_) => ErrorKind::StorageCorrupt,
            RemoteError::Network(_) | RemoteError::Status { .. } | RemoteError::Decode(_) => {
                ErrorKind::NetworkFailure
            }
        }
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote copy of the dataset, one document per user
pub trait RemoteStore {
    /// Find the app's document among the user's documents
    fn find_existing_document(
        &self,
        token: &str,
    ) -> impl Future<Output = RemoteResult<Option<String>>> + Send;

    /// Fetch and parse the dataset, `None` if the document or its data file
    /// is missing
    fn fetch_document(
        &self,
        token: &str,
        document_id: &str,
    ) -> impl Future<Output = RemoteResult<Option<Dataset>>> + Send;

    /// Create (no id) or overwrite (known id) the document, returning the id
    /// in effect afterwards
    fn push_document(
        &self,
        token: &str,
        document_id: Option<&str>,
        dataset: &Dataset,
    ) -> impl Future<Output = RemoteResult<String>> + Send;
}

/// [`RemoteStore`] over HTTP
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    /// Create a client for the given collection URL
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("meridian/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn document_url(&self, document_id: &str) -> String {
        format!("{}/{}", self.base_url, document_id)
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.bearer_auth(token).header(ACCEPT, ACCEPT_JSON)
    }
}

impl RemoteStore for RemoteClient {
    async fn find_existing_document(&self, token: &str) -> RemoteResult<Option<String>> {
        debug!("Listing remote documents at {}", self.base_url);
        let response = self
            .authorized(self.http.get(&self.base_url), token)
            .send()
            .await?;
        let response = check_status(response, None).await?;

        let documents: Vec<DocumentSummary> = decode(response).await?;
        let found = select_document(&documents).map(|d| d.id.clone());
        match &found {
            Some(id) => info!("Found remote document {}", id),
            None => debug!("No remote document among {} listed", documents.len()),
        }
        Ok(found)
    }

    async fn fetch_document(&self, token: &str, document_id: &str) -> RemoteResult<Option<Dataset>> {
        debug!("Fetching remote document {}", document_id);
        let response = self
            .authorized(self.http.get(self.document_url(document_id)), token)
            .send()
            .await?;

        let response = match check_status(response, Some(document_id)).await {
            Ok(response) => response,
            Err(RemoteError::DocumentNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let document: RemoteDocument = decode(response).await?;
        let Some(content) = document.data_content() else {
            debug!("Remote document {} has no data file", document_id);
            return Ok(None);
        };

        Dataset::from_json(content)
            .map(Some)
            .map_err(RemoteError::InvalidPayload)
    }

    async fn push_document(
        &self,
        token: &str,
        document_id: Option<&str>,
        dataset: &Dataset,
    ) -> RemoteResult<String> {
        let body = WriteDocumentRequest::for_dataset(dataset).map_err(RemoteError::Decode)?;

        let request = match document_id {
            Some(id) => {
                debug!("Updating remote document {}", id);
                self.http.patch(self.document_url(id))
            }
            None => {
                debug!("Creating remote document");
                self.http.post(&self.base_url)
            }
        };

        let response = self.authorized(request, token).json(&body).send().await?;
        let response = check_status(response, document_id).await?;
        let written: WrittenDocument = decode(response).await?;

        if document_id.is_none() {
            info!("Created remote document {}", written.id);
        }
        Ok(written.id)
    }
}

/// Turn a non-success response into the matching error
async fn check_status(response: Response, document_id: Option<&str>) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, document_id, body))
}

fn classify_status(status: StatusCode, document_id: Option<&str>, body: String) -> RemoteError {
    match (status, document_id) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => RemoteError::Auth {
            status: status.as_u16(),
        },
        (StatusCode::NOT_FOUND, Some(id)) => RemoteError::DocumentNotFound { id: id.to_string() },
        _ => RemoteError::Status {
            status: status.as_u16(),
            body: truncate_body(body),
        },
    }
}

fn truncate_body(mut body: String) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut cut = MAX;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(RemoteError::Decode)
}
