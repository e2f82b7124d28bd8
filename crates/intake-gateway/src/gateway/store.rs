use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::domain::DocumentId;

/// Field map of a stored document.
pub type DocumentFields = Map<String, Value>;

/// Server-assigned creation timestamp field.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A document as persisted, including the store-assigned identity and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub fields: DocumentFields,
}

/// Storage failures. All of them end the request with a server error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("malformed document store response: {0}")]
    Malformed(String),
}

/// Append-only document store.
///
/// Implementations stamp [`CREATED_AT_FIELD`] from their own clock, replacing
/// any value the caller supplied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn append(
        &self,
        collection: &str,
        fields: DocumentFields,
    ) -> Result<StoredDocument, StoreError>;

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;

    fn backend(&self) -> &'static str;
}

/// Process-local store used in development and tests.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<StoredDocument>>>,
    sequence: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn append(
        &self,
        collection: &str,
        mut fields: DocumentFields,
    ) -> Result<StoredDocument, StoreError> {
        let created_at = Utc::now();
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let document = StoredDocument {
            id: DocumentId(format!("doc-{sequence:06}")),
            created_at,
            fields,
        };

        let mut guard = self
            .collections
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store mutex poisoned".to_string()))?;
        guard
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let guard = self
            .collections
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store mutex poisoned".to_string()))?;
        Ok(guard.get(collection).cloned().unwrap_or_default())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
