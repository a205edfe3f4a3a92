//! Collection-isolated document storage for the content collections.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::profile_store::StoreError;

/// A stored document. `fields` is the client-visible body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub collection: String,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Shallow-merge `fields` into the stored body. `NotFound` when absent.
    async fn merge(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Returns the removed document, if any.
    async fn remove(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Oldest first.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;
}

/// In-memory document store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<HashMap<(String, Uuid), Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        let now = Utc::now();
        let doc = Document {
            id: Uuid::now_v7(),
            collection: collection.to_string(),
            fields,
            created_at: now,
            updated_at: now,
        };
        let mut guard = self.inner.write().map_err(poisoned)?;
        guard.insert((collection.to_string(), doc.id), doc.clone());
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let guard = self.inner.read().map_err(poisoned)?;
        Ok(guard.get(&(collection.to_string(), id)).cloned())
    }

    async fn merge(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let mut guard = self.inner.write().map_err(poisoned)?;
        let doc = guard
            .get_mut(&(collection.to_string(), id))
            .ok_or(StoreError::NotFound)?;
        doc.fields.extend(fields);
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn remove(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let mut guard = self.inner.write().map_err(poisoned)?;
        Ok(guard.remove(&(collection.to_string(), id)))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let guard = self.inner.read().map_err(poisoned)?;
        let mut docs: Vec<Document> = guard
            .values()
            .filter(|d| d.collection == collection)
            .cloned()
            .collect();
        // v7 ids sort by creation time.
        docs.sort_by_key(|d| d.id);
        Ok(docs)
    }
}
