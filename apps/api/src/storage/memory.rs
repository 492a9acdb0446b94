//! In-memory stand-ins for the document and blob stores, used by tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::models::extract::PARTITION_KEY_FIELD;
use crate::storage::blobs::{BlobError, BlobStore};
use crate::storage::documents::{document_keys, DocumentQuery, DocumentStore, StoreError};

/// Documents keyed by id, kept in insertion order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Vec<(String, String, Value)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, document: &Value) -> Result<Value, StoreError> {
        let (id, partition_key) = document_keys(document, PARTITION_KEY_FIELD)?;
        let mut documents = self.documents.lock().unwrap();
        let entry = (id.to_string(), partition_key.to_string(), document.clone());
        match documents.iter_mut().find(|(existing, _, _)| existing == id) {
            Some(slot) => *slot = entry,
            None => documents.push(entry),
        }
        Ok(document.clone())
    }

    async fn read(&self, id: &str, partition_key: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.lock().unwrap();
        Ok(documents
            .iter()
            .find(|(i, p, _)| i == id && p == partition_key)
            .map(|(_, _, doc)| doc.clone()))
    }

    async fn replace(
        &self,
        id: &str,
        partition_key: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let slot = documents
            .iter_mut()
            .find(|(i, p, _)| i == id && p == partition_key)
            .ok_or_else(|| StoreError::NotFound {
                id: id.to_string(),
                partition_key: partition_key.to_string(),
            })?;
        slot.2 = document.clone();
        Ok(document.clone())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError> {
        query.check_scope()?;
        let documents = self.documents.lock().unwrap();
        Ok(documents
            .iter()
            .filter(|(_, p, _)| query.partition_key.as_deref().map_or(true, |pk| pk == p))
            .filter(|(_, _, doc)| matches_filter(query, doc))
            .map(|(_, _, doc)| doc.clone())
            .collect())
    }
}

/// Whether `document` carries every field of the query filter.
fn matches_filter(query: &DocumentQuery, document: &Value) -> bool {
    query
        .filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, name: &str, content: impl Into<Bytes>) -> Self {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), content.into());
        self
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download(&self, name: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(name.to_string()))
    }

    async fn upload(&self, name: &str, content: Bytes) -> Result<(), BlobError> {
        self.blobs.lock().unwrap().insert(name.to_string(), content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_top_level_fields() {
        let doc = json!({"id": "1", "rfp_id": "r", "doc_type": "rfp_staffing_extract", "status": "rfp_extracted"});
        let hit = DocumentQuery::new()
            .eq("doc_type", "rfp_staffing_extract")
            .eq("status", "rfp_extracted");
        let miss = DocumentQuery::new().eq("status", "resume_created");
        assert!(matches_filter(&hit, &doc));
        assert!(!matches_filter(&miss, &doc));
    }

    #[tokio::test]
    async fn test_query_respects_partition_and_filter() {
        let store = MemoryDocumentStore::new();
        store
            .upsert(&json!({"id": "a", "rfp_id": "run-1", "status": "rfp_extracted"}))
            .await
            .unwrap();
        store
            .upsert(&json!({"id": "b", "rfp_id": "run-2", "status": "rfp_extracted"}))
            .await
            .unwrap();

        let in_run = DocumentQuery::new()
            .eq("status", "rfp_extracted")
            .in_partition("run-2");
        let hits = store.query(&in_run).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], "b");

        let everywhere = DocumentQuery::new()
            .eq("status", "rfp_extracted")
            .enable_cross_partition();
        assert_eq!(store.query(&everywhere).await.unwrap().len(), 2);
    }
}
