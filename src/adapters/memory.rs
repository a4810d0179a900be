//! In-memory stores, mostly for testing and single-process runs.

use crate::domain::{ChainNode, ContentAddress};
use crate::error::{FlowError, FlowResult};
use crate::ports::documents::{Document, DocumentStore, Predicate, ID_FIELD};
use crate::ports::objects::ObjectStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Document store keyed by `_id`.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(&self, predicate: Predicate<'_>) -> FlowResult<Vec<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .values()
            .filter(|document| predicate(document))
            .cloned()
            .collect())
    }

    async fn put(&self, document: Document) -> FlowResult<()> {
        let id = document_id(&document)?;
        self.documents.write().await.insert(id, document);
        Ok(())
    }
}

pub(crate) fn document_id(document: &Document) -> FlowResult<String> {
    document
        .get(ID_FIELD)
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| FlowError::ConsistencyViolation("document has no _id".to_string()))
}

/// Object store holding encoded nodes by address.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<ContentAddress, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn contains(&self, address: &ContentAddress) -> bool {
        self.objects.read().await.contains_key(address)
    }

    /// Store raw bytes under an arbitrary address, bypassing hashing.
    pub async fn insert_raw(&self, address: ContentAddress, bytes: Vec<u8>) {
        self.objects.write().await.insert(address, bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, node: &ChainNode) -> FlowResult<ContentAddress> {
        let encoded = node.encode()?;
        let address = ContentAddress::of(&encoded);
        self.objects.write().await.entry(address).or_insert(encoded);
        Ok(address)
    }

    async fn get(&self, address: &ContentAddress) -> FlowResult<Option<ChainNode>> {
        let objects = self.objects.read().await;
        match objects.get(address) {
            Some(encoded) => Ok(Some(verified_decode(address, encoded)?)),
            None => Ok(None),
        }
    }
}

/// Decode `encoded`, refusing bytes that do not hash to `address`.
pub(crate) fn verified_decode(address: &ContentAddress, encoded: &[u8]) -> FlowResult<ChainNode> {
    let actual = ContentAddress::of(encoded);
    if actual != *address {
        return Err(FlowError::ChainIntegrity(format!(
            "Object {} hashes to {}",
            address, actual
        )));
    }
    ChainNode::decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::compress;
    use serde_json::json;

    #[tokio::test]
    async fn test_document_upsert_by_id() {
        let store = MemoryDocumentStore::new();
        let mut document = json!({"_id": "a", "status": "queued"})
            .as_object()
            .cloned()
            .unwrap();
        store.put(document.clone()).await.unwrap();
        document.insert("status".to_string(), json!("running"));
        store.put(document).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.query(&|_: &Document| true).await.unwrap();
        assert_eq!(found[0]["status"], "running");
    }

    #[tokio::test]
    async fn test_document_without_id_is_rejected() {
        let store = MemoryDocumentStore::new();
        let document = json!({"status": "queued"}).as_object().cloned().unwrap();
        assert!(store.put(document).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_object_round_trip() {
        let store = MemoryObjectStore::new();
        let raw = vec![7u8; 2048];
        let node = ChainNode::new(compress(&raw).unwrap(), None);

        let address = store.put(&node).await.unwrap();
        assert_eq!(address, node.address().unwrap());
        assert_eq!(store.put(&node).await.unwrap(), address);
        assert_eq!(store.len().await, 1);

        let fetched = store.get(&address).await.unwrap().unwrap();
        assert_eq!(fetched.payload().unwrap(), raw);
    }

    #[tokio::test]
    async fn test_object_missing_and_tampered() {
        let store = MemoryObjectStore::new();
        let address = ContentAddress::of(b"nothing here");
        assert!(store.get(&address).await.unwrap().is_none());

        let node = ChainNode::new(compress(b"real").unwrap(), None);
        store.insert_raw(address, node.encode().unwrap()).await;
        assert!(store.get(&address).await.unwrap_err().is_integrity());
    }
}
