//! Lazy get-or-create over the document store.

use crate::error::{FlowError, FlowResult};
use crate::ports::documents::{matches_exactly, Document, DocumentStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Schema tag stamped on every cached entry.
pub const SCHEMA_VERSION: &str = "v4";

const KIND_FIELD: &str = "kind";
const VERSION_FIELD: &str = "dbVersion";
const CREATED_AT_FIELD: &str = "createdAt";

/// Resolves entities by exact-match predicate, creating them on first use.
///
/// More than one match is a broken dedup invariant and always fails with
/// [`FlowError::ConsistencyViolation`]. Creation is not atomic: two racing
/// callers may both run their loader and both insert, which the next
/// `resolve` then reports.
pub struct IdentityCache<D> {
    store: Arc<D>,
}

impl<D> Clone for IdentityCache<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<D: DocumentStore> IdentityCache<D> {
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    /// The single entry of `kind` matching `predicate`, if any.
    pub async fn find(&self, kind: &str, predicate: Document) -> FlowResult<Option<Document>> {
        let expected = tagged(kind, predicate);
        let mut found = self
            .store
            .query(&|document: &Document| matches_exactly(document, &expected))
            .await?;

        if found.len() > 1 {
            return Err(FlowError::ConsistencyViolation(format!(
                "{} {} entries match {}",
                found.len(),
                kind,
                Value::Object(expected)
            )));
        }
        Ok(found.pop())
    }

    pub async fn resolve<F, Fut>(
        &self,
        kind: &str,
        predicate: Document,
        loader: F,
    ) -> FlowResult<Document>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FlowResult<Document>> + Send,
    {
        if let Some(existing) = self.find(kind, predicate.clone()).await? {
            debug!("Cache hit for {} {}", kind, serde_json::Value::Object(predicate));
            return Ok(existing);
        }

        let loaded = loader().await?;

        let mut entity = Document::new();
        entity.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        entity.extend(loaded);
        entity.extend(tagged(kind, predicate));

        self.store.put(entity.clone()).await?;
        info!(
            "Created {} {}",
            kind,
            entity.get("_id").cloned().unwrap_or(serde_json::Value::Null)
        );
        Ok(entity)
    }

    /// `resolve`, deserialized into `T`.
    pub async fn resolve_as<T, F, Fut>(
        &self,
        kind: &str,
        predicate: Document,
        loader: F,
    ) -> FlowResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FlowResult<Document>> + Send,
    {
        let entity = self.resolve(kind, predicate, loader).await?;
        Ok(serde_json::from_value(Value::Object(entity))?)
    }
}

fn tagged(kind: &str, mut predicate: Document) -> Document {
    predicate.insert(KIND_FIELD.to_string(), Value::String(kind.to_string()));
    predicate.insert(
        VERSION_FIELD.to_string(),
        Value::String(SCHEMA_VERSION.to_string()),
    );
    predicate
}

/// Serialize a record into a document.
pub fn to_document<T: Serialize>(value: &T) -> FlowResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(document) => Ok(document),
        other => Err(FlowError::ConsistencyViolation(format!(
            "Expected an object, got {}",
            other
        ))),
    }
}

/// Build a document from `json!` output.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDocumentStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache() -> IdentityCache<MemoryDocumentStore> {
        IdentityCache::new(Arc::new(MemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn test_resolve_creates_once() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = |id: &'static str| {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(document(json!({"_id": id, "width": 640})))
            }
        };

        let first = cache
            .resolve("thing", document(json!({"srcPath": "file/a"})), counting("a1"))
            .await
            .unwrap();
        let second = cache
            .resolve("thing", document(json!({"srcPath": "file/a"})), counting("a2"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first["_id"], "a1");
        assert_eq!(first["kind"], "thing");
        assert_eq!(first["dbVersion"], SCHEMA_VERSION);
        assert!(first["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_predicate_fields_win_over_loader() {
        let cache = cache();
        let entity = cache
            .resolve("thing", document(json!({"srcPath": "file/a"})), || async {
                Ok(document(json!({"_id": "a", "srcPath": "elsewhere", "kind": "other"})))
            })
            .await
            .unwrap();
        assert_eq!(entity["srcPath"], "file/a");
        assert_eq!(entity["kind"], "thing");
    }

    #[tokio::test]
    async fn test_kind_separates_entries() {
        let cache = cache();
        let predicate = document(json!({"srcPath": "file/a"}));
        cache
            .resolve("video", predicate.clone(), || async {
                Ok(document(json!({"_id": "v"})))
            })
            .await
            .unwrap();
        assert!(cache.find("job", predicate.clone()).await.unwrap().is_none());
        assert!(cache.find("video", predicate).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_entries_are_a_consistency_violation() {
        let cache = cache();
        for id in ["x1", "x2"] {
            cache
                .store()
                .put(document(json!({
                    "_id": id,
                    "kind": "thing",
                    "dbVersion": SCHEMA_VERSION,
                    "srcPath": "file/a",
                })))
                .await
                .unwrap();
        }

        let err = cache
            .resolve("thing", document(json!({"srcPath": "file/a"})), || async {
                Ok(document(json!({"_id": "x3"})))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ConsistencyViolation(_)));
    }

    #[tokio::test]
    async fn test_racing_creators_are_detected() {
        let cache = cache();
        let predicate = document(json!({"srcPath": "file/race"}));
        let slow_loader = |id: &'static str| {
            move || async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(document(json!({"_id": id})))
            }
        };

        let (a, b) = tokio::join!(
            cache.resolve("thing", predicate.clone(), slow_loader("r1")),
            cache.resolve("thing", predicate.clone(), slow_loader("r2")),
        );
        assert_ne!(a.unwrap()["_id"], b.unwrap()["_id"]);

        let err = cache
            .resolve("thing", predicate, slow_loader("r3"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ConsistencyViolation(_)));
    }

    #[tokio::test]
    async fn test_loader_failure_persists_nothing() {
        let cache = cache();
        let err = cache
            .resolve("thing", document(json!({"srcPath": "file/a"})), || async {
                Err(FlowError::ComputationFailed("probe failed".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ComputationFailed(_)));
        assert!(cache.store().is_empty().await);
    }
}
