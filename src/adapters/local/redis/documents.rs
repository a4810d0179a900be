//! Redis DocumentStore implementation.

use super::pool::RedisPool;
use crate::adapters::memory::document_id;
use crate::error::FlowResult;
use crate::ports::documents::{Document, DocumentStore, Predicate};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

#[async_trait]
impl DocumentStore for RedisPool {
    async fn query(&self, predicate: Predicate<'_>) -> FlowResult<Vec<Document>> {
        let mut conn = self.pool.get().await?;
        let values: Vec<String> = conn.hvals(&self.documents_key).await?;

        let mut matching = Vec::new();
        for json in values {
            let document: Document = serde_json::from_str(&json)?;
            if predicate(&document) {
                matching.push(document);
            }
        }
        Ok(matching)
    }

    async fn put(&self, document: Document) -> FlowResult<()> {
        let id = document_id(&document)?;
        let json = serde_json::to_string(&document)?;
        let mut conn = self.pool.get().await?;
        conn.hset::<_, _, _, ()>(&self.documents_key, id, json).await?;
        Ok(())
    }
}
