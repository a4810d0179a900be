use crate::error::FlowResult;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

/// Identity field every document is upserted by.
pub const ID_FIELD: &str = "_id";

pub type Predicate<'a> = &'a (dyn Fn(&Document) -> bool + Send + Sync);

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents for which `predicate` holds
    async fn query(&self, predicate: Predicate<'_>) -> FlowResult<Vec<Document>>;

    /// Insert or replace the document with the same `_id`
    async fn put(&self, document: Document) -> FlowResult<()>;
}

/// True when every field of `expected` is present in `document` with an equal value.
pub fn matches_exactly(document: &Document, expected: &Document) -> bool {
    expected
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}
