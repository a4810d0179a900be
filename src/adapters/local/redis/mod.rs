//! Redis adapter for local deployment.
//!
//! Provides a Redis-backed `DocumentStore`: every document is a JSON value in
//! one hash, keyed by its `_id`.

mod documents;
mod error;
mod pool;

pub use pool::RedisPool;

/// Redis key constants
const DOCUMENTS_KEY: &str = "flowchain:documents";
