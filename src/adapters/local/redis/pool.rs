use super::DOCUMENTS_KEY;
use crate::error::FlowResult;
use deadpool_redis::{Config, Pool, Runtime};

/// Pooled Redis connections plus the hash holding every document.
#[derive(Clone)]
pub struct RedisPool {
    pub(super) pool: Pool,
    pub(super) documents_key: String,
}

impl RedisPool {
    pub fn new(redis_url: &str) -> FlowResult<Self> {
        Self::with_key(redis_url, DOCUMENTS_KEY)
    }

    /// Keep documents under `documents_key` instead of the default hash.
    pub fn with_key(redis_url: &str, documents_key: &str) -> FlowResult<Self> {
        let pool = Config::from_url(redis_url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self {
            pool,
            documents_key: documents_key.to_string(),
        })
    }

    pub fn documents_key(&self) -> &str {
        &self.documents_key
    }
}
