//! Redis failures all surface as an unavailable store.

use crate::error::FlowError;
use deadpool_redis::{CreatePoolError, PoolError};

pub type RedisError = deadpool_redis::redis::RedisError;

impl From<RedisError> for FlowError {
    fn from(err: RedisError) -> Self {
        FlowError::ResourceUnavailable(format!("Redis error: {}", err))
    }
}

impl From<PoolError> for FlowError {
    fn from(err: PoolError) -> Self {
        FlowError::ResourceUnavailable(format!("Pool error: {}", err))
    }
}

impl From<CreatePoolError> for FlowError {
    fn from(err: CreatePoolError) -> Self {
        FlowError::ResourceUnavailable(format!("Create pool error: {}", err))
    }
}
