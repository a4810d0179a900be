//! Local adapters for single-node deployment.

pub mod http;
pub mod listener;
pub mod motion;
pub mod redis;

pub use motion::MotionEngine;
pub use redis::RedisPool;
