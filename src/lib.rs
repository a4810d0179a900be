//! Flowchain - Resumable, content-addressed streaming of per-frame video signals
//!
//! Hexagonal Architecture:
//! - domain/: Pure types (videos, jobs, blocks, chain nodes, addresses)
//! - ports/: Trait definitions (document store, object store, engine, prober)
//! - adapters/: Concrete implementations
//! - application/: Generic services (identity cache, chain builder, reader)
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Local deployment (Redis documents, ffmpeg engine, HTTP API)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use application::FlowService;
pub use config::{EngineProperties, FlowConfig};
pub use error::{FlowError, FlowResult};

#[cfg(feature = "local")]
pub use adapters::local::{http, MotionEngine, RedisPool};
