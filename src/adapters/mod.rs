//! Adapters - Concrete implementations of ports.

pub mod fs;
pub mod memory;
pub mod probe;
pub mod synthetic;

#[cfg(feature = "local")]
pub mod local;

pub use fs::FsObjectStore;
pub use memory::{MemoryDocumentStore, MemoryObjectStore};
pub use probe::FfprobeProber;
pub use synthetic::SyntheticEngine;
