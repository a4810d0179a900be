//! Ports - Trait definitions for the external collaborators.

pub mod documents;
pub mod engine;
pub mod objects;
pub mod probe;

pub use documents::{Document, DocumentStore};
pub use engine::{ComputationEngine, EngineHandle};
pub use objects::ObjectStore;
pub use probe::VideoProber;
