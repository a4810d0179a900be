//! Application layer - Generic services that use ports.

pub mod chain_builder;
pub mod computation;
pub mod flow;
pub mod identity;
pub mod jobs;
pub mod progress;
pub mod reader;
pub mod slots;
pub mod video;

pub use chain_builder::ChainBuilder;
pub use computation::{BlockSequence, ComputationAdapter};
pub use flow::{ArtifactIds, FlowService};
pub use identity::IdentityCache;
pub use jobs::JobRepository;
pub use progress::JobHub;
pub use reader::{ChainBlock, ChainReader, ChainSequence};
pub use video::VideoResolver;
