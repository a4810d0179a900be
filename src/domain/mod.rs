//! Domain layer - Pure types and invariants, no I/O.

pub mod address;
pub mod blocks;
pub mod chain;
pub mod jobs;
pub mod video;

pub use address::ContentAddress;
pub use blocks::{Block, BlockLayout, FrameRange};
pub use chain::{ChainLink, ChainNode, LinkName};
pub use jobs::{Job, JobStatus};
pub use video::{SourceLocator, Video};
