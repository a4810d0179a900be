use crate::domain::{ChainNode, ContentAddress};
use crate::error::FlowResult;
use async_trait::async_trait;

/// Immutable content-addressed storage for chain nodes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a node and return its content address
    async fn put(&self, node: &ChainNode) -> FlowResult<ContentAddress>;

    /// Fetch a node; `None` when nothing is stored under `address`
    async fn get(&self, address: &ContentAddress) -> FlowResult<Option<ChainNode>>;
}
