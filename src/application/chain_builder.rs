//! Turns a block sequence into a backward-linked chain, checkpointing the job
//! after every node.

use super::computation::BlockSequence;
use super::jobs::JobRepository;
use super::progress::JobHub;
use crate::domain::chain::compress;
use crate::domain::{Block, ChainLink, ChainNode, ContentAddress, Job, LinkName};
use crate::error::FlowResult;
use crate::ports::documents::DocumentStore;
use crate::ports::objects::ObjectStore;
use std::sync::Arc;
use tracing::info;

pub struct ChainBuilder<O, D> {
    objects: Arc<O>,
    jobs: JobRepository<D>,
    hub: JobHub,
}

impl<O, D> Clone for ChainBuilder<O, D> {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            jobs: self.jobs.clone(),
            hub: self.hub.clone(),
        }
    }
}

impl<O: ObjectStore, D: DocumentStore> ChainBuilder<O, D> {
    pub fn new(objects: Arc<O>, jobs: JobRepository<D>, hub: JobHub) -> Self {
        Self { objects, jobs, hub }
    }

    /// Append every block of `blocks` to a fresh chain for `job`.
    ///
    /// Stops at the first failure; nodes written so far stay in the store and
    /// the last saved job still points at a valid head.
    pub async fn build(&self, job: &mut Job, mut blocks: BlockSequence) -> FlowResult<()> {
        let mut previous: Option<ChainLink> = None;
        while let Some(block) = blocks.next().await {
            let block = block?;
            let (address, link) = self.append(block, previous.take()).await?;

            job.commit_block(link.name.previous, link.name.total, address)?;
            self.jobs.save(job).await?;
            self.hub.publish(job.clone());
            info!(
                "Job {} committed block {}/{} at {}",
                job.id, link.name.previous, link.name.total, address
            );

            previous = Some(link);
        }
        Ok(())
    }

    /// Store `block` linked to `previous`; returns its address and the link
    /// the next node should carry.
    async fn append(
        &self,
        block: Block,
        previous: Option<ChainLink>,
    ) -> FlowResult<(ContentAddress, ChainLink)> {
        let raw = block.data;
        let compressed = tokio::task::spawn_blocking(move || compress(&raw)).await??;

        let node = ChainNode::new(compressed, previous);
        let address = self.objects.put(&node).await?;
        let link = ChainLink {
            target: address,
            name: LinkName {
                total: block.nb_blocks,
                previous: block.block_nr,
            },
            size: node.data.len() as u64,
        };
        Ok((address, link))
    }
}
