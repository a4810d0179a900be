//! Forward reconstruction of a backward-linked chain.

use super::slots::{slots, SlotSequence, SlotWriter};
use crate::config::DEFAULT_MAX_CHAIN_BLOCKS;
use crate::domain::{Block, BlockLayout, ChainNode, ContentAddress, FrameRange};
use crate::error::{FlowError, FlowResult};
use crate::ports::objects::ObjectStore;
use std::sync::Arc;
use tracing::debug;

/// A chain node together with its position in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainBlock {
    /// 1-based
    pub sequence: u64,
    pub total: u64,
    pub address: ContentAddress,
    pub node: ChainNode,
}

impl ChainBlock {
    /// Decompress the node back into the block it was built from.
    pub fn decode(&self, layout: &BlockLayout) -> FlowResult<Block> {
        let data = self.node.payload()?;
        let from_frame = (self.sequence - 1) * layout.block_frames;
        let range = FrameRange::new(from_frame, from_frame + layout.frames_in(data.len()));
        Ok(Block {
            data: data.into(),
            range,
            block_nr: self.sequence,
            nb_blocks: self.total,
        })
    }
}

/// Chain blocks in ascending sequence order.
pub type ChainSequence = SlotSequence<ChainBlock>;

pub struct ChainReader<O> {
    objects: Arc<O>,
    max_blocks: u64,
}

impl<O> Clone for ChainReader<O> {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            max_blocks: self.max_blocks,
        }
    }
}

impl<O: ObjectStore + 'static> ChainReader<O> {
    pub fn new(objects: Arc<O>) -> Self {
        Self::with_max_blocks(objects, DEFAULT_MAX_CHAIN_BLOCKS)
    }

    /// Refuse heads claiming a position past `max_blocks`.
    pub fn with_max_blocks(objects: Arc<O>, max_blocks: u64) -> Self {
        Self {
            objects,
            max_blocks: max_blocks.max(1),
        }
    }

    /// Walk back from `head` in the background, yielding blocks 1, 2, ... as
    /// the walk reaches them.
    ///
    /// The head's link annotation gives the total and the head's own
    /// position; a head of an unfinished chain yields only the blocks
    /// written so far.
    pub async fn read(&self, head: ContentAddress) -> FlowResult<ChainSequence> {
        let node = fetch(self.objects.as_ref(), &head).await?;
        let (sequence, total) = match node.link()? {
            Some(link) => (link.name.previous + 1, link.name.total),
            None => (1, 1),
        };
        // Slots are allocated up front, so the annotation is bounded first.
        if sequence > self.max_blocks {
            return Err(FlowError::ChainIntegrity(format!(
                "Head {} claims block {} of {}, over the limit of {}",
                head, sequence, total, self.max_blocks
            )));
        }
        debug!("Reading chain {} ({} of {} blocks)", head, sequence, total);

        let (writer, receivers) = slots(sequence as usize);
        let objects = self.objects.clone();
        let producer = tokio::spawn(async move {
            walk(objects.as_ref(), head, node, sequence, total, writer).await
        });
        Ok(SlotSequence::new(receivers, producer, unreached))
    }
}

fn unreached(index: usize) -> FlowError {
    FlowError::ChainIntegrity(format!("Block {} was never reached", index + 1))
}

async fn fetch<O: ObjectStore + ?Sized>(
    objects: &O,
    address: &ContentAddress,
) -> FlowResult<ChainNode> {
    objects
        .get(address)
        .await?
        .ok_or_else(|| FlowError::ChainIntegrity(format!("Missing chain node {}", address)))
}

async fn walk<O: ObjectStore + ?Sized>(
    objects: &O,
    mut address: ContentAddress,
    mut node: ChainNode,
    mut sequence: u64,
    total: u64,
    mut writer: SlotWriter<ChainBlock>,
) -> FlowResult<()> {
    loop {
        let link = node.link()?.cloned();
        writer.fulfil(
            (sequence - 1) as usize,
            ChainBlock {
                sequence,
                total,
                address,
                node,
            },
        );

        let Some(link) = link else {
            return Ok(());
        };
        if link.name.total != total {
            return Err(FlowError::ChainIntegrity(format!(
                "Block {} of {} claims a total of {}",
                sequence, total, link.name.total
            )));
        }

        let previous = fetch(objects, &link.target).await?;
        let found = previous.sequence()?;
        if found != sequence - 1 {
            return Err(FlowError::ChainIntegrity(format!(
                "Block {} links to {} which is block {}, expected {}",
                sequence,
                link.target,
                found,
                sequence - 1
            )));
        }

        address = link.target;
        node = previous;
        sequence -= 1;
    }
}
