//! Bridges the callback-driven engine into a pull sequence of blocks.

use super::slots::{slots, SlotSequence, SlotWriter};
use crate::config::EngineProperties;
use crate::domain::{Block, BlockLayout, FrameRange};
use crate::error::{FlowError, FlowResult};
use crate::ports::engine::{ComputationEngine, EngineHandle};
use bytes::BytesMut;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blocks in ascending order; ends early with the engine's error on failure.
pub type BlockSequence = SlotSequence<Block>;

pub struct ComputationAdapter<E> {
    engine: Arc<E>,
    layout: BlockLayout,
    properties: EngineProperties,
}

impl<E> Clone for ComputationAdapter<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            layout: self.layout,
            properties: self.properties.clone(),
        }
    }
}

impl<E: ComputationEngine + 'static> ComputationAdapter<E> {
    pub fn new(engine: Arc<E>, layout: BlockLayout, properties: EngineProperties) -> Self {
        Self {
            engine,
            layout,
            properties,
        }
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// Open `file_path` and start the engine run in the background.
    ///
    /// Slots are allocated up front, one per block; every progress callback
    /// fills the slot of the window it completes.
    pub async fn start(&self, file_path: &str) -> FlowResult<BlockSequence> {
        let engine = self.engine.clone();
        let properties = self.properties.clone();
        let path = file_path.to_string();
        let session =
            tokio::task::spawn_blocking(move || EngineSession::open(engine, &path, &properties))
                .await??;

        let nb_blocks = self.layout.block_count(session.total_frames);
        info!(
            "Computing {} frames ({} ms) of {} in {} blocks",
            session.total_frames, session.duration_ms, file_path, nb_blocks
        );

        let (writer, receivers) = slots(nb_blocks as usize);
        let layout = self.layout;
        let producer = tokio::task::spawn_blocking(move || session.run(layout, writer));
        Ok(SlotSequence::new(receivers, producer, abandoned_block))
    }
}

fn abandoned_block(index: usize) -> FlowError {
    FlowError::ComputationFailed(format!("Block {} was never produced", index + 1))
}

/// An open engine handle, destroyed on drop.
struct EngineSession<E: ComputationEngine> {
    engine: Arc<E>,
    handle: EngineHandle,
    total_frames: u64,
    duration_ms: u64,
}

impl<E: ComputationEngine> EngineSession<E> {
    fn open(engine: Arc<E>, path: &str, properties: &EngineProperties) -> FlowResult<Self> {
        let handle = engine.create_handle(path, properties).ok_or_else(|| {
            FlowError::ComputationFailed(format!("Couldn't open {}: {}", path, engine.last_error()))
        })?;

        let mut session = Self {
            engine,
            handle,
            total_frames: 0,
            duration_ms: 0,
        };
        session.total_frames = session.engine.frame_count(handle);
        if session.total_frames == 0 {
            return Err(session.failure("frame count"));
        }
        session.duration_ms = session.engine.duration_ms(handle);
        Ok(session)
    }

    fn failure(&self, operation: &str) -> FlowError {
        FlowError::ComputationFailed(format!("{}: {}", operation, self.engine.last_error()))
    }

    /// Drive the engine to completion, filling slots as windows complete.
    fn run(self, layout: BlockLayout, mut writer: SlotWriter<Block>) -> FlowResult<()> {
        let total = self.total_frames;

        // One shared buffer, carved into a disjoint region per block.
        let mut buffer = BytesMut::zeroed(layout.byte_span(FrameRange::new(0, total)).end);
        let mut regions: Vec<Option<BytesMut>> = (1..=writer.len() as u64)
            .map(|block_nr| {
                let span = layout.byte_span(layout.range(block_nr, total));
                Some(buffer.split_to(span.len()))
            })
            .collect();

        let mut failed_block = None;
        let completed = self.engine.run(
            self.handle,
            &mut |_, processed_frames| {
                if failed_block.is_some() {
                    return;
                }
                let Some(index) = layout.completed_block(processed_frames) else {
                    return;
                };
                let index = index as usize;
                if let Err(e) = self.deliver(layout, &mut regions, &mut writer, index) {
                    // The engine cannot be stopped; the consumer learns now.
                    warn!("Block {} failed mid-run: {}", index + 1, e);
                    writer.fail(index, e);
                    failed_block = Some(index);
                }
            },
            layout.block_frames,
        );

        if let Some(index) = failed_block {
            return Err(FlowError::ComputationFailed(format!(
                "Block {} could not be filled",
                index + 1
            )));
        }
        if !completed {
            return Err(self.failure("run"));
        }

        // The short tail block, plus any window the engine did not report.
        for index in writer.pending() {
            self.deliver(layout, &mut regions, &mut writer, index)?;
        }
        Ok(())
    }

    fn deliver(
        &self,
        layout: BlockLayout,
        regions: &mut [Option<BytesMut>],
        writer: &mut SlotWriter<Block>,
        index: usize,
    ) -> FlowResult<()> {
        let nb_blocks = regions.len() as u64;
        let mut region = regions.get_mut(index).and_then(Option::take).ok_or_else(|| {
            FlowError::ComputationFailed(format!(
                "Engine reported block {} of {} twice or out of range",
                index + 1,
                nb_blocks
            ))
        })?;

        let block_nr = index as u64 + 1;
        let range = layout.range(block_nr, self.total_frames);
        if !self.engine.fill_buffer(self.handle, range, &mut region[..]) {
            return Err(self.failure("fill buffer"));
        }

        debug!(
            "Block {}/{} ready: frames {}..{}",
            block_nr, nb_blocks, range.from_frame, range.to_frame
        );
        writer.fulfil(
            index,
            Block {
                data: region.freeze(),
                range,
                block_nr,
                nb_blocks,
            },
        );
        Ok(())
    }
}

impl<E: ComputationEngine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        if !self.engine.destroy_handle(self.handle) {
            warn!(
                "Couldn't release engine handle {}: {}",
                self.handle.0,
                self.engine.last_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::synthetic::SyntheticEngine;
    use std::time::Duration;

    fn adapter(engine: SyntheticEngine) -> (ComputationAdapter<SyntheticEngine>, Arc<SyntheticEngine>) {
        let layout = BlockLayout::new(400, engine.row_bytes() as u64);
        let engine = Arc::new(engine);
        (
            ComputationAdapter::new(engine.clone(), layout, EngineProperties::default()),
            engine,
        )
    }

    #[tokio::test]
    async fn test_blocks_cover_every_frame_in_order() {
        let (adapter, engine) = adapter(SyntheticEngine::new(1450, 3));
        let blocks = adapter.start("clip.mp4").await.unwrap().collect().await.unwrap();

        let ranges: Vec<_> = blocks
            .iter()
            .map(|b| (b.range.from_frame, b.range.to_frame))
            .collect();
        assert_eq!(ranges, vec![(0, 400), (400, 800), (800, 1200), (1200, 1450)]);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.block_nr, i as u64 + 1);
            assert_eq!(block.nb_blocks, 4);
            assert_eq!(block.data.as_ref(), engine.expected(block.range).as_slice());
        }
        assert_eq!(engine.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_tail() {
        let (adapter, engine) = adapter(SyntheticEngine::new(800, 1));
        let blocks = adapter.start("clip.mp4").await.unwrap().collect().await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].range, FrameRange::new(400, 800));
        assert_eq!(engine.destroy_calls(), 1);
    }

    #[tokio::test]
    async fn test_short_video_is_a_single_tail_block() {
        let (adapter, _) = adapter(SyntheticEngine::new(90, 1));
        let blocks = adapter.start("clip.mp4").await.unwrap().collect().await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].range, FrameRange::new(0, 90));
        assert_eq!(blocks[0].data.len(), 90 * 4);
    }

    #[tokio::test]
    async fn test_open_failure_carries_engine_message() {
        let (adapter, engine) = adapter(SyntheticEngine::new(10, 1).failing_create("no decoder"));
        let err = adapter.start("clip.mkv").await.err().unwrap();
        assert!(matches!(err, FlowError::ComputationFailed(ref m) if m.contains("no decoder")));
        assert_eq!(engine.destroy_calls(), 0);
    }

    #[tokio::test]
    async fn test_run_failure_ends_sequence_and_releases_handle() {
        let (adapter, engine) = adapter(SyntheticEngine::new(1450, 1).failing_at(1000));
        let mut blocks = adapter.start("clip.mp4").await.unwrap();

        assert_eq!(blocks.next().await.unwrap().unwrap().block_nr, 1);
        assert_eq!(blocks.next().await.unwrap().unwrap().block_nr, 2);
        let err = blocks.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FlowError::ComputationFailed(ref m) if m.contains("frame 1000")));
        assert!(blocks.next().await.is_none());
        assert_eq!(engine.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_fill_failure_reaches_consumer_before_run_ends() {
        let engine = SyntheticEngine::new(4000, 1)
            .failing_fill_at(400)
            .with_window_delay(Duration::from_millis(150));
        let (adapter, engine) = adapter(engine);
        let mut blocks = adapter.start("clip.mp4").await.unwrap();

        assert_eq!(blocks.next().await.unwrap().unwrap().block_nr, 1);
        let err = tokio::time::timeout(Duration::from_secs(1), blocks.next())
            .await
            .expect("failed block should surface mid-run")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, FlowError::ComputationFailed(ref m) if m.contains("frame 400")));
        assert!(blocks.next().await.is_none());
        assert_eq!(engine.create_calls(), 1);
    }
}
