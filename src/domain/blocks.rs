use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Half-open frame interval `[from_frame, to_frame)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRange {
    pub from_frame: u64,
    pub to_frame: u64,
}

impl FrameRange {
    pub fn new(from_frame: u64, to_frame: u64) -> Self {
        Self {
            from_frame,
            to_frame,
        }
    }

    pub fn len(&self) -> u64 {
        self.to_frame.saturating_sub(self.from_frame)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Geometry of the block partitioning: frames per block and bytes per frame row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub block_frames: u64,
    pub row_bytes: u64,
}

impl BlockLayout {
    pub fn new(block_frames: u64, row_bytes: u64) -> Self {
        Self {
            block_frames: block_frames.max(1),
            row_bytes,
        }
    }

    /// Number of blocks needed to cover `total_frames`, the last one possibly short.
    pub fn block_count(&self, total_frames: u64) -> u64 {
        total_frames.div_ceil(self.block_frames)
    }

    /// Frame range of the 1-based block `block_nr`.
    pub fn range(&self, block_nr: u64, total_frames: u64) -> FrameRange {
        let from = (block_nr.saturating_sub(1) * self.block_frames).min(total_frames);
        let to = (block_nr * self.block_frames).min(total_frames);
        FrameRange::new(from, to)
    }

    /// Byte span of `range` inside a buffer holding every frame row.
    pub fn byte_span(&self, range: FrameRange) -> Range<usize> {
        (range.from_frame * self.row_bytes) as usize..(range.to_frame * self.row_bytes) as usize
    }

    /// 0-based block completed when the engine reports `processed_frames`.
    pub fn completed_block(&self, processed_frames: u64) -> Option<u64> {
        (processed_frames / self.block_frames).checked_sub(1)
    }

    /// Number of frames held by a raw payload of `len` bytes.
    pub fn frames_in(&self, len: usize) -> u64 {
        if self.row_bytes == 0 {
            return 0;
        }
        len as u64 / self.row_bytes
    }
}

/// One unit of raw engine output for a contiguous frame range.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub data: Bytes,
    pub range: FrameRange,
    /// 1-based sequence number
    pub block_nr: u64,
    pub nb_blocks: u64,
}
