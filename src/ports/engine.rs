//! Computation engine port.
//!
//! Mirrors a native library: calls report success with a boolean (or a zero
//! count) and the failure message is fetched separately with `last_error`.
//! Callers must check every return before trusting an output buffer.

use crate::config::EngineProperties;
use crate::domain::FrameRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

pub trait ComputationEngine: Send + Sync {
    fn create_handle(&self, source_path: &str, properties: &EngineProperties)
        -> Option<EngineHandle>;

    fn destroy_handle(&self, handle: EngineHandle) -> bool;

    /// Total frames; 0 signals failure
    fn frame_count(&self, handle: EngineHandle) -> u64;

    fn duration_ms(&self, handle: EngineHandle) -> u64;

    /// Run to completion, calling `on_progress(handle, processed_frames)` every `window` frames.
    fn run(
        &self,
        handle: EngineHandle,
        on_progress: &mut dyn FnMut(EngineHandle, u64),
        window: u64,
    ) -> bool;

    /// Copy the results for `range` into `buffer` (one row per frame).
    fn fill_buffer(&self, handle: EngineHandle, range: FrameRange, buffer: &mut [u8]) -> bool;

    fn last_error(&self) -> String;
}
