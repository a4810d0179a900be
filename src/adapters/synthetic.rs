//! Deterministic in-process engine, for tests and dry runs without native code.
//!
//! Every frame row holds `pools` little-endian `i32` values where pool `p` of
//! frame `f` is `f * 31 + p`.

use crate::config::EngineProperties;
use crate::domain::FrameRange;
use crate::ports::engine::{ComputationEngine, EngineHandle};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct EngineState {
    next_handle: u64,
    open: HashSet<u64>,
    last_error: String,
}

pub struct SyntheticEngine {
    frames: u64,
    duration_ms: u64,
    pools: usize,
    fail_run_at: Option<u64>,
    fail_fill_at: Option<u64>,
    window_delay: Option<Duration>,
    fail_create: Option<String>,
    state: Mutex<EngineState>,
    create_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
}

impl SyntheticEngine {
    pub fn new(frames: u64, pools: usize) -> Self {
        Self {
            frames,
            duration_ms: frames * 1000 / 30,
            pools,
            fail_run_at: None,
            fail_fill_at: None,
            window_delay: None,
            fail_create: None,
            state: Mutex::new(EngineState::default()),
            create_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
        }
    }

    /// Abort the run once `frame` frames have been processed.
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_run_at = Some(frame);
        self
    }

    /// Refuse to fill any range starting at `frame`.
    pub fn failing_fill_at(mut self, frame: u64) -> Self {
        self.fail_fill_at = Some(frame);
        self
    }

    /// Sleep after every progress callback, like a real decoder would.
    pub fn with_window_delay(mut self, delay: Duration) -> Self {
        self.window_delay = Some(delay);
        self
    }

    /// Refuse to open any source.
    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.state().open.len()
    }

    pub fn row_bytes(&self) -> usize {
        self.pools * 4
    }

    /// The raw bytes this engine produces for `range`.
    pub fn expected(&self, range: FrameRange) -> Vec<u8> {
        let mut out = Vec::with_capacity(range.len() as usize * self.row_bytes());
        for frame in range.from_frame..range.to_frame {
            for pool in 0..self.pools {
                let value = (frame * 31 + pool as u64) as i32;
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fail(&self, message: String) -> bool {
        self.state().last_error = message;
        false
    }

    fn is_open(&self, handle: EngineHandle) -> bool {
        self.state().open.contains(&handle.0)
    }
}

impl ComputationEngine for SyntheticEngine {
    fn create_handle(
        &self,
        _source_path: &str,
        _properties: &EngineProperties,
    ) -> Option<EngineHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if let Some(message) = &self.fail_create {
            state.last_error = message.clone();
            return None;
        }
        state.last_error.clear();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.open.insert(handle);
        Some(EngineHandle(handle))
    }

    fn destroy_handle(&self, handle: EngineHandle) -> bool {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state().open.remove(&handle.0) {
            return self.fail(format!("Unknown handle {}", handle.0));
        }
        true
    }

    fn frame_count(&self, handle: EngineHandle) -> u64 {
        if !self.is_open(handle) {
            self.fail(format!("Unknown handle {}", handle.0));
            return 0;
        }
        self.frames
    }

    fn duration_ms(&self, handle: EngineHandle) -> u64 {
        if !self.is_open(handle) {
            self.fail(format!("Unknown handle {}", handle.0));
            return 0;
        }
        self.duration_ms
    }

    fn run(
        &self,
        handle: EngineHandle,
        on_progress: &mut dyn FnMut(EngineHandle, u64),
        window: u64,
    ) -> bool {
        if !self.is_open(handle) {
            return self.fail(format!("Unknown handle {}", handle.0));
        }
        if window == 0 {
            return self.fail("Window must be positive".to_string());
        }
        for frame in 1..=self.frames {
            if self.fail_run_at == Some(frame) {
                return self.fail(format!("Decoder error at frame {}", frame));
            }
            if frame % window == 0 {
                on_progress(handle, frame);
                if let Some(delay) = self.window_delay {
                    std::thread::sleep(delay);
                }
            }
        }
        true
    }

    fn fill_buffer(&self, handle: EngineHandle, range: FrameRange, buffer: &mut [u8]) -> bool {
        if !self.is_open(handle) {
            return self.fail(format!("Unknown handle {}", handle.0));
        }
        if range.to_frame > self.frames || range.is_empty() {
            return self.fail(format!(
                "Range {}..{} outside 0..{}",
                range.from_frame, range.to_frame, self.frames
            ));
        }
        if self.fail_fill_at == Some(range.from_frame) {
            return self.fail(format!("No results for frame {}", range.from_frame));
        }
        let expected = self.expected(range);
        if buffer.len() != expected.len() {
            return self.fail(format!(
                "Buffer holds {} bytes, range needs {}",
                buffer.len(),
                expected.len()
            ));
        }
        buffer.copy_from_slice(&expected);
        true
    }

    fn last_error(&self) -> String {
        self.state().last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fires_every_window() {
        let engine = SyntheticEngine::new(1450, 2);
        let handle = engine
            .create_handle("clip.mp4", &EngineProperties::default())
            .unwrap();

        let mut seen = Vec::new();
        assert!(engine.run(handle, &mut |_, frame| seen.push(frame), 400));
        assert_eq!(seen, vec![400, 800, 1200]);

        assert!(engine.destroy_handle(handle));
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn test_fill_buffer_checks_sizes() {
        let engine = SyntheticEngine::new(10, 1);
        let handle = engine
            .create_handle("clip.mp4", &EngineProperties::default())
            .unwrap();

        let mut buffer = vec![0u8; 8];
        assert!(engine.fill_buffer(handle, FrameRange::new(2, 4), &mut buffer));
        assert_eq!(buffer, engine.expected(FrameRange::new(2, 4)));
        assert_eq!(&buffer[0..4], &62i32.to_le_bytes());

        let mut short = vec![0u8; 4];
        assert!(!engine.fill_buffer(handle, FrameRange::new(2, 4), &mut short));
        assert!(engine.last_error().contains("Buffer"));
    }

    #[test]
    fn test_failures_are_reported_through_last_error() {
        let engine = SyntheticEngine::new(10, 1).failing_create("no such file");
        assert!(engine
            .create_handle("missing.mp4", &EngineProperties::default())
            .is_none());
        assert_eq!(engine.last_error(), "no such file");
        assert_eq!(engine.create_calls(), 1);

        let engine = SyntheticEngine::new(10, 1).failing_at(5);
        let handle = engine
            .create_handle("clip.mp4", &EngineProperties::default())
            .unwrap();
        assert!(!engine.run(handle, &mut |_, _| {}, 2));
        assert_eq!(engine.last_error(), "Decoder error at frame 5");
    }
}
