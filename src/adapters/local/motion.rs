//! Motion-vector engine on top of ffmpeg.
//!
//! Decodes the best video stream with exported motion vectors and, per frame,
//! counts the vectors whose magnitude passes a threshold into 2° angle pools.
//! Each frame row holds one little-endian `i32` counter per pool.

use crate::config::EngineProperties;
use crate::domain::FrameRange;
use crate::ports::engine::{ComputationEngine, EngineHandle};
use ffmpeg_next as ffmpeg;
use std::collections::HashMap;
use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const MAGNITUDE_THRESHOLD: f32 = 0.5;
const DEGREES_PER_POOL: f32 = 2.0;

type MotionVector = ffmpeg::ffi::AVMotionVector;

struct Session {
    path: String,
    pools: usize,
    frames: u64,
    duration_ms: u64,
    rows: Arc<Mutex<Vec<i32>>>,
}

#[derive(Default)]
pub struct MotionEngine {
    next_handle: AtomicU64,
    sessions: Mutex<HashMap<u64, Session>>,
    last_error: Mutex<String>,
}

impl MotionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, Session>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fail(&self, message: String) -> bool {
        warn!("Motion engine: {}", message);
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = message;
        false
    }

    fn with_session<T>(&self, handle: EngineHandle, f: impl FnOnce(&Session) -> T) -> Option<T> {
        let sessions = self.sessions();
        match sessions.get(&handle.0) {
            Some(session) => Some(f(session)),
            None => {
                drop(sessions);
                self.fail(format!("Unknown handle {}", handle.0));
                None
            }
        }
    }

    fn decode(
        &self,
        handle: EngineHandle,
        path: &str,
        pools: usize,
        frames: u64,
        rows: &Mutex<Vec<i32>>,
        on_progress: &mut dyn FnMut(EngineHandle, u64),
        window: u64,
    ) -> Result<(), ffmpeg::Error> {
        let mut input = ffmpeg::format::input(&path)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(ffmpeg::Error::StreamNotFound)?;
        let stream_index = stream.index();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let codec = ffmpeg::decoder::find(context.id()).ok_or(ffmpeg::Error::DecoderNotFound)?;
        let mut options = ffmpeg::Dictionary::new();
        options.set("flags2", "+export_mvs");
        let mut decoder = context.decoder().open_as_with(codec, options)?.video()?;

        let mut frame = ffmpeg::frame::Video::empty();
        let mut processed = 0u64;
        let mut drain = |decoder: &mut ffmpeg::decoder::Video, processed: &mut u64| {
            while decoder.receive_frame(&mut frame).is_ok() {
                if *processed >= frames {
                    continue;
                }
                if let Some(vectors) =
                    frame.side_data(ffmpeg::frame::side_data::Type::MotionVectors)
                {
                    let mut rows = rows.lock().unwrap_or_else(|p| p.into_inner());
                    let start = *processed as usize * pools;
                    count_vectors(vectors.data(), &mut rows[start..start + pools]);
                }
                *processed += 1;
                if *processed % window == 0 {
                    on_progress(handle, *processed);
                }
            }
        };

        for (stream, packet) in input.packets() {
            if stream.index() == stream_index {
                decoder.send_packet(&packet)?;
                drain(&mut decoder, &mut processed);
            }
        }
        decoder.send_eof()?;
        drain(&mut decoder, &mut processed);

        debug!("Decoded {} of {} frames from {}", processed, frames, path);
        Ok(())
    }
}

/// Add each vector of a `MotionVectors` side-data buffer to its angle pool.
fn count_vectors(side_data: &[u8], pools: &mut [i32]) {
    let stride = size_of::<MotionVector>();
    for vector in side_data.chunks_exact(stride) {
        let x = read_i32(vector, offset_of!(MotionVector, motion_x)) as f32;
        let y = read_i32(vector, offset_of!(MotionVector, motion_y)) as f32;
        if let Some(pool) = angle_pool(x, y, pools.len()) {
            pools[pool] += 1;
        }
    }
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_ne_bytes(raw)
}

/// Pool index of a vector, or `None` below the magnitude threshold.
fn angle_pool(x: f32, y: f32, pools: usize) -> Option<usize> {
    if x.hypot(y) < MAGNITUDE_THRESHOLD {
        return None;
    }
    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);
    let pool = (degrees / DEGREES_PER_POOL) as usize;
    (pool < pools).then_some(pool)
}

impl ComputationEngine for MotionEngine {
    fn create_handle(
        &self,
        source_path: &str,
        properties: &EngineProperties,
    ) -> Option<EngineHandle> {
        if let Err(e) = ffmpeg::init() {
            self.fail(format!("ffmpeg init: {}", e));
            return None;
        }

        let input = match ffmpeg::format::input(&source_path) {
            Ok(input) => input,
            Err(e) => {
                self.fail(format!("Couldn't open {}: {}", source_path, e));
                return None;
            }
        };
        let Some(stream) = input.streams().best(ffmpeg::media::Type::Video) else {
            self.fail(format!("No video stream in {}", source_path));
            return None;
        };

        let duration_ms = (input.duration().max(0) as u64) / 1000;
        let frames = match stream.frames() {
            n if n > 0 => n as u64,
            _ => (duration_ms as f64 / 1000.0 * f64::from(stream.avg_frame_rate())) as u64,
        };

        let pools = properties.number_of_pools as usize;
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions().insert(
            handle,
            Session {
                path: source_path.to_string(),
                pools,
                frames,
                duration_ms,
                rows: Arc::new(Mutex::new(vec![0; frames as usize * pools])),
            },
        );
        Some(EngineHandle(handle))
    }

    fn destroy_handle(&self, handle: EngineHandle) -> bool {
        if self.sessions().remove(&handle.0).is_none() {
            return self.fail(format!("Unknown handle {}", handle.0));
        }
        true
    }

    fn frame_count(&self, handle: EngineHandle) -> u64 {
        self.with_session(handle, |s| s.frames).unwrap_or(0)
    }

    fn duration_ms(&self, handle: EngineHandle) -> u64 {
        self.with_session(handle, |s| s.duration_ms).unwrap_or(0)
    }

    fn run(
        &self,
        handle: EngineHandle,
        on_progress: &mut dyn FnMut(EngineHandle, u64),
        window: u64,
    ) -> bool {
        let Some((path, pools, frames, rows)) = self.with_session(handle, |s| {
            (s.path.clone(), s.pools, s.frames, s.rows.clone())
        }) else {
            return false;
        };
        if window == 0 {
            return self.fail("Window must be positive".to_string());
        }

        match self.decode(handle, &path, pools, frames, &rows, on_progress, window) {
            Ok(()) => true,
            Err(e) => self.fail(format!("Decoding {} failed: {}", path, e)),
        }
    }

    fn fill_buffer(&self, handle: EngineHandle, range: FrameRange, buffer: &mut [u8]) -> bool {
        let Some((pools, frames, rows)) =
            self.with_session(handle, |s| (s.pools, s.frames, s.rows.clone()))
        else {
            return false;
        };
        if range.to_frame > frames || buffer.len() != range.len() as usize * pools * 4 {
            return self.fail(format!(
                "Range {}..{} does not fit {} frames / {} byte buffer",
                range.from_frame,
                range.to_frame,
                frames,
                buffer.len()
            ));
        }

        let rows = rows.lock().unwrap_or_else(|p| p.into_inner());
        let counters = &rows[range.from_frame as usize * pools..range.to_frame as usize * pools];
        for (out, counter) in buffer.chunks_exact_mut(4).zip(counters) {
            out.copy_from_slice(&counter.to_le_bytes());
        }
        true
    }

    fn last_error(&self) -> String {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_pools() {
        assert_eq!(angle_pool(0.1, 0.1, 180), None);
        assert_eq!(angle_pool(4.0, 0.0, 180), Some(0));
        assert_eq!(angle_pool(0.0, 4.0, 180), Some(45));
        assert_eq!(angle_pool(-4.0, 0.0, 180), Some(90));
        assert_eq!(angle_pool(0.0, -4.0, 180), Some(135));
        assert_eq!(angle_pool(0.0, -4.0, 100), None);
    }

    #[test]
    fn test_unknown_handle() {
        let engine = MotionEngine::new();
        assert_eq!(engine.frame_count(EngineHandle(42)), 0);
        assert!(engine.last_error().contains("Unknown handle 42"));
        assert!(!engine.destroy_handle(EngineHandle(42)));
    }

    #[test]
    fn test_missing_file() {
        let engine = MotionEngine::new();
        let handle = engine.create_handle("/no/such/video.mp4", &EngineProperties::default());
        assert!(handle.is_none());
        assert!(engine.last_error().contains("/no/such/video.mp4"));
    }
}
