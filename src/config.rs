//! Configuration loaded from the environment.

use crate::domain::blocks::BlockLayout;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Tuning values handed to the engine when a handle is created.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineProperties {
    /// Number of angle pools per frame (one `i32` counter each)
    pub number_of_pools: u32,
    pub max_value: f32,
    pub overlay_half: bool,
    pub focus_point: f32,
    pub focus_size: f32,
    pub wave_smoothing: f32,
}

impl Default for EngineProperties {
    fn default() -> Self {
        Self {
            number_of_pools: 180,
            max_value: 0.2,
            overlay_half: false,
            focus_point: 0.5,
            focus_size: 0.5,
            wave_smoothing: 0.5,
        }
    }
}

/// 65536 blocks of 400 frames is about ten days of 30 fps video.
pub const DEFAULT_MAX_CHAIN_BLOCKS: u64 = 1 << 16;

/// Configuration for the pipeline and its local deployment.
#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Redis connection URL for the document store
    pub redis_url: String,
    /// Root directory of the filesystem object store
    pub data_dir: PathBuf,
    /// Gateway used to resolve `ipfs/<hash>` locators
    pub gateway_url: String,
    /// Frames per block
    pub block_frames: u64,
    /// Longest chain a reader accepts from a head's link annotation
    pub max_chain_blocks: u64,
    pub engine: EngineProperties,
    /// Engine library fingerprinted at startup
    pub lib_file: Option<PathBuf>,
    /// Model file fingerprinted at startup
    pub model_file: Option<PathBuf>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            addr: String::from("127.0.0.1"),
            port: String::from("3000"),
            redis_url: String::from("redis://127.0.0.1/"),
            data_dir: PathBuf::from("./data"),
            gateway_url: String::from("http://127.0.0.1:8080"),
            block_frames: 400,
            max_chain_blocks: DEFAULT_MAX_CHAIN_BLOCKS,
            engine: EngineProperties::default(),
            lib_file: None,
            model_file: None,
        }
    }
}

impl FlowConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let engine = EngineProperties {
            number_of_pools: parsed("FLOW_POOLS", defaults.engine.number_of_pools),
            max_value: parsed("FLOW_MAX_VALUE", defaults.engine.max_value),
            overlay_half: parsed("FLOW_OVERLAY_HALF", defaults.engine.overlay_half),
            focus_point: parsed("FLOW_FOCUS_POINT", defaults.engine.focus_point),
            focus_size: parsed("FLOW_FOCUS_SIZE", defaults.engine.focus_size),
            wave_smoothing: parsed("FLOW_WAVE_SMOOTHING", defaults.engine.wave_smoothing),
        };

        Self {
            addr: env::var("ADDR").unwrap_or(defaults.addr),
            port: env::var("PORT").unwrap_or(defaults.port),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            gateway_url: env::var("IPFS_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            block_frames: parsed("FLOW_BLOCK_FRAMES", defaults.block_frames).max(1),
            max_chain_blocks: parsed("FLOW_MAX_CHAIN_BLOCKS", defaults.max_chain_blocks).max(1),
            engine,
            lib_file: env::var("FLOW_LIB_FILE").ok().map(PathBuf::from),
            model_file: env::var("FLOW_MODEL_FILE").ok().map(PathBuf::from),
        }
    }

    /// Block geometry derived from the block size and pool count.
    pub fn layout(&self) -> BlockLayout {
        BlockLayout::new(self.block_frames, self.engine.number_of_pools as u64 * 4)
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_matches_engine_rows() {
        let config = FlowConfig::default();
        let layout = config.layout();
        assert_eq!(layout.block_frames, 400);
        assert_eq!(layout.row_bytes, 720);
    }

    #[test]
    fn test_parsed_falls_back_on_garbage() {
        std::env::set_var("FLOWCHAIN_TEST_GARBAGE", "not-a-number");
        assert_eq!(parsed("FLOWCHAIN_TEST_GARBAGE", 7u64), 7);
        std::env::remove_var("FLOWCHAIN_TEST_GARBAGE");
    }
}
