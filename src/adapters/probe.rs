use crate::error::{FlowError, FlowResult};
use crate::ports::probe::VideoProber;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

/// Probes streams by running `ffprobe` and parsing its JSON output.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfprobeProber;

impl FfprobeProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoProber for FfprobeProber {
    async fn probe_streams(&self, file_path: &str) -> FlowResult<Vec<Value>> {
        let probe = Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(file_path)
            .output()
            .await
            .map_err(|e| FlowError::ResourceUnavailable(format!("ffprobe: {}", e)))?;

        if !probe.status.success() {
            return Err(FlowError::ComputationFailed(format!(
                "ffprobe failed for {}: {}",
                file_path,
                String::from_utf8_lossy(&probe.stderr).trim()
            )));
        }

        parse_streams(&probe.stdout)
    }
}

fn parse_streams(stdout: &[u8]) -> FlowResult<Vec<Value>> {
    let v: Value = serde_json::from_slice(stdout)?;
    match v.get("streams").and_then(Value::as_array) {
        Some(streams) => Ok(streams.clone()),
        None => Err(FlowError::ComputationFailed(
            "Couldn't get streams from ffprobe".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_streams() {
        let stdout = br#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 1920, "height": 1080},
                {"index": 1, "codec_type": "audio"}
            ],
            "format": {"duration": "12.000000"}
        }"#;
        let streams = parse_streams(stdout).unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0]["width"], 1920);
    }

    #[test]
    fn test_parse_streams_without_streams() {
        assert!(parse_streams(br#"{"format": {}}"#).is_err());
        assert!(parse_streams(b"not json").is_err());
    }
}
