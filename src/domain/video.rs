use super::address::ContentAddress;
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    File,
    Http,
    Https,
    Ipfs,
}

/// A parsed source reference such as `file/home/me/clip.mp4` or `ipfs/<hash>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub protocol: Protocol,
    /// The locator exactly as requested, used as the dedup key
    pub src_path: String,
    /// Path or URL handed to the prober and the engine
    pub file_path: String,
}

impl SourceLocator {
    pub fn parse(input: &str, gateway_url: &str) -> FlowResult<Self> {
        let src_path = input.trim_start_matches('/');
        let mut parts = src_path.split('/');
        let protocol = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        if rest.iter().all(|part| part.is_empty()) {
            return Err(FlowError::InvalidLocator(input.to_string()));
        }

        let (protocol, file_path) = match protocol {
            "file" => (Protocol::File, local_path(&rest)),
            "http" => (Protocol::Http, format!("http://{}", rest.join("/"))),
            "https" => (Protocol::Https, format!("https://{}", rest.join("/"))),
            "ipfs" => (
                Protocol::Ipfs,
                format!("{}/ipfs/{}", gateway_url.trim_end_matches('/'), rest[0]),
            ),
            _ => return Err(FlowError::InvalidLocator(input.to_string())),
        };

        Ok(Self {
            protocol,
            src_path: src_path.to_string(),
            file_path,
        })
    }

    pub fn is_local(&self) -> bool {
        self.protocol == Protocol::File
    }
}

#[cfg(windows)]
fn local_path(rest: &[&str]) -> String {
    format!("{}:/{}", rest[0], rest[1..].join("/"))
}

#[cfg(not(windows))]
fn local_path(rest: &[&str]) -> String {
    format!("/{}", rest.join("/"))
}

/// One requested source locator and the stream it resolved to.
///
/// The record is keyed by its locator; `video_id` identifies the logical
/// input by probed stream metadata, so mirrors of one file share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: String,
    pub video_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub db_version: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub src_path: String,
    pub file_path: String,
    pub stream: Value,
}

impl Video {
    pub const KIND: &'static str = "video";

    pub fn width(&self) -> Option<u64> {
        self.stream.get("width").and_then(Value::as_u64)
    }

    pub fn height(&self) -> Option<u64> {
        self.stream.get("height").and_then(Value::as_u64)
    }

    pub fn codec(&self) -> Option<&str> {
        self.stream.get("codec_name").and_then(Value::as_str)
    }

    /// Stream duration in seconds; ffprobe reports it as a decimal string.
    pub fn duration_secs(&self) -> Option<f64> {
        match self.stream.get("duration")? {
            Value::String(s) => s.parse().ok(),
            other => other.as_f64(),
        }
    }
}

/// Largest video stream among ffprobe's `streams` entries.
pub fn best_video_stream(streams: &[Value]) -> Option<&Value> {
    let dimension = |stream: &Value, key: &str| stream.get(key).and_then(Value::as_u64).unwrap_or(0);

    streams
        .iter()
        .filter(|stream| stream.get("codec_type").and_then(Value::as_str) == Some("video"))
        .fold(None, |best: Option<&Value>, stream| match best {
            Some(current)
                if dimension(stream, "width") <= dimension(current, "width")
                    && dimension(stream, "height") <= dimension(current, "height") =>
            {
                Some(current)
            }
            _ => Some(stream),
        })
}

/// Record identity of a locator.
pub fn locator_identity(src_path: &str) -> String {
    ContentAddress::of(src_path.as_bytes()).to_string()
}

/// Identity derived from stream metadata, never from the raw bytes.
pub fn stream_identity(stream: &Value) -> FlowResult<String> {
    Ok(ContentAddress::of(&serde_json::to_vec(stream)?).to_string())
}
