//! Chain nodes: compressed block payloads linked backward by content address.
//!
//! Nodes are bincode-encoded (little-endian, fixed-width integers, no
//! trailing bytes); link names travel in their `/<total>/<previous>` form.
//! The address of a node is the SHA-256 of that encoding.

use super::address::ContentAddress;
use crate::error::{FlowError, FlowResult};
use bincode::Options;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::io::{Read, Write};
use std::str::FromStr;

const LINK_SEPARATOR: char = '/';

/// Link annotation `/<total>/<previous>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkName {
    pub total: u64,
    pub previous: u64,
}

impl Display for LinkName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{sep}{}{sep}{}",
            self.total,
            self.previous,
            sep = LINK_SEPARATOR
        )
    }
}

impl FromStr for LinkName {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlowError::ChainIntegrity(format!("Invalid link name: {:?}", s));

        let rest = s.strip_prefix(LINK_SEPARATOR).ok_or_else(invalid)?;
        let (total, previous) = rest.split_once(LINK_SEPARATOR).ok_or_else(invalid)?;
        let total: u64 = total.parse().map_err(|_| invalid())?;
        let previous: u64 = previous.parse().map_err(|_| invalid())?;
        if previous == 0 || previous >= total {
            return Err(invalid());
        }
        Ok(Self { total, previous })
    }
}

impl Serialize for LinkName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LinkName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub target: ContentAddress,
    pub name: LinkName,
    /// Compressed size of the target's payload
    pub size: u64,
}

/// Immutable object-store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    /// Gzip-compressed block payload
    pub data: Bytes,
    pub links: Vec<ChainLink>,
}

fn bincode_opts() -> impl Options {
    bincode::DefaultOptions::new()
        .with_little_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

impl ChainNode {
    pub fn new(data: impl Into<Bytes>, previous: Option<ChainLink>) -> Self {
        Self {
            data: data.into(),
            links: previous.into_iter().collect(),
        }
    }

    /// The single backward link, if any.
    pub fn link(&self) -> FlowResult<Option<&ChainLink>> {
        match self.links.len() {
            0 => Ok(None),
            1 => Ok(self.links.first()),
            n => Err(FlowError::ChainIntegrity(format!(
                "Chain node has {} links, expected at most one",
                n
            ))),
        }
    }

    /// Sequence number encoded by the node's own link.
    pub fn sequence(&self) -> FlowResult<u64> {
        Ok(match self.link()? {
            Some(link) => link.name.previous + 1,
            None => 1,
        })
    }

    pub fn address(&self) -> FlowResult<ContentAddress> {
        Ok(ContentAddress::of(&self.encode()?))
    }

    pub fn encode(&self) -> FlowResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.data.len() + 128 * self.links.len() + 16);
        bincode_opts().serialize_into(&mut buf, self)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> FlowResult<Self> {
        Ok(bincode_opts().deserialize(bytes)?)
    }

    /// Decompressed payload.
    pub fn payload(&self) -> FlowResult<Vec<u8>> {
        decompress(&self.data)
            .map_err(|e| FlowError::ChainIntegrity(format!("Corrupt block payload: {}", e)))
    }
}

pub fn compress(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    Ok(raw)
}
