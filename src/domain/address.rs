use crate::error::FlowError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

type Hash32 = [u8; 32];

/// Content address: SHA-256 digest of an object's canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(Hash32);

impl ContentAddress {
    pub fn new(bytes: Hash32) -> Self {
        Self(bytes)
    }

    /// Address of `data`.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for ContentAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.to_hex())
    }
}

impl FromStr for ContentAddress {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(FlowError::ChainIntegrity(format!(
                "Invalid content address length: {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s)
            .map_err(|e| FlowError::ChainIntegrity(format!("Invalid content address: {}", e)))?;
        let mut hash = Hash32::default();
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic() {
        assert_eq!(ContentAddress::of(b"block"), ContentAddress::of(b"block"));
        assert_ne!(ContentAddress::of(b"block"), ContentAddress::of(b"other"));
    }

    #[test]
    fn test_hex_round_trip_and_json_form() {
        let address = ContentAddress::of(b"hello");
        let parsed: ContentAddress = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);

        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
    }

    #[test]
    fn test_rejects_bad_strings() {
        assert!("abc".parse::<ContentAddress>().is_err());
        assert!("zz".repeat(32).parse::<ContentAddress>().is_err());
    }
}
