//! BLAKE3 content hashes identifying stored objects

use crate::error::StoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// A BLAKE3 digest (32 bytes) naming an object in the store
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ObjectHash([u8; 32]);

impl ObjectHash {
    /// Length of the hex form
    pub const HEX_LEN: usize = 64;

    /// Create a hash from raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, StoreError> {
        if hex_str.len() != Self::HEX_LEN {
            return Err(StoreError::InvalidHash(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                hex_str.len()
            )));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| StoreError::InvalidHash(format!("{}: {}", hex_str, e)))?;
        Ok(Self(bytes))
    }

    /// Split the hex form into `(shard, rest)` for the fan-out layout
    pub fn shard_parts(&self) -> (String, String) {
        let hex = self.to_hex();
        let (prefix, rest) = hex.split_at(2);
        (prefix.to_string(), rest.to_string())
    }
}

impl std::fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHash({})", self.to_hex())
    }
}

impl std::fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectHash {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Serialized as hex so records stay readable in JSON and stable in bincode.
impl Serialize for ObjectHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Hash bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> ObjectHash {
    ObjectHash::from_bytes(*blake3::hash(data).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let data = b"hello world";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[test]
    fn test_hex_encoding_roundtrip() {
        let original = ObjectHash::from_bytes([42; 32]);
        let decoded = ObjectHash::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_hex_is_lowercase() {
        let hash = hash_bytes(b"Hello");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_hex_decoding_invalid_length() {
        assert!(ObjectHash::from_hex("abc").is_err());
        assert!(ObjectHash::from_hex("").is_err());
        assert!(ObjectHash::from_hex(&"a".repeat(63)).is_err());
    }

    #[test]
    fn test_hex_decoding_invalid_chars() {
        let err = ObjectHash::from_hex(&"g".repeat(64)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidHash(_)));
    }

    #[test]
    fn test_shard_parts() {
        let hash = hash_bytes(b"shard me");
        let (prefix, rest) = hash.shard_parts();
        assert_eq!(prefix.len(), 2);
        assert_eq!(rest.len(), 62);
        assert_eq!(format!("{}{}", prefix, rest), hash.to_hex());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = hash_bytes(b"serde");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));

        let parsed: ObjectHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_different_data_different_hash() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }
}
