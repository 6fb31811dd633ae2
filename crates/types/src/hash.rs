//! Content-addressed 32-byte hash.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte hash value.
///
/// Used for block hashes, application state roots, and storage keys.
/// Content hashing uses BLAKE3; values received from collaborators
/// (execution headers, engine block hashes) are carried verbatim.
///
/// Serializes as a hex string so genesis documents stay human-readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", self.to_hex()))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes with BLAKE3.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Hash(*blake3::hash(bytes).as_bytes())
    }

    /// Wrap raw hash bytes without hashing.
    ///
    /// Truncates or zero-pads to 32 bytes if the input length differs.
    pub fn from_hash_bytes(bytes: &[u8]) -> Self {
        let mut out = [0u8; 32];
        let n = bytes.len().min(32);
        out[..n].copy_from_slice(&bytes[..n]);
        Hash(out)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        *self == Hash::ZERO
    }

    /// Lowercase hex without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Error parsing a hash from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for Hash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HexError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(HexError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::ZERO
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Abbreviated form keeps log lines readable.
        write!(f, "Hash({}..)", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_deterministic() {
        assert_eq!(Hash::from_bytes(b"abc"), Hash::from_bytes(b"abc"));
        assert_ne!(Hash::from_bytes(b"abc"), Hash::from_bytes(b"abd"));
    }

    #[test]
    fn test_from_hash_bytes_is_verbatim() {
        let h = Hash::from_hash_bytes(&[7u8; 32]);
        assert_eq!(h.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_hex_round_trip() {
        let h = Hash::from_bytes(b"round trip");
        let parsed: Hash = h.to_hex().parse().unwrap();
        assert_eq!(parsed, h);

        let prefixed: Hash = format!("0x{}", h.to_hex()).parse().unwrap();
        assert_eq!(prefixed, h);
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(matches!(
            "zz".parse::<Hash>(),
            Err(HexError::InvalidHex(_))
        ));
        assert!(matches!(
            "abcd".parse::<Hash>(),
            Err(HexError::InvalidLength(2))
        ));
    }
}
