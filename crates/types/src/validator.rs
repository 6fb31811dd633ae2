//! Validator updates and their engine wire representation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compressed BLS12-381 public key (48 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlsPublicKey(pub [u8; 48]);

impl BlsPublicKey {
    /// Parse from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, PublicKeyError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| PublicKeyError::InvalidHex(e.to_string()))?;
        let arr: [u8; 48] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| PublicKeyError::InvalidLength(v.len()))?;
        Ok(BlsPublicKey(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 48] {
        &self.0
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({}..)", &hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for BlsPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlsPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlsPublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Error parsing a public key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublicKeyError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected 48 bytes, got {0}")]
    InvalidLength(usize),
}

/// A change to a validator's voting power, produced by block execution.
///
/// `power == 0` removes the validator from the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pubkey: BlsPublicKey,
    pub power: i64,
}

/// The consensus engine's wire representation of a validator update.
///
/// Serialization onto the engine connection is the transport adapter's
/// concern; this is plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireValidatorUpdate {
    /// Key scheme identifier understood by the engine.
    pub key_type: &'static str,
    /// Raw public key bytes.
    pub pubkey: Vec<u8>,
    /// New voting power.
    pub power: i64,
}

/// Key scheme identifier for BLS12-381 keys on the engine wire.
pub const WIRE_KEY_TYPE_BLS: &str = "bls12_381";

/// Convert internal validator updates into the engine's wire representation.
///
/// This is the single place that knows the wire key-type tag.
pub fn to_wire_updates(updates: &[ValidatorUpdate]) -> Vec<WireValidatorUpdate> {
    updates
        .iter()
        .map(|u| WireValidatorUpdate {
            key_type: WIRE_KEY_TYPE_BLS,
            pubkey: u.pubkey.as_bytes().to_vec(),
            power: u.power,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_hex_round_trip() {
        let pk = BlsPublicKey([0xab; 48]);
        let parsed = BlsPublicKey::from_hex(&pk.to_string()).unwrap();
        assert_eq!(parsed, pk);
    }

    #[test]
    fn test_pubkey_rejects_wrong_length() {
        assert!(matches!(
            BlsPublicKey::from_hex("abcd"),
            Err(PublicKeyError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_wire_conversion_preserves_order_and_power() {
        let updates = vec![
            ValidatorUpdate {
                pubkey: BlsPublicKey([1; 48]),
                power: 32,
            },
            ValidatorUpdate {
                pubkey: BlsPublicKey([2; 48]),
                power: 0,
            },
        ];

        let wire = to_wire_updates(&updates);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].key_type, WIRE_KEY_TYPE_BLS);
        assert_eq!(wire[0].pubkey, vec![1u8; 48]);
        assert_eq!(wire[0].power, 32);
        assert_eq!(wire[1].power, 0);
    }
}
