//! Strong type definitions for space sync identifiers.
//!
//! Each identifier gets its own type so a peer can never be passed where a space is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a space. Immutable once assigned.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    /// Create a space id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpaceId({})", self.0)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpaceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SpaceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for SpaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A 32-byte peer identity, as established by the authenticated transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random peer id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Inverse of [`Self::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_id_display() {
        let id = SpaceId::from("S1");
        assert_eq!(id.to_string(), "S1");
        assert_eq!(format!("{:?}", id), "SpaceId(S1)");
    }

    #[test]
    fn test_space_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SpaceId::from("space.a")).unwrap();
        assert_eq!(json, "\"space.a\"");
    }

    #[test]
    fn test_peer_id_hex_roundtrip() {
        let peer = PeerId::from_bytes([0x42; 32]);
        assert_eq!(PeerId::from_hex(&peer.to_hex()).unwrap(), peer);
    }

    #[test]
    fn test_peer_id_display() {
        let peer = PeerId::from_bytes([0xab; 32]);
        assert_eq!(peer.to_string(), "abababababababab");
    }

    #[test]
    fn test_random_peers_differ() {
        assert_ne!(PeerId::random(), PeerId::random());
    }
}
