//! Space descriptors: the complete transferable representation of a space.
//!
//! A descriptor is created once at space genesis and moved verbatim on pull
//! and push. It is never partially updated.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::hash::Blake3Hash;
use crate::types::SpaceId;

/// Immutable origin metadata of a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceHeader {
    /// The space this header names.
    pub space_id: SpaceId,
    /// Application-defined space type.
    pub space_type: String,
    /// Creation time (Unix ms).
    pub created_at: i64,
    /// Opaque creator-supplied bytes (identity, seed, signature...).
    pub origin: Bytes,
}

/// Header plus the ACL and settings payloads of a space.
///
/// The payloads are opaque to the sync layer; only their ids are inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceDescriptor {
    pub header: SpaceHeader,
    pub acl_payload: Bytes,
    pub acl_payload_id: String,
    pub settings_payload: Bytes,
    pub settings_payload_id: String,
}

impl SpaceDescriptor {
    /// Build a descriptor, deriving payload ids from payload content.
    pub fn new(header: SpaceHeader, acl_payload: Bytes, settings_payload: Bytes) -> Self {
        let acl_payload_id = payload_id(&acl_payload);
        let settings_payload_id = payload_id(&settings_payload);
        Self {
            header,
            acl_payload,
            acl_payload_id,
            settings_payload,
            settings_payload_id,
        }
    }

    /// Id of the described space.
    pub fn space_id(&self) -> &SpaceId {
        &self.header.space_id
    }
}

/// Content-derived id for an opaque payload: hex Blake3 of the bytes.
pub fn payload_id(payload: &[u8]) -> String {
    Blake3Hash::hash(payload).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: &str) -> SpaceHeader {
        SpaceHeader {
            space_id: SpaceId::from(id),
            space_type: "notes".into(),
            created_at: 1_700_000_000_000,
            origin: Bytes::from_static(b"creator"),
        }
    }

    #[test]
    fn test_payload_ids_are_content_derived() {
        let a = SpaceDescriptor::new(header("s"), Bytes::from_static(b"acl"), Bytes::new());
        let b = SpaceDescriptor::new(header("s"), Bytes::from_static(b"acl"), Bytes::new());
        assert_eq!(a.acl_payload_id, b.acl_payload_id);
        assert_ne!(a.acl_payload_id, a.settings_payload_id);
    }

    #[test]
    fn test_space_id_comes_from_header() {
        let d = SpaceDescriptor::new(header("space-x"), Bytes::new(), Bytes::new());
        assert_eq!(d.space_id().as_str(), "space-x");
    }
}
