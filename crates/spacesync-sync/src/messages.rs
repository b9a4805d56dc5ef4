//! Sync protocol message types.
//!
//! These messages are exchanged between peers for head sync and the object
//! change stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use spacesync_core::{decode, encode, Blake3Hash, CoreError, ObjectEntry, ObjectId, Range, SpaceId};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// Message size limits.
pub mod limits {
    /// Max ranges in HeadSyncRequest.ranges.
    pub const MAX_RANGES_PER_REQUEST: usize = 1024;
    /// Max bytes in a single object stream payload.
    pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;
}

/// One range the requester wants compared, with its own hash for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    /// The key span `[from, to)`.
    pub range: Range,
    /// The requester's hash over the span.
    pub hash: Blake3Hash,
    /// List the responder's objects in the span on mismatch regardless of size.
    pub elements: bool,
}

impl RangeRequest {
    /// Compare a range by hash.
    pub fn new(range: Range, hash: Blake3Hash) -> Self {
        Self {
            range,
            hash,
            elements: false,
        }
    }

    /// Ask for the responder's objects in a range.
    pub fn with_elements(range: Range, hash: Blake3Hash) -> Self {
        Self {
            range,
            hash,
            elements: true,
        }
    }
}

/// The responder's view of one requested range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeResult {
    /// The key span this result covers.
    pub range: Range,
    /// The responder's hash over the span.
    pub hash: Blake3Hash,
    /// Objects in the span, present only at the subdivision floor.
    pub elements: Option<Vec<ObjectEntry>>,
    /// Results for sub-ranges, in key order.
    pub sub_results: Vec<RangeResult>,
}

impl RangeResult {
    /// A result carrying only a hash.
    pub fn hash_only(range: Range, hash: Blake3Hash) -> Self {
        Self {
            range,
            hash,
            elements: None,
            sub_results: Vec::new(),
        }
    }

    /// Whether this result has neither elements nor sub-results.
    pub fn is_hash_only(&self) -> bool {
        self.elements.is_none() && self.sub_results.is_empty()
    }
}

/// HeadSync RPC request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSyncRequest {
    /// Target space.
    pub space_id: SpaceId,
    /// Ranges to compare, answered in order.
    pub ranges: Vec<RangeRequest>,
}

impl HeadSyncRequest {
    /// A single whole-space comparison.
    pub fn whole_space(space_id: SpaceId, hash: Blake3Hash) -> Self {
        Self {
            space_id,
            ranges: vec![RangeRequest::new(Range::WHOLE, hash)],
        }
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        if self.ranges.len() > limits::MAX_RANGES_PER_REQUEST {
            return Err("too many ranges");
        }
        Ok(())
    }
}

/// HeadSync RPC response: one result per requested range, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSyncResponse {
    pub results: Vec<RangeResult>,
}

/// A frame on the object sync stream.
///
/// The first client frame names the space; every frame carries an opaque
/// change payload, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSyncMessage {
    pub space_id: SpaceId,
    pub payload: Bytes,
}

impl ObjectSyncMessage {
    pub fn new(space_id: SpaceId, payload: impl Into<Bytes>) -> Self {
        Self {
            space_id,
            payload: payload.into(),
        }
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        if self.payload.len() > limits::MAX_PAYLOAD_BYTES {
            return Err("payload too large");
        }
        Ok(())
    }
}

/// An object change carried in stream payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChange {
    /// The changed object.
    pub object_id: ObjectId,
    /// Hash of the object's heads after the change.
    pub hash: Blake3Hash,
    /// Opaque change data.
    pub data: Bytes,
}

impl ObjectChange {
    pub fn new(object_id: impl Into<ObjectId>, hash: Blake3Hash, data: impl Into<Bytes>) -> Self {
        Self {
            object_id: object_id.into(),
            hash,
            data: data.into(),
        }
    }

    /// The index entry this change produces.
    pub fn entry(&self) -> ObjectEntry {
        ObjectEntry::new(self.object_id.clone(), self.hash)
    }

    /// Encode as a CBOR stream payload.
    pub fn to_payload(&self) -> Result<Bytes, CoreError> {
        encode(self).map(Bytes::from)
    }

    /// Decode from a CBOR stream payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, CoreError> {
        decode(payload)
    }
}

/// Error codes that cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum SyncErrorCode {
    /// Space not known to the responder.
    SpaceMissing = 1,
    /// Any other failure; details stay with the responder.
    Unexpected = 2,
    /// A stream is already active for this (peer, space) pair.
    StreamConflict = 3,
}
