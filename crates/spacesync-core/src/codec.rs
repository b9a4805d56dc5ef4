//! CBOR encoding for wire payloads and stored records.
//!
//! Everything that crosses a process or storage boundary is encoded with
//! ciborium so that peers agree on the byte layout.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

/// Encode a value to CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}
