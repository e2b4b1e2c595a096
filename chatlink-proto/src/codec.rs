//! JSON encoding of wire frames and events.
//!
//! The server speaks newline-free JSON text frames, one object per
//! WebSocket message, discriminated by a `type` field.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors produced while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload was not valid JSON or did not match any known shape.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    /// A value could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encodes a value as a JSON text payload.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(CodecError::Encode)
}

/// Decodes a JSON text payload into a typed value.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the payload is malformed or does
/// not match the expected shape.
pub fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, CodecError> {
    serde_json::from_str(payload).map_err(CodecError::Decode)
}
