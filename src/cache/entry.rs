//! Wire envelope for values kept in a shared Redis.
//!
//! Bodies are stored as a JSON string holding the base64 of the raw bytes, the
//! format already used by other service instances writing the same keys.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;

use super::store::StoreError;

pub fn encode(body: &[u8]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&STANDARD.encode(body))
        .map_err(|err| StoreError::serialization(err.to_string()))
}

pub fn decode(raw: &[u8]) -> Result<Bytes, StoreError> {
    let text: String = serde_json::from_slice(raw)
        .map_err(|err| StoreError::serialization(format!("not a JSON string: {err}")))?;
    STANDARD
        .decode(text.as_bytes())
        .map(Bytes::from)
        .map_err(|err| StoreError::serialization(format!("invalid base64 payload: {err}")))
}
