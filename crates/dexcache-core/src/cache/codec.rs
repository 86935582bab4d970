//! Byte-safe transport for cache blobs.
//!
//! JSON text is base64-encoded before it reaches the storage primitive so
//! multi-byte names survive any backend unchanged. Blobs written before the
//! encoding was introduced are plain JSON and are still accepted on read.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::store::CacheError;

pub fn encode_blob(json: &str) -> String {
    STANDARD.encode(json.as_bytes())
}

pub fn decode_blob(raw: &str) -> Result<String, CacheError> {
    let trimmed = raw.trim();
    match STANDARD.decode(trimmed) {
        Ok(bytes) => String::from_utf8(bytes)
            .map_err(|e| CacheError::Decode(format!("blob is not UTF-8: {}", e))),
        // '{' is outside the base64 alphabet, so legacy JSON always lands here
        Err(_) if trimmed.starts_with('{') => Ok(trimmed.to_string()),
        Err(e) => Err(CacheError::Decode(e.to_string())),
    }
}
