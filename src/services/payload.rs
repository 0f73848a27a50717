//! Base64 file payloads carried inside NATS requests

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("File content is empty")]
    Empty,

    #[error("File is too large ({size} bytes, maximum is {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("File content is not valid base64: {0}")]
    InvalidBase64(String),
}

/// Decode a base64 file, refusing anything over `max_bytes`.
///
/// A `data:<mime>;base64,` prefix is accepted. The size is estimated from the
/// encoded length before decoding so oversized uploads are never materialized.
pub fn decode_file(encoded: &str, max_bytes: usize) -> Result<Vec<u8>, PayloadError> {
    let encoded = encoded.trim();
    let encoded = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    if encoded.is_empty() {
        return Err(PayloadError::Empty);
    }

    let estimated = encoded.len() / 4 * 3;
    if estimated > max_bytes.saturating_add(3) {
        return Err(PayloadError::TooLarge {
            size: estimated,
            max: max_bytes,
        });
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| PayloadError::InvalidBase64(e.to_string()))?;

    if bytes.is_empty() {
        return Err(PayloadError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(PayloadError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    Ok(bytes)
}
