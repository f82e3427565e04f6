//! Response body decoding.
//!
//! Only gzip is requested (`Accept-Encoding: gzip`), so only gzip is decoded.
//! Any other `Content-Encoding` is passed through untouched.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::ApiError;

/// Decode `body` according to a response's `Content-Encoding` header.
pub fn decode_body(content_encoding: Option<&str>, body: Vec<u8>) -> Result<Vec<u8>, ApiError> {
    match content_encoding {
        Some(encoding) if encoding.trim().eq_ignore_ascii_case("gzip") => gunzip(&body),
        _ => Ok(body),
    }
}

fn gunzip(compressed: &[u8]) -> Result<Vec<u8>, ApiError> {
    let mut decoded = Vec::with_capacity(compressed.len() * 4);
    GzDecoder::new(compressed)
        .read_to_end(&mut decoded)
        .map_err(|e| ApiError::Transport(format!("gzip decoding failed: {e}")))?;
    Ok(decoded)
}
