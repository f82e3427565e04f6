//! Parsed response bodies.
//!
//! # Design
//! A response declaring a JSON content type is parsed strictly. Any other
//! declared content type is passed through as text. When no content type is
//! known (cached bodies, servers that omit the header) the body is sniffed:
//! a leading `{` or `[` after trimming means JSON, anything else is text.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The body was empty or whitespace.
    Empty,
    Json(Value),
    Text(String),
}

impl Payload {
    /// Parse `body` using `content_type` when present, sniffing otherwise.
    pub fn parse(body: &str, content_type: Option<&str>) -> Result<Self, ApiError> {
        if body.trim().is_empty() {
            return Ok(Payload::Empty);
        }
        match content_type {
            Some(ct) if is_json_content_type(ct) => parse_json(body),
            Some(_) => Ok(Payload::Text(body.to_string())),
            None => Self::sniff(body),
        }
    }

    /// Compatibility parsing by the first non-blank character.
    pub fn sniff(body: &str) -> Result<Self, ApiError> {
        let trimmed = body.trim();
        match trimmed.chars().next() {
            None => Ok(Payload::Empty),
            Some('{') | Some('[') => parse_json(trimmed),
            Some(_) => Ok(Payload::Text(body.to_string())),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Deserialize a JSON payload into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        match self {
            Payload::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|e| ApiError::Parse(e.to_string()))
            }
            Payload::Empty => Err(ApiError::Parse("empty body".to_string())),
            Payload::Text(_) => Err(ApiError::Parse("body is not JSON".to_string())),
        }
    }
}

fn parse_json(body: &str) -> Result<Payload, ApiError> {
    serde_json::from_str(body)
        .map(Payload::Json)
        .map_err(|e| ApiError::Parse(e.to_string()))
}

/// `application/json`, `application/problem+json` and friends, with or
/// without parameters such as `charset`.
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}
