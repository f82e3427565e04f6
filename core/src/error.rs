//! Error types for the REST client, its cache store and its configuration.
//!
//! # Design
//! `ApiError` is what a caller sees for a single request: a non-2xx status
//! keeps the numeric code and raw body, transport failures keep only the
//! underlying message, and a body that claims to be JSON but is not lands in
//! `Parse`. It is `Clone` so the same value can be carried through delivery
//! channels. Cache and configuration failures get their own enums because
//! they never reach a request's outcome.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache_key::CacheKey;

/// Errors surfaced as the outcome of a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server answered with a status outside `[200, 300)`.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced an HTTP response, or the response could
    /// not be read or decompressed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The body was selected for JSON parsing but is not valid JSON.
    #[error("malformed response body: {0}")]
    Parse(String),
}

impl ApiError {
    /// HTTP status code, when the error came from a status-code response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors returned by `CacheStore` implementations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cache entry for key {0}")]
    NotFound(CacheKey),

    #[error("cache directory {0} is not usable")]
    InvalidDirectory(PathBuf),

    #[error("no cache directory configured, set cache_dir or app_name")]
    NoDirectory,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading a `ClientConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}
