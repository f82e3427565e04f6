//! Storage keys for cached responses.
//!
//! A key is the lowercase hex SHA-1 of the endpoint followed by every
//! parameter as `name=value&`, both sides form-urlencoded, in the order the
//! caller added them. Parameters are not sorted, so the same logical request
//! built in a different order maps to a different entry.

use std::fmt;

use sha1::{Digest, Sha1};
use url::form_urlencoded;

/// Hex-encoded SHA-1 digest identifying one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(endpoint: &str, params: &[(String, String)]) -> Self {
        Self::digest(&canonical_query(endpoint, params))
    }

    fn digest(canonical: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(canonical.as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The string that gets hashed. The trailing `&` is part of it.
pub fn canonical_query(endpoint: &str, params: &[(String, String)]) -> String {
    let mut query = endpoint.to_string();
    for (name, value) in params {
        query.extend(form_urlencoded::byte_serialize(name.as_bytes()));
        query.push('=');
        query.extend(form_urlencoded::byte_serialize(value.as_bytes()));
        query.push('&');
    }
    query
}
