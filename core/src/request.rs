//! Request description and its translation into an `HttpRequest`.
//!
//! # Design
//! A `Request` is what a caller asks for: a method, an endpoint and an
//! ordered parameter list. Where those parameters go depends on the method:
//! GET and DELETE append them to the query string, POST and PUT encode them
//! as a form or JSON body. The translation is pure so it can be checked
//! against fixed vectors.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::cache_key::CacheKey;
use crate::config::ClientConfig;
use crate::http::{HttpMethod, HttpRequest};

/// Encoding of POST/PUT bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Form,
    Json,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Form => "application/x-www-form-urlencoded",
            ContentType::Json => "application/json",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContentType(pub String);

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "form" | "application/x-www-form-urlencoded" => Ok(ContentType::Form),
            "json" | "application/json" => Ok(ContentType::Json),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// One REST call: method, endpoint and ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: HttpMethod,
    endpoint: String,
    params: Vec<(String, String)>,
    content_type: Option<ContentType>,
}

impl Request {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Vec::new(),
            content_type: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    /// Append a parameter. Order is preserved and duplicates are kept.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Override the configured body encoding for this request.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_request(&self.endpoint, &self.params)
    }

    /// Build the wire request against `config`.
    pub fn to_http(&self, config: &ClientConfig) -> HttpRequest {
        let mut url = self.resolve_url(config);
        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Accept-Encoding".to_string(), "gzip".to_string()),
        ];
        let mut body = None;

        if self.method.has_body() {
            let content_type = self.content_type.unwrap_or(config.content_type);
            headers.push(("Content-Type".to_string(), content_type.mime().to_string()));
            body = Some(encode_body(&self.params, content_type));
        } else if !self.params.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&encode_form(&self.params));
        }

        if let Some(credentials) = &config.credentials {
            let token = STANDARD.encode(format!(
                "{}:{}",
                credentials.username, credentials.password
            ));
            headers.push(("Authorization".to_string(), format!("Basic {token}")));
        }
        if let Some(agent) = &config.user_agent {
            headers.push(("User-Agent".to_string(), agent.clone()));
        }

        HttpRequest {
            method: self.method,
            url,
            headers,
            body,
        }
    }

    fn resolve_url(&self, config: &ClientConfig) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        if self.endpoint.starts_with('/') {
            format!("{}{}", config.origin(), self.endpoint)
        } else {
            format!("{}/{}", config.origin(), self.endpoint)
        }
    }
}

fn encode_form(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// JSON bodies are a flat object of string values; a repeated name keeps the
/// last value.
fn encode_body(params: &[(String, String)], content_type: ContentType) -> String {
    match content_type {
        ContentType::Form => encode_form(params),
        ContentType::Json => {
            let object: serde_json::Map<String, serde_json::Value> = params
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            serde_json::Value::Object(object).to_string()
        }
    }
}
