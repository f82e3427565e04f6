//! Blocking HTTP execution.
//!
//! # Design
//! `Transport` is the single seam between the client and the network: it
//! takes a fully built `HttpRequest` and returns whatever the server sent,
//! status and raw (possibly compressed) body included. It never interprets
//! status codes; that is `dispatcher::classify`'s job. Implementations are
//! blocking and are driven from a `spawn_blocking` worker.

use ureq::tls::TlsConfig;
use ureq::{Agent, RequestBuilder};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one request and returns the raw response.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// `ureq`-backed transport.
///
/// Status codes are returned as data rather than errors, and gzip handling
/// is left to `compression::decode_body` so the body arrives exactly as
/// sent. Bodies are read in full; ureq's default 10 MB cap is lifted.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let mut builder = Agent::config_builder().http_status_as_error(false);
        if config.accept_invalid_certs {
            builder = builder.tls_config(TlsConfig::builder().disable_verification(true).build());
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.timeout_connect(Some(timeout));
        }
        if let Some(timeout) = config.read_timeout() {
            builder = builder
                .timeout_recv_response(Some(timeout))
                .timeout_recv_body(Some(timeout));
        }
        Self {
            agent: builder.build().new_agent(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.as_str();
        let body = request.body.as_deref().unwrap_or_default().as_bytes();

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(url), &request.headers).send(body),
            HttpMethod::Put => with_headers(self.agent.put(url), &request.headers).send(body),
        };
        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
