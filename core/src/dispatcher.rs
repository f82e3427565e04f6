//! Request dispatch and outcome classification.
//!
//! # Design
//! `Dispatcher::dispatch` moves the blocking `Transport` call onto a
//! `spawn_blocking` worker and awaits it, so the coordinating task never
//! blocks on I/O. Whatever comes back goes through `classify`, which decodes
//! the body and sorts the response into success or a status-code error.
//! Parsing the body into a `Payload` is left to the caller, which needs the
//! raw text as well to populate the cache.
//!
//! A successful body declared as JSON must be valid UTF-8. Any other body has
//! invalid sequences replaced with U+FFFD.

use std::sync::Arc;

use tracing::debug;

use crate::compression::decode_body;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::payload::{is_json_content_type, Payload};
use crate::transport::Transport;

/// A decoded 2xx response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub text: String,
    pub content_type: Option<String>,
}

impl ResponseBody {
    pub fn payload(&self) -> Result<Payload, ApiError> {
        Payload::parse(&self.text, self.content_type.as_deref())
    }
}

/// Decode `response` and classify it by status.
pub fn classify(response: HttpResponse) -> Result<ResponseBody, ApiError> {
    let status = response.status;
    let content_type = response.header("content-type").map(str::to_string);
    let encoding = response.header("content-encoding").map(str::to_string);
    let decoded = decode_body(encoding.as_deref(), response.body)?;
    let success = (200..300).contains(&status);
    let text = match String::from_utf8(decoded) {
        Ok(text) => text,
        Err(e) if success && content_type.as_deref().is_some_and(is_json_content_type) => {
            return Err(ApiError::Parse(format!(
                "JSON body is not valid UTF-8: {}",
                e.utf8_error()
            )));
        }
        Err(e) => {
            debug!(status, error = %e.utf8_error(), "replacing invalid UTF-8 in response body");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    if success {
        Ok(ResponseBody { text, content_type })
    } else {
        Err(ApiError::Status { status, body: text })
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn dispatch(&self, request: HttpRequest) -> Result<ResponseBody, ApiError> {
        let transport = Arc::clone(&self.transport);
        debug!(method = %request.method, url = %request.url, "dispatching request");

        let response = tokio::task::spawn_blocking(move || transport.execute(&request))
            .await
            .map_err(|e| ApiError::Transport(format!("request worker failed: {e}")))??;

        debug!(status = response.status, "response received");
        classify(response)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::http::HttpMethod;

    fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn two_hundreds_are_success() {
        let body = classify(response(201, &[("Content-Type", "application/json")], b"{}")).unwrap();
        assert_eq!(body.text, "{}");
        assert_eq!(body.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn other_statuses_keep_code_and_body() {
        let err = classify(response(404, &[], b"no such item")).unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 404,
                body: "no such item".to_string(),
            }
        );
        assert!(matches!(
            classify(response(302, &[], b"")),
            Err(ApiError::Status { status: 302, .. })
        ));
    }

    #[test]
    fn gzip_body_classifies_like_plain_body() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"id":42}"#).unwrap();
        let gz = encoder.finish().unwrap();

        let compressed = classify(response(200, &[("Content-Encoding", "gzip")], &gz)).unwrap();
        let plain = classify(response(200, &[], br#"{"id":42}"#)).unwrap();
        assert_eq!(compressed.payload().unwrap(), plain.payload().unwrap());
    }

    #[test]
    fn gzip_error_bodies_are_decoded_too() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"maintenance").unwrap();
        let gz = encoder.finish().unwrap();

        let err = classify(response(503, &[("content-encoding", "gzip")], &gz)).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
    }

    #[test]
    fn invalid_utf8_in_json_body_is_a_parse_error() {
        let body = b"{\"name\":\"caf\xe9\"}";
        let err =
            classify(response(200, &[("Content-Type", "application/json")], body)).unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn invalid_utf8_in_text_body_is_replaced() {
        let body = classify(response(200, &[("Content-Type", "text/plain")], b"caf\xe9")).unwrap();
        assert_eq!(body.text, "caf\u{FFFD}");

        let err =
            classify(response(500, &[("Content-Type", "application/json")], b"\xff")).unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 500,
                body: "\u{FFFD}".to_string(),
            }
        );
    }

    struct Failing;

    impl Transport for Failing {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            Err(ApiError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn transport_failures_surface_unchanged() {
        let dispatcher = Dispatcher::new(Arc::new(Failing));
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "http://127.0.0.1:1/".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = dispatcher.dispatch(request).await.unwrap_err();
        assert_eq!(err, ApiError::Transport("connection refused".to_string()));
    }
}
