//! Stateful, callback-driven facade over `RestClient`.
//!
//! # Design
//! `RestApi` accumulates per-call state (parameters, cache policy, callbacks,
//! loading message) and hands it to the client when a method is invoked,
//! then resets it so the next call starts clean. Deliveries are pumped into
//! the registered callbacks by a spawned task. A missing error callback
//! degrades to a `warn!` log line.
//!
//! Each call gets its own `Call` handle. The facade also remembers the most
//! recent call so `cancel_request` can stop it; starting a new call does not
//! cancel the previous one.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::RestClient;
use crate::error::{ApiError, CacheError};
use crate::handle::{RequestHandle, RequestId};
use crate::http::HttpMethod;
use crate::payload::Payload;
use crate::policy::CachePolicy;
use crate::request::{ContentType, Request};

pub type SuccessCallback = Arc<dyn Fn(Payload) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(ApiError) + Send + Sync>;

const DEFAULT_LOADING_MESSAGE: &str = "Loading...";

pub struct RestApi {
    client: RestClient,
    base_url: String,
    url_suffix: String,
    parameters: Vec<(String, String)>,
    cache_policy: CachePolicy,
    content_type: Option<ContentType>,
    loading_message: Option<String>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    last_call: Option<CancellationToken>,
}

impl RestApi {
    pub fn new(client: RestClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            url_suffix: String::new(),
            parameters: Vec::new(),
            cache_policy: CachePolicy::default(),
            content_type: None,
            loading_message: Some(DEFAULT_LOADING_MESSAGE.to_string()),
            on_success: None,
            on_error: None,
            last_call: None,
        }
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    /// Appended to every endpoint, e.g. `.json`.
    pub fn set_url_suffix(&mut self, suffix: impl Into<String>) -> &mut Self {
        self.url_suffix = suffix.into();
        self
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.parameters.push((name.into(), value.to_string()));
        self
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub fn set_cache_policy(&mut self, policy: CachePolicy) -> &mut Self {
        self.cache_policy = policy;
        self
    }

    pub fn set_content_type(&mut self, content_type: ContentType) -> &mut Self {
        self.content_type = Some(content_type);
        self
    }

    /// Kept for presentation layers; the facade itself shows nothing.
    pub fn set_loading_message(&mut self, message: Option<String>) -> &mut Self {
        self.loading_message = message;
        self
    }

    pub fn loading_message(&self) -> Option<&str> {
        self.loading_message.as_deref()
    }

    pub fn set_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn set_error_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(ApiError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Full endpoint for `part`: base URL, part, suffix.
    pub fn endpoint(&self, part: &str) -> String {
        format!("{}{}{}", self.base_url, part, self.url_suffix)
    }

    pub fn get(&mut self, part: &str) -> Call {
        self.call(HttpMethod::Get, part)
    }

    pub fn post(&mut self, part: &str) -> Call {
        self.call(HttpMethod::Post, part)
    }

    pub fn put(&mut self, part: &str) -> Call {
        self.call(HttpMethod::Put, part)
    }

    pub fn delete(&mut self, part: &str) -> Call {
        self.call(HttpMethod::Delete, part)
    }

    /// Cancel the most recently started call, if any.
    pub fn cancel_request(&mut self) {
        if let Some(token) = self.last_call.take() {
            token.cancel();
        }
    }

    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.client.clear_cache()
    }

    /// Drop accumulated per-call state.
    pub fn reset(&mut self) {
        self.parameters.clear();
        self.cache_policy = CachePolicy::default();
        self.content_type = None;
        self.loading_message = Some(DEFAULT_LOADING_MESSAGE.to_string());
        self.on_success = None;
        self.on_error = None;
    }

    fn call(&mut self, method: HttpMethod, part: &str) -> Call {
        let mut request =
            Request::new(method, self.endpoint(part)).params(std::mem::take(&mut self.parameters));
        if let Some(content_type) = self.content_type {
            request = request.content_type(content_type);
        }
        let handle = self.client.execute(request, self.cache_policy);
        let callbacks = Callbacks {
            on_success: self.on_success.take(),
            on_error: self.on_error.take(),
        };
        self.reset();

        let id = handle.id();
        let cancel = handle.cancellation_token();
        self.last_call = Some(cancel.clone());
        let pump = tokio::spawn(callbacks.pump(handle));
        Call { id, cancel, pump }
    }
}

struct Callbacks {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl Callbacks {
    async fn pump(self, mut handle: RequestHandle) -> usize {
        let id = handle.id();
        let mut delivered = 0;
        while let Some(delivery) = handle.recv().await {
            delivered += 1;
            match delivery.outcome {
                Ok(payload) => match &self.on_success {
                    Some(callback) => callback(payload),
                    None => debug!(request_id = %id, "no success callback registered"),
                },
                Err(error) => match &self.on_error {
                    Some(callback) => callback(error),
                    None => warn!(request_id = %id, %error, "request failed"),
                },
            }
        }
        delivered
    }
}

/// A call started through `RestApi`.
#[derive(Debug)]
pub struct Call {
    id: RequestId,
    cancel: CancellationToken,
    pump: JoinHandle<usize>,
}

impl Call {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until every callback has run; returns how many outcomes were
    /// delivered.
    pub async fn finished(self) -> usize {
        self.pump.await.unwrap_or_else(|e| {
            warn!(request_id = %self.id, error = %e, "callback task failed");
            0
        })
    }
}
