//! Policy-driven REST client.
//!
//! # Design
//! `RestClient` decides, per call, whether the cache or the network answers
//! and whether a fresh response is written back. Cache lookups happen
//! synchronously inside `execute`, so a cached outcome is already queued on
//! the handle when it is returned. The network leg runs as a spawned task
//! that races the dispatch against the call's cancellation token.
//!
//! Only GET requests touch the cache. Every other method is dispatched as if
//! the policy were `IgnoreCache`.
//!
//! `execute` spawns onto the ambient tokio runtime and must be called from
//! within one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache_key::CacheKey;
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, ResponseBody};
use crate::error::{ApiError, CacheError};
use crate::handle::{Delivery, RequestHandle, RequestId, Source};
use crate::http::{HttpMethod, HttpRequest};
use crate::payload::Payload;
use crate::policy::CachePolicy;
use crate::request::Request;
use crate::store::{CacheStore, FileCacheStore};
use crate::transport::{Transport, UreqTransport};

#[derive(Clone)]
pub struct RestClient {
    config: Arc<ClientConfig>,
    store: Arc<dyn CacheStore>,
    dispatcher: Dispatcher,
}

impl RestClient {
    /// Client with a `FileCacheStore` in the configured cache directory and a
    /// `ureq` transport. Fails when neither `cache_dir` nor `app_name` is set.
    pub fn new(config: ClientConfig) -> Result<Self, CacheError> {
        let dir = config
            .resolved_cache_dir()
            .ok_or(CacheError::NoDirectory)?;
        let store = FileCacheStore::open(dir)?;
        let transport = UreqTransport::new(&config);
        Ok(Self::with_parts(config, Arc::new(store), Arc::new(transport)))
    }

    pub fn with_parts(
        config: ClientConfig,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            dispatcher: Dispatcher::new(transport),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn build_request(&self, request: &Request) -> HttpRequest {
        request.to_http(&self.config)
    }

    /// Remove every cached response.
    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.store.clear()
    }

    /// Start a call under `policy` and return its handle.
    pub fn execute(&self, request: Request, policy: CachePolicy) -> RequestHandle {
        let id = RequestId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let cacheable = request.method() == HttpMethod::Get;
        let policy = if cacheable {
            policy
        } else {
            CachePolicy::IgnoreCache
        };
        let key = cacheable.then(|| request.cache_key());
        debug!(request_id = %id, method = %request.method(), endpoint = request.endpoint(), ?policy, "executing request");

        if let (true, Some(key)) = (policy.reads_cache(), key.as_ref()) {
            if let Some(payload) = self.cached_payload(id, key) {
                debug!(request_id = %id, %key, "serving cached response");
                let _ = tx.send(Delivery {
                    source: Source::Cache,
                    outcome: Ok(payload),
                });
                if !policy.continues_after_hit() {
                    return RequestHandle::new(id, rx, cancel);
                }
            }
        }

        let http = self.build_request(&request);
        let network = NetworkLeg {
            id,
            policy,
            key: key.filter(|_| policy.persists_response()),
            dispatcher: self.dispatcher.clone(),
            store: Arc::clone(&self.store),
            cancel: cancel.clone(),
            tx,
        };
        tokio::spawn(network.run(http));

        RequestHandle::new(id, rx, cancel)
    }

    /// Cached body for `key`, parsed with the content type it was served
    /// with (sniffed when none was recorded). Unreadable or unparsable
    /// entries count as a miss.
    fn cached_payload(&self, id: RequestId, key: &CacheKey) -> Option<Payload> {
        if !self.store.exists(key) {
            debug!(request_id = %id, %key, "cache miss");
            return None;
        }
        let bytes = match self.store.read(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(request_id = %id, %key, error = %e, "failed to read cache entry");
                return None;
            }
        };
        let content_type = self.store.content_type(key);
        match Payload::parse(&String::from_utf8_lossy(&bytes), content_type.as_deref()) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(request_id = %id, %key, error = %e, "ignoring unparsable cache entry");
                None
            }
        }
    }
}

/// Everything the spawned network task needs.
struct NetworkLeg {
    id: RequestId,
    policy: CachePolicy,
    /// Set only when a successful response should be persisted.
    key: Option<CacheKey>,
    dispatcher: Dispatcher,
    store: Arc<dyn CacheStore>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl NetworkLeg {
    async fn run(self, http: HttpRequest) {
        let id = self.id;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(request_id = %id, "request cancelled before completion");
                return;
            }
            result = self.dispatcher.dispatch(http) => result,
        };

        let outcome = match result.and_then(|body| Ok((body.payload()?, body))) {
            Ok((payload, body)) => {
                if let Some(key) = self.key.clone() {
                    persist(Arc::clone(&self.store), id, key, body).await;
                }
                Ok(payload)
            }
            Err(e) => Err(e),
        };

        if self.cancel.is_cancelled() {
            debug!(request_id = %id, "dropping outcome of cancelled request");
            return;
        }
        if let Err(e) = &outcome {
            debug!(request_id = %id, error = %e, "request failed");
        }
        if self.policy.delivers(&outcome) {
            let _ = self.tx.send(Delivery {
                source: Source::Network,
                outcome,
            });
        }
    }
}

/// Write a parsed network body and its content type to the cache. File
/// stores fsync, so the write runs on the blocking pool.
async fn persist(store: Arc<dyn CacheStore>, id: RequestId, key: CacheKey, body: ResponseBody) {
    let written = tokio::task::spawn_blocking(move || {
        let result = store.write_entry(&key, body.text.as_bytes(), body.content_type.as_deref());
        (key, result)
    })
    .await;
    match written {
        Ok((_, Ok(()))) => {}
        Ok((key, Err(e))) => {
            warn!(request_id = %id, %key, error = %e, "failed to write cache entry");
        }
        Err(e) => warn!(request_id = %id, error = %e, "cache write task failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::http::HttpResponse;
    use crate::store::MemoryCacheStore;

    /// Replays canned responses and records every request it sees.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn replying(responses: Vec<Result<HttpResponse, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Transport for Scripted {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Transport("no scripted response".to_string())))
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    fn client(transport: Arc<Scripted>) -> (RestClient, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let config = ClientConfig {
            use_ssl: false,
            ..ClientConfig::default()
        };
        let client = RestClient::with_parts(config, store.clone(), transport);
        (client, store)
    }

    #[tokio::test]
    async fn cache_else_network_hit_skips_network() {
        let transport = Scripted::replying(vec![]);
        let (client, store) = client(transport.clone());
        let request = Request::get("/items").param("id", "42");
        store.write(&request.cache_key(), br#"{"id":42}"#).unwrap();

        let deliveries = client
            .execute(request, CachePolicy::CacheElseNetwork)
            .collect()
            .await;

        assert_eq!(
            deliveries,
            vec![Delivery {
                source: Source::Cache,
                outcome: Ok(Payload::Json(json!({"id": 42}))),
            }]
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn cache_else_network_miss_falls_back_and_persists() {
        let transport = Scripted::replying(vec![ok(r#"[1,2,3]"#)]);
        let (client, store) = client(transport.clone());
        let request = Request::get("/numbers");
        let key = request.cache_key();

        let deliveries = client
            .execute(request, CachePolicy::CacheElseNetwork)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].source, Source::Network);
        assert_eq!(store.read(&key).unwrap(), b"[1,2,3]");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn cache_then_network_delivers_twice_on_hit() {
        let transport = Scripted::replying(vec![ok(r#"{"v":"fresh"}"#)]);
        let (client, store) = client(transport.clone());
        let request = Request::get("/value");
        store.write(&request.cache_key(), br#"{"v":"stale"}"#).unwrap();

        let deliveries = client
            .execute(request, CachePolicy::CacheThenNetwork)
            .collect()
            .await;

        let sources: Vec<_> = deliveries.iter().map(|d| d.source).collect();
        assert_eq!(sources, vec![Source::Cache, Source::Network]);
        assert_eq!(deliveries[0].outcome, Ok(Payload::Json(json!({"v": "stale"}))));
        assert_eq!(deliveries[1].outcome, Ok(Payload::Json(json!({"v": "fresh"}))));
    }

    #[tokio::test]
    async fn cache_then_network_delivers_once_on_miss() {
        let transport = Scripted::replying(vec![ok("fresh")]);
        let (client, _store) = client(transport);

        let deliveries = client
            .execute(Request::get("/value"), CachePolicy::CacheThenNetwork)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].source, Source::Network);
        assert_eq!(deliveries[0].outcome, Ok(Payload::Text("fresh".to_string())));
    }

    #[tokio::test]
    async fn update_cache_persists_silently() {
        let transport = Scripted::replying(vec![ok(r#"{"warm":true}"#)]);
        let (client, store) = client(transport);
        let request = Request::get("/warm");
        let key = request.cache_key();

        let deliveries = client
            .execute(request, CachePolicy::UpdateCache)
            .collect()
            .await;

        assert!(deliveries.is_empty());
        assert!(store.exists(&key));
    }

    #[tokio::test]
    async fn update_cache_still_reports_failures() {
        let transport = Scripted::replying(vec![Err(ApiError::Transport("offline".to_string()))]);
        let (client, store) = client(transport);

        let deliveries = client
            .execute(Request::get("/warm"), CachePolicy::UpdateCache)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].is_success());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ignore_cache_neither_reads_nor_writes() {
        let transport = Scripted::replying(vec![ok(r#"{"n":1}"#)]);
        let (client, store) = client(transport.clone());
        let request = Request::get("/n");
        let key = request.cache_key();

        let deliveries = client
            .execute(request, CachePolicy::IgnoreCache)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert!(!store.exists(&key));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn network_only_refreshes_cache_without_reading_it() {
        let transport = Scripted::replying(vec![ok(r#"{"n":2}"#)]);
        let (client, store) = client(transport);
        let request = Request::get("/n");
        let key = request.cache_key();
        store.write(&key, br#"{"n":1}"#).unwrap();

        let deliveries = client
            .execute(request, CachePolicy::NetworkOnly)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].outcome, Ok(Payload::Json(json!({"n": 2}))));
        assert_eq!(store.read(&key).unwrap(), br#"{"n":2}"#);
    }

    #[tokio::test]
    async fn non_get_requests_bypass_cache() {
        let transport = Scripted::replying(vec![ok(r#"{"id":1}"#), ok(r#"{"id":1}"#)]);
        let (client, store) = client(transport.clone());
        let post = Request::post("/items").param("name", "lamp");
        store.write(&post.cache_key(), br#"{"cached":true}"#).unwrap();

        let deliveries = client
            .execute(post.clone(), CachePolicy::CacheElseNetwork)
            .collect()
            .await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].source, Source::Network);

        store.clear().unwrap();
        let delete = Request::delete("/items/1");
        client
            .execute(delete.clone(), CachePolicy::NetworkOnly)
            .collect()
            .await;
        assert!(!store.exists(&delete.cache_key()));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn status_errors_are_delivered_and_not_cached() {
        let transport = Scripted::replying(vec![Ok(HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: b"boom".to_vec(),
        })]);
        let (client, store) = client(transport);

        let deliveries = client
            .execute(Request::get("/broken"), CachePolicy::NetworkOnly)
            .collect()
            .await;

        assert_eq!(
            deliveries[0].outcome,
            Err(ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error_and_not_cached() {
        let transport = Scripted::replying(vec![ok("{oops")]);
        let (client, store) = client(transport);

        let deliveries = client
            .execute(Request::get("/bad"), CachePolicy::NetworkOnly)
            .collect()
            .await;

        assert!(matches!(deliveries[0].outcome, Err(ApiError::Parse(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unparsable_cache_entry_counts_as_miss() {
        let transport = Scripted::replying(vec![ok(r#"{"ok":true}"#)]);
        let (client, store) = client(transport.clone());
        let request = Request::get("/corrupt");
        store.write(&request.cache_key(), b"{truncated").unwrap();

        let deliveries = client
            .execute(request, CachePolicy::CacheElseNetwork)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].source, Source::Network);
        assert_eq!(transport.calls(), 1);
    }

    fn ok_typed(content_type: &str, body: &str) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.as_bytes().to_vec(),
        })
    }

    #[tokio::test]
    async fn cached_body_parses_like_the_network_body() {
        let transport = Scripted::replying(vec![ok_typed("text/plain", r#"{"a":1}"#)]);
        let (client, _store) = client(transport.clone());
        let request = Request::get("/plain");

        let first = client
            .execute(request.clone(), CachePolicy::CacheElseNetwork)
            .collect()
            .await;
        let second = client
            .execute(request, CachePolicy::CacheElseNetwork)
            .collect()
            .await;

        assert_eq!(first[0].source, Source::Network);
        assert_eq!(second[0].source, Source::Cache);
        assert_eq!(first[0].outcome, Ok(Payload::Text(r#"{"a":1}"#.to_string())));
        assert_eq!(second[0].outcome, first[0].outcome);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn braced_plain_text_is_served_from_cache() {
        let transport = Scripted::replying(vec![ok_typed("text/plain", "{template}")]);
        let (client, store) = client(transport.clone());
        let request = Request::get("/template");

        client
            .execute(request.clone(), CachePolicy::CacheElseNetwork)
            .collect()
            .await;
        assert!(store.exists(&request.cache_key()));

        let deliveries = client
            .execute(request, CachePolicy::CacheElseNetwork)
            .collect()
            .await;

        assert_eq!(
            deliveries,
            vec![Delivery {
                source: Source::Cache,
                outcome: Ok(Payload::Text("{template}".to_string())),
            }]
        );
        assert_eq!(transport.calls(), 1);
    }

    /// Fails any write made from an async context.
    #[derive(Default)]
    struct OffRuntimeStore(MemoryCacheStore);

    impl CacheStore for OffRuntimeStore {
        fn exists(&self, key: &CacheKey) -> bool {
            self.0.exists(key)
        }

        fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
            self.0.read(key)
        }

        fn write_entry(
            &self,
            key: &CacheKey,
            body: &[u8],
            content_type: Option<&str>,
        ) -> Result<(), CacheError> {
            // Panics when called on a runtime worker.
            tokio::runtime::Handle::current().block_on(async {});
            self.0.write_entry(key, body, content_type)
        }

        fn content_type(&self, key: &CacheKey) -> Option<String> {
            self.0.content_type(key)
        }

        fn clear(&self) -> Result<(), CacheError> {
            self.0.clear()
        }
    }

    #[tokio::test]
    async fn cache_writes_run_off_the_runtime() {
        let transport = Scripted::replying(vec![ok(r#"{"n":1}"#)]);
        let store = Arc::new(OffRuntimeStore::default());
        let config = ClientConfig {
            use_ssl: false,
            ..ClientConfig::default()
        };
        let client = RestClient::with_parts(config, store.clone(), transport);
        let request = Request::get("/n");

        let deliveries = client
            .execute(request.clone(), CachePolicy::NetworkOnly)
            .collect()
            .await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(store.read(&request.cache_key()).unwrap(), br#"{"n":1}"#);
    }

    #[test]
    fn new_requires_a_cache_location() {
        let err = RestClient::new(ClientConfig::default()).err().unwrap();
        assert!(matches!(err, CacheError::NoDirectory));

        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            cache_dir: Some(dir.path().join("app")),
            ..ClientConfig::default()
        };
        let client = RestClient::new(config).unwrap();
        assert!(dir.path().join("app").is_dir());
        assert!(client.clear_cache().is_ok());
    }

    #[tokio::test]
    async fn cancelled_request_delivers_nothing() {
        let transport = Scripted::replying(vec![ok(r#"{"late":true}"#)]);
        let (client, _store) = client(transport);

        let handle = client.execute(Request::get("/late"), CachePolicy::IgnoreCache);
        handle.cancel();

        assert!(handle.collect().await.is_empty());
    }

    #[test]
    fn build_request_uses_client_config() {
        let (client, _store) = client(Scripted::replying(vec![]));
        let http = client.build_request(&Request::get("/items").param("id", 1));
        assert_eq!(http.url, "http://localhost/items?id=1");
    }
}
