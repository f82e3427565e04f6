//! REST client with policy-driven response caching.
//!
//! # Overview
//! A `Request` (method, endpoint, ordered parameters) is executed under a
//! `CachePolicy`. The policy decides whether a cached body answers the call,
//! whether the network is consulted, and whether a fresh GET response is
//! written back to the `CacheStore`. Outcomes arrive on a per-call
//! `RequestHandle` as `Delivery` values tagged with their source.
//!
//! # Design
//! - `Request::to_http` builds a plain-data `HttpRequest`; a `Transport`
//!   executes it; `dispatcher::classify` turns the `HttpResponse` into a
//!   body or an `ApiError`. Only the transport touches the network.
//! - Cache entries are keyed by the SHA-1 of endpoint plus parameters in
//!   caller order and stored as raw bodies, one file each.
//! - `RestApi` is a stateful, callback-style facade over `RestClient` for
//!   callers that prefer the accumulate-then-call style.

pub mod api;
pub mod cache_key;
pub mod client;
pub mod compression;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod http;
pub mod json;
pub mod payload;
pub mod policy;
pub mod request;
pub mod store;
pub mod transport;

pub use api::{Call, RestApi};
pub use cache_key::CacheKey;
pub use client::RestClient;
pub use config::{ClientConfig, Credentials};
pub use dispatcher::{Dispatcher, ResponseBody};
pub use error::{ApiError, CacheError, ConfigError};
pub use handle::{Delivery, RequestHandle, RequestId, Source};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use payload::Payload;
pub use policy::CachePolicy;
pub use request::{ContentType, Request};
pub use store::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use transport::{Transport, UreqTransport};
