//! Per-call handles returned by `RestClient::execute`.
//!
//! A handle owns the receiving end of the call's delivery channel and its
//! cancellation token. The channel closes once every delivery the policy
//! allows has been sent, so `recv` returning `None` means the call is over.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ApiError;
use crate::payload::Payload;

/// Identifier attached to every call, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Where a delivered outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

/// One outcome of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub source: Source,
    pub outcome: Result<Payload, ApiError>,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    cancel: CancellationToken,
}

impl RequestHandle {
    pub(crate) fn new(
        id: RequestId,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            deliveries,
            cancel,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Next outcome, or `None` once the call has nothing more to deliver.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Stop the call. No network outcome is delivered afterwards; a response
    /// that already arrived may still have been written to the cache.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token that cancels this call, for use from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the call to finish and return everything it delivered.
    pub async fn collect(mut self) -> Vec<Delivery> {
        let mut all = Vec::new();
        while let Some(delivery) = self.recv().await {
            all.push(delivery);
        }
        all
    }
}
