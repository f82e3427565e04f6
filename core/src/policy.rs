//! Cache policies and the decisions derived from them.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::payload::Payload;

/// Strategy controlling cache-vs-network precedence for one GET request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never read or write the cache.
    #[default]
    IgnoreCache,
    /// Deliver a cached copy first, then still deliver the network result.
    CacheThenNetwork,
    /// Always go to the network, refresh the cache on success.
    NetworkOnly,
    /// Deliver a cached copy and stop; go to the network only on a miss.
    CacheElseNetwork,
    /// Refresh the cache from the network without delivering the success.
    UpdateCache,
}

impl CachePolicy {
    pub fn reads_cache(&self) -> bool {
        matches!(
            self,
            CachePolicy::CacheThenNetwork | CachePolicy::CacheElseNetwork
        )
    }

    /// Whether a cache hit still leads to a network request.
    pub fn continues_after_hit(&self) -> bool {
        !matches!(self, CachePolicy::CacheElseNetwork)
    }

    pub fn persists_response(&self) -> bool {
        !matches!(self, CachePolicy::IgnoreCache)
    }

    /// Whether a network outcome reaches the caller. `UpdateCache` swallows
    /// successes only; failures are still reported.
    pub fn delivers(&self, outcome: &Result<Payload, ApiError>) -> bool {
        match self {
            CachePolicy::UpdateCache => outcome.is_err(),
            _ => true,
        }
    }
}
