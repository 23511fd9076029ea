//! Remote fetch used by [`crate::OfflineCache::save`].
//!
//! The store only needs "give me the bytes at this URL", so that is all the
//! [`Fetcher`] trait asks for. [`HttpFetcher`] is the production
//! implementation; tests plug in an in-memory one.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Source of the bytes that end up in a content slot.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full body at `url`. Any non-success outcome is a
    /// [`CacheError::FetchFailed`] or [`CacheError::FetchTimeout`].
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CacheError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {} for offline cache", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CacheError::FetchTimeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                CacheError::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(CacheError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| CacheError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
