//! # offline-cache
//!
//! Per-topic offline storage of study audio, so a topic can be played back
//! without connectivity.
//!
//! ## Model
//!
//! ```text
//! topic id ──▶ CacheEntry { sourceURL, cachedAt, size } ──▶ blob (content slot keyed by URL)
//! ```
//!
//! A topic is either `Absent` or `Cached`. `save` moves it to `Cached`
//! (overwriting and releasing any previous blob), `remove` and `clear_all`
//! move it back. A topic counts as cached only when both its record and its
//! blob are present.
//!
//! Every mutation bumps a [`CacheNotifier`]; views subscribe and re-query
//! the store when the version moves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offline_cache::{CacheConfig, HttpFetcher, OfflineCache};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), offline_cache::CacheError> {
//! let config = CacheConfig::builder().root("/tmp/study").build()?;
//! let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout_secs)?);
//! let cache = OfflineCache::new(config, fetcher);
//!
//! cache.save("cardiac/valves", "https://cdn.example.org/valves.mp3").await?;
//! assert!(cache.is_cached("cardiac/valves").await);
//! println!("{} bytes cached", cache.total_size().await?);
//! # Ok(())
//! # }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_STORE_ID};
pub use error::{CacheError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use notify::CacheNotifier;
pub use store::{AudioHandle, CacheEntry, OfflineCache};
