//! Cache change notification.
//!
//! A single monotonically increasing version number, published through a
//! `tokio::sync::watch` channel. Observers never receive a diff: when the
//! version moves they re-query the store (`is_cached`, `total_size`, ...).
//! A watch channel only keeps the latest value, which is exactly the
//! semantics wanted here: a slow observer that misses three bumps still
//! wakes once and re-reads current state.

use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// Broadcasts "the cache changed" to any number of observers.
///
/// Cloning is cheap and every clone shares the same counter.
#[derive(Debug, Clone)]
pub struct CacheNotifier {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for CacheNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheNotifier {
    /// A fresh notifier starting at version 0.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// The process-wide notifier shared by every store that does not get
    /// one injected.
    pub fn global() -> &'static CacheNotifier {
        static GLOBAL: OnceLock<CacheNotifier> = OnceLock::new();
        GLOBAL.get_or_init(CacheNotifier::new)
    }

    /// Bump the version and wake every subscriber. Returns the new version.
    pub fn notify(&self) -> u64 {
        let mut current = 0;
        self.tx.send_modify(|v| {
            *v += 1;
            current = *v;
        });
        current
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Subscribe to version changes. `changed().await` resolves on the next bump.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}
