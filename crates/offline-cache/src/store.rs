//! The offline cache store.
//!
//! ## On-disk layout
//!
//! ```text
//! <root>/<store_id>/
//!   entries/<sha256(topic_id)>.json   one metadata record per topic
//!   blobs/<sha256(source_url)>        one content slot per distinct URL
//! ```
//!
//! Both namespaces live under the store directory, so clearing the cache is
//! a single `remove_dir_all` that cannot reach unrelated data under `root`.
//!
//! ## Write ordering
//!
//! Metadata and blob writes are two separate steps and cannot be made atomic
//! together. `save` therefore always writes (and verifies) the blob before the
//! metadata record, and every individual file is written to a uniquely named
//! `.partial` file in the same directory then renamed into place, so
//! concurrent writers of one slot never share a temp file and the last
//! rename wins. The only inconsistent state a crash can leave is an orphan
//! blob or a record whose blob was deleted underneath it; the latter is
//! detected on read, reported as a miss and pruned.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::fetch::Fetcher;
use crate::notify::CacheNotifier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ENTRIES_DIR: &str = "entries";
const BLOBS_DIR: &str = "blobs";
const PARTIAL_EXT: &str = "partial";

/// Metadata record for one cached topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Composite `category/slug` topic identifier; unique key of the store.
    pub topic_id: String,
    /// URL the audio was fetched from; also the content-slot key.
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    /// Milliseconds since the Unix epoch at which the entry was written.
    pub cached_at: i64,
    /// Byte length of the stored blob.
    pub size: u64,
}

/// A locally playable copy of a cached blob.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    pub topic_id: String,
    pub source_url: String,
    /// Path of the content slot on disk.
    pub path: PathBuf,
    /// MIME type guessed from the source URL.
    pub mime_type: &'static str,
    /// The blob itself, loaded into memory.
    pub bytes: Arc<[u8]>,
}

impl AudioHandle {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Key-value store of per-topic audio, persisted under one directory.
///
/// Every mutating operation bumps the [`CacheNotifier`] so observers can
/// re-query. There is no cross-operation locking: concurrent `save` calls
/// for the same topic race and the last writer wins.
pub struct OfflineCache {
    config: CacheConfig,
    fetcher: Arc<dyn Fetcher>,
    notifier: CacheNotifier,
}

impl std::fmt::Debug for OfflineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCache")
            .field("config", &self.config)
            .field("fetcher", &"<dyn Fetcher>")
            .field("version", &self.notifier.version())
            .finish()
    }
}

impl OfflineCache {
    /// Open a store using the process-wide [`CacheNotifier::global`].
    ///
    /// Nothing is created on disk until the first `save`.
    pub fn new(config: CacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            notifier: CacheNotifier::global().clone(),
        }
    }

    /// Replace the notifier, e.g. to isolate a store in tests.
    pub fn with_notifier(mut self, notifier: CacheNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> &CacheNotifier {
        &self.notifier
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Fetch `source_url` and store it as the cached audio for `topic_id`.
    ///
    /// Overwrites any existing entry for the topic; the previous blob is
    /// released once the new record is in place, unless another topic still
    /// references it. On any failure the store is left as it was.
    pub async fn save(&self, topic_id: &str, source_url: &str) -> Result<CacheEntry> {
        let bytes = self.fetcher.fetch(source_url).await?;
        let (previous, previous_corrupt) = match self.read_entry(topic_id).await {
            Ok(entry) => (entry, false),
            Err(e) => {
                warn!("Overwriting unreadable record for '{}': {}", topic_id, e);
                (None, true)
            }
        };

        // Blob first: a record must never point at a slot that was not written.
        let blob_path = self.blob_path(source_url);
        let blob_existed = exists(&blob_path).await?;
        write_atomic(&blob_path, &bytes).await?;
        let found = tokio::fs::metadata(&blob_path)
            .await
            .map_err(|e| CacheError::io(&blob_path, e))?
            .len();
        if found != bytes.len() as u64 {
            if !blob_existed {
                self.discard_blob(&blob_path).await;
            }
            return Err(CacheError::BlobVerifyFailed {
                url: source_url.to_string(),
                expected: bytes.len() as u64,
                found,
            });
        }

        let entry = CacheEntry {
            topic_id: topic_id.to_string(),
            source_url: source_url.to_string(),
            cached_at: chrono::Utc::now().timestamp_millis(),
            size: found,
        };
        let record = serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::Metadata {
            path: self.entry_path(topic_id),
            source: e,
        })?;
        if let Err(e) = write_atomic(&self.entry_path(topic_id), &record).await {
            if !blob_existed {
                self.discard_blob(&blob_path).await;
            }
            return Err(e);
        }

        if let Some(old) = previous.filter(|old| old.source_url != source_url) {
            self.release_blob(&old.source_url, topic_id).await?;
        }
        if previous_corrupt {
            self.sweep_orphan_blobs().await;
        }

        self.notifier.notify();
        info!(
            "Cached audio for '{}' ({} bytes from {})",
            topic_id, entry.size, source_url
        );
        Ok(entry)
    }

    /// `true` iff a record exists for `topic_id` *and* its blob is present.
    ///
    /// Never fails: unreadable state is logged and reported as a miss. A
    /// record whose blob is gone is pruned.
    pub async fn is_cached(&self, topic_id: &str) -> bool {
        match self.live_entry(topic_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("Cache check for '{}' failed: {}", topic_id, e);
                false
            }
        }
    }

    /// Load the cached blob for `topic_id`, or `None` if it is not cached.
    pub async fn get_cached_audio(&self, topic_id: &str) -> Result<Option<AudioHandle>> {
        let entry = match self.live_entry(topic_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e @ CacheError::Metadata { .. }) => {
                warn!("Unreadable record for '{}', treating as not cached: {}", topic_id, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let path = self.blob_path(&entry.source_url);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Deleted between the existence check and the read.
                self.prune_dangling(&entry).await;
                return Ok(None);
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        Ok(Some(AudioHandle {
            mime_type: guess_audio_mime(&entry.source_url),
            topic_id: entry.topic_id,
            source_url: entry.source_url,
            path,
            bytes: bytes.into(),
        }))
    }

    /// Delete the record and blob for `topic_id`. Absent topics are a no-op.
    pub async fn remove(&self, topic_id: &str) -> Result<()> {
        let entry = match self.read_entry(topic_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("remove('{}'): not cached", topic_id);
                return Ok(());
            }
            Err(e) => {
                warn!("Dropping unreadable record for '{}': {}", topic_id, e);
                remove_if_exists(&self.entry_path(topic_id)).await?;
                self.sweep_orphan_blobs().await;
                self.notifier.notify();
                return Ok(());
            }
        };

        self.release_blob(&entry.source_url, topic_id).await?;
        remove_if_exists(&self.entry_path(topic_id)).await?;

        self.notifier.notify();
        info!("Removed cached audio for '{}'", topic_id);
        Ok(())
    }

    /// Delete every blob and every record in this store.
    pub async fn clear_all(&self) -> Result<()> {
        let dir = self.config.store_dir();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&dir, e)),
        }
        self.notifier.notify();
        info!("Cleared offline cache at {}", dir.display());
        Ok(())
    }

    /// Sum of the byte lengths of every stored blob, recomputed on each call.
    pub async fn total_size(&self) -> Result<u64> {
        let dir = self.blobs_dir();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&dir, e)),
        };

        let mut total = 0u64;
        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&dir, e))?
        {
            let path = item.path();
            if is_partial(&path) {
                continue;
            }
            let meta = item.metadata().await.map_err(|e| CacheError::io(&path, e))?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        Ok(total)
    }

    /// Every metadata record currently in the store, sorted by topic id.
    ///
    /// Corrupt records are skipped with a warning.
    pub async fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let dir = self.entries_dir();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&dir, e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable cache record: {}", e),
            }
        }
        entries.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(entries)
    }

    /// The metadata record for `topic_id`, without checking the blob.
    pub async fn entry(&self, topic_id: &str) -> Result<Option<CacheEntry>> {
        self.read_entry(topic_id).await
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn entries_dir(&self) -> PathBuf {
        self.config.store_dir().join(ENTRIES_DIR)
    }

    fn blobs_dir(&self) -> PathBuf {
        self.config.store_dir().join(BLOBS_DIR)
    }

    fn entry_path(&self, topic_id: &str) -> PathBuf {
        self.entries_dir().join(format!("{}.json", slot_key(topic_id)))
    }

    fn blob_path(&self, source_url: &str) -> PathBuf {
        self.blobs_dir().join(slot_key(source_url))
    }

    async fn read_entry(&self, topic_id: &str) -> Result<Option<CacheEntry>> {
        read_record(&self.entry_path(topic_id)).await
    }

    /// The record for `topic_id` if its blob is present; prunes it otherwise.
    async fn live_entry(&self, topic_id: &str) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.read_entry(topic_id).await? else {
            return Ok(None);
        };
        if exists(&self.blob_path(&entry.source_url)).await? {
            Ok(Some(entry))
        } else {
            self.prune_dangling(&entry).await;
            Ok(None)
        }
    }

    async fn prune_dangling(&self, entry: &CacheEntry) {
        warn!(
            "Cache record for '{}' has no blob ({}); treating as not cached",
            entry.topic_id, entry.source_url
        );
        if let Err(e) = remove_if_exists(&self.entry_path(&entry.topic_id)).await {
            warn!("Could not prune record for '{}': {}", entry.topic_id, e);
        }
    }

    /// Delete the blob for `source_url` unless a topic other than
    /// `releasing_topic` still points at it.
    async fn release_blob(&self, source_url: &str, releasing_topic: &str) -> Result<()> {
        let shared = self
            .list_entries()
            .await?
            .iter()
            .any(|e| e.source_url == source_url && e.topic_id != releasing_topic);
        if shared {
            debug!("Blob for {} still referenced; keeping it", source_url);
            return Ok(());
        }
        remove_if_exists(&self.blob_path(source_url)).await
    }

    /// Delete every blob no record points at.
    ///
    /// Runs only after a corrupt record hid which blob it referenced. A save
    /// racing with the sweep can lose its fresh blob; its record then reads
    /// as a miss and is pruned.
    async fn sweep_orphan_blobs(&self) {
        match self.remove_unreferenced_blobs().await {
            Ok(0) => {}
            Ok(n) => info!("Removed {} orphaned blob(s)", n),
            Err(e) => warn!("Orphan blob sweep failed: {}", e),
        }
    }

    async fn remove_unreferenced_blobs(&self) -> Result<usize> {
        let referenced: HashSet<String> = self
            .list_entries()
            .await?
            .iter()
            .map(|e| slot_key(&e.source_url))
            .collect();

        let dir = self.blobs_dir();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&dir, e)),
        };

        let mut removed = 0;
        while let Some(item) = read_dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&dir, e))?
        {
            let path = item.path();
            let name = item.file_name();
            if is_partial(&path) || name.to_str().is_some_and(|n| referenced.contains(n)) {
                continue;
            }
            remove_if_exists(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn discard_blob(&self, path: &Path) {
        if let Err(e) = remove_if_exists(path).await {
            warn!("Could not discard blob {}: {}", path.display(), e);
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// File-name-safe key for a topic id or URL.
fn slot_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn is_partial(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_EXT)
}

fn guess_audio_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".mp3") {
        "audio/mpeg"
    } else if path.ends_with(".wav") {
        "audio/wav"
    } else if path.ends_with(".ogg") {
        "audio/ogg"
    } else if path.ends_with(".m4a") {
        "audio/mp4"
    } else {
        "application/octet-stream"
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| CacheError::io(path, e))
}

async fn read_record(path: &Path) -> Result<Option<CacheEntry>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| CacheError::Metadata {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// Write to a fresh `<random>.partial` file beside `path`, then rename it
/// over `path`. The temp file is removed if anything fails before the rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| CacheError::io(&dir, e))?;

    let dest = path.to_path_buf();
    let body = bytes.to_vec();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let suffix = format!(".{PARTIAL_EXT}");
        let mut tmp = tempfile::Builder::new()
            .suffix(&suffix)
            .tempfile_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| CacheError::io(path, std::io::Error::other(e)))?
    .map_err(|e| CacheError::io(path, e))
}
