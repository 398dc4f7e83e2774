// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::channel::LiveChannel;
use crate::error::StorageError;

use super::progress::PlaybackProgress;

/// Keys of the persistent key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    EpisodeProgress,
    PlayedEpisodes,
    Feeds,
    LiveChannels,
}

/// A partial store record. `None` means "not requested" on read and
/// "leave untouched" on write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_progress: Option<HashMap<String, PlaybackProgress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub played_episodes: Option<HashMap<String, BTreeSet<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeds: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_channels: Option<Vec<LiveChannel>>,
}

/// Notification that some keys changed. Carries no values: observers
/// re-read what they care about.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub keys: Vec<StoreKey>,
}

/// Asynchronous persistent key-value backing store. No transactions; the
/// higher-level stores serialize their own read-modify-write cycles.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the requested keys. Missing keys come back as `None`.
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StorageError>;

    /// Merge the record's populated fields into the store.
    async fn set(&self, record: StoreRecord) -> Result<(), StorageError>;

    /// Observe change notifications for subsequently written keys.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// The full materialized store contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FullRecord {
    #[serde(default)]
    episode_progress: HashMap<String, PlaybackProgress>,
    #[serde(default)]
    played_episodes: HashMap<String, BTreeSet<String>>,
    #[serde(default)]
    feeds: Vec<String>,
    #[serde(default)]
    live_channels: Vec<LiveChannel>,
}

impl FullRecord {
    fn select(&self, keys: &[StoreKey]) -> StoreRecord {
        let mut record = StoreRecord::default();
        for key in keys {
            match key {
                StoreKey::EpisodeProgress => {
                    record.episode_progress = Some(self.episode_progress.clone());
                }
                StoreKey::PlayedEpisodes => {
                    record.played_episodes = Some(self.played_episodes.clone());
                }
                StoreKey::Feeds => record.feeds = Some(self.feeds.clone()),
                StoreKey::LiveChannels => {
                    record.live_channels = Some(self.live_channels.clone());
                }
            }
        }
        record
    }

    fn merge(&mut self, record: StoreRecord) -> Vec<StoreKey> {
        let mut changed = Vec::new();
        if let Some(progress) = record.episode_progress {
            self.episode_progress = progress;
            changed.push(StoreKey::EpisodeProgress);
        }
        if let Some(played) = record.played_episodes {
            self.played_episodes = played;
            changed.push(StoreKey::PlayedEpisodes);
        }
        if let Some(feeds) = record.feeds {
            self.feeds = feeds;
            changed.push(StoreKey::Feeds);
        }
        if let Some(channels) = record.live_channels {
            self.live_channels = channels;
            changed.push(StoreKey::LiveChannels);
        }
        changed
    }
}

/// Ephemeral store. Used by tests and surfaces that don't persist.
pub struct InMemoryStore {
    record: std::sync::Mutex<FullRecord>,
    changes: broadcast::Sender<StoreChange>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            record: std::sync::Mutex::new(FullRecord::default()),
            changes,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StorageError> {
        Ok(self.record.lock().unwrap().select(keys))
    }

    async fn set(&self, record: StoreRecord) -> Result<(), StorageError> {
        let changed = self.record.lock().unwrap().merge(record);
        if !changed.is_empty() {
            let _ = self.changes.send(StoreChange { keys: changed });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Store persisted as one pretty-printed JSON file.
///
/// A missing or unparseable file reads as an empty store; the next write
/// replaces it.
pub struct JsonFileStore {
    path: PathBuf,
    io_lock: tokio::sync::Mutex<()>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            path: path.into(),
            io_lock: tokio::sync::Mutex::new(()),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<FullRecord, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), "store file corrupt, starting empty: {e}");
                FullRecord::default()
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FullRecord::default()),
            Err(e) => Err(StorageError::ReadFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    async fn persist(&self, record: &FullRecord) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::WriteFailed {
                    path: self.path.clone(),
                    source: e,
                })?;
        }

        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StorageError> {
        let _guard = self.io_lock.lock().await;
        Ok(self.load().await?.select(keys))
    }

    async fn set(&self, record: StoreRecord) -> Result<(), StorageError> {
        let _guard = self.io_lock.lock().await;
        let mut full = self.load().await?;
        let changed = full.merge(record);
        self.persist(&full).await?;
        if !changed.is_empty() {
            let _ = self.changes.send(StoreChange { keys: changed });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use tempfile::tempdir;

    fn progress_record(url: &str, seconds: f64) -> StoreRecord {
        let mut progress = HashMap::new();
        progress.insert(
            url.to_string(),
            PlaybackProgress::new(seconds, Some(100.0), Utc::now()),
        );
        StoreRecord {
            episode_progress: Some(progress),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn get_returns_only_requested_keys() {
        let store = InMemoryStore::new();
        store
            .set(StoreRecord {
                feeds: Some(vec!["https://example.com/feed.xml".to_string()]),
                ..Default::default()
            })
            .await
            .unwrap();

        let record = store.get(&[StoreKey::Feeds]).await.unwrap();
        assert!(record.feeds.is_some());
        assert!(record.episode_progress.is_none());
    }

    #[tokio::test]
    async fn set_leaves_untouched_keys_alone() {
        let store = InMemoryStore::new();
        store
            .set(StoreRecord {
                feeds: Some(vec!["https://example.com/feed.xml".to_string()]),
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .set(progress_record("https://example.com/ep.mp3", 12.0))
            .await
            .unwrap();

        let record = store.get(&[StoreKey::Feeds]).await.unwrap();
        assert_eq!(record.feeds.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_changed_keys() {
        let store = InMemoryStore::new();
        let mut rx = store.subscribe();

        store
            .set(progress_record("https://example.com/ep.mp3", 5.0))
            .await
            .unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.keys, vec![StoreKey::EpisodeProgress]);
    }

    #[tokio::test]
    async fn json_store_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = JsonFileStore::new(&path);
            store
                .set(progress_record("https://example.com/ep.mp3", 42.0))
                .await
                .unwrap();
        }

        let store = JsonFileStore::new(&path);
        let record = store.get(&[StoreKey::EpisodeProgress]).await.unwrap();
        let progress = record.episode_progress.unwrap();
        assert_eq!(progress["https://example.com/ep.mp3"].current_time, 42.0);
    }

    #[tokio::test]
    async fn json_store_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("missing.json"));

        let record = store.get(&[StoreKey::Feeds, StoreKey::LiveChannels]).await.unwrap();
        assert_eq!(record.feeds.unwrap(), Vec::<String>::new());
        assert!(record.live_channels.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_store_tolerates_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        let record = store.get(&[StoreKey::Feeds]).await.unwrap();
        assert!(record.feeds.unwrap().is_empty());

        // Writing afterwards replaces the corrupt blob with a valid one
        store
            .set(progress_record("https://example.com/ep.mp3", 1.0))
            .await
            .unwrap();
        let record = store.get(&[StoreKey::EpisodeProgress]).await.unwrap();
        assert_eq!(record.episode_progress.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_store_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.json");

        let store = JsonFileStore::new(&path);
        store
            .set(StoreRecord {
                feeds: Some(vec![]),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(path.exists());
    }
}
