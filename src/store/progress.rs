// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StorageError;

use super::backing::{KeyValueStore, StoreKey, StoreRecord};

/// Last known playhead position for a media URL.
///
/// Invariant: `0 <= current_time <= duration` when the duration is known.
/// The duration stays `None` until the media has been probed; unknown is
/// not the same as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    pub current_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub last_played: DateTime<Utc>,
}

impl PlaybackProgress {
    /// Build a progress record, clamping the position into `[0, duration]`.
    pub fn new(current_time: f64, duration: Option<f64>, last_played: DateTime<Utc>) -> Self {
        let current_time = match duration {
            Some(d) => current_time.clamp(0.0, d),
            None => current_time.max(0.0),
        };
        Self {
            current_time,
            duration,
            last_played,
        }
    }
}

/// Persistent per-URL playback progress and per-feed played marks.
///
/// Every write is a read-modify-write cycle against the full map in the
/// backing store, serialized through one FIFO mutex. Concurrent writers
/// (the periodic tick, a pause handler, an import in another surface) are
/// ordered: the later write always sees the earlier write's effect.
pub struct ProgressStore<S: KeyValueStore> {
    backing: Arc<S>,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn new(backing: Arc<S>) -> Self {
        Self {
            backing,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backing(&self) -> &Arc<S> {
        &self.backing
    }

    /// Saved progress for a media URL, if any.
    pub async fn progress(&self, url: &str) -> Result<Option<PlaybackProgress>, StorageError> {
        let record = self.backing.get(&[StoreKey::EpisodeProgress]).await?;
        Ok(record
            .episode_progress
            .and_then(|mut map| map.remove(url)))
    }

    pub async fn set_progress(
        &self,
        url: &str,
        progress: PlaybackProgress,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let record = self.backing.get(&[StoreKey::EpisodeProgress]).await?;
        let mut map = record.episode_progress.unwrap_or_default();
        map.insert(url.to_string(), progress);
        self.backing
            .set(StoreRecord {
                episode_progress: Some(map),
                ..Default::default()
            })
            .await
    }

    /// Whether the episode is marked played for the given feed. Membership
    /// is feed-scoped: the same URL under another feed is a different fact.
    pub async fn is_played(&self, feed_id: &str, url: &str) -> Result<bool, StorageError> {
        let record = self.backing.get(&[StoreKey::PlayedEpisodes]).await?;
        Ok(record
            .played_episodes
            .and_then(|map| map.get(feed_id).map(|set| set.contains(url)))
            .unwrap_or(false))
    }

    /// All played URLs for one feed.
    pub async fn played_for_feed(&self, feed_id: &str) -> Result<BTreeSet<String>, StorageError> {
        let record = self.backing.get(&[StoreKey::PlayedEpisodes]).await?;
        Ok(record
            .played_episodes
            .and_then(|mut map| map.remove(feed_id))
            .unwrap_or_default())
    }

    /// Mark or unmark an episode as played. Unmarking never touches the
    /// stored progress; played and progress are independent facts.
    pub async fn set_played(
        &self,
        feed_id: &str,
        url: &str,
        played: bool,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let record = self.backing.get(&[StoreKey::PlayedEpisodes]).await?;
        let mut map = record.played_episodes.unwrap_or_default();

        if played {
            map.entry(feed_id.to_string())
                .or_default()
                .insert(url.to_string());
        } else if let Some(set) = map.get_mut(feed_id) {
            set.remove(url);
            if set.is_empty() {
                map.remove(feed_id);
            }
        }

        self.backing
            .set(StoreRecord {
                played_episodes: Some(map),
                ..Default::default()
            })
            .await
    }
}
