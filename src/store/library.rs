use std::sync::Arc;

use tokio::sync::Mutex;
use url::Url;

use crate::broadcast::{Broadcaster, SyncEvent};
use crate::channel::LiveChannel;
use crate::error::{FeedError, StorageError};
use crate::feed::{Feed, fetch_feed};
use crate::http::HttpClient;

use super::backing::{KeyValueStore, StoreKey, StoreRecord};

/// The persisted subscription lists: feed URLs and live channels.
///
/// Mutations are read-modify-write cycles under one mutex (same discipline
/// as the progress store) and announce themselves on the sync broadcaster.
/// The broadcasts are advisory; other surfaces reload the lists from the
/// store when they activate.
pub struct Library<S: KeyValueStore> {
    backing: Arc<S>,
    broadcaster: Broadcaster,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> Library<S> {
    pub fn new(backing: Arc<S>, broadcaster: Broadcaster) -> Self {
        Self {
            backing,
            broadcaster,
            write_lock: Mutex::new(()),
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub async fn feeds(&self) -> Result<Vec<String>, StorageError> {
        let record = self.backing.get(&[StoreKey::Feeds]).await?;
        Ok(record.feeds.unwrap_or_default())
    }

    /// Add a feed URL. Returns `false` if it is already subscribed.
    pub async fn add_feed(&self, url: &Url) -> Result<bool, StorageError> {
        let added = {
            let _guard = self.write_lock.lock().await;
            let mut feeds = self.feeds().await?;
            let url = url.to_string();
            if feeds.contains(&url) {
                false
            } else {
                feeds.push(url);
                self.backing
                    .set(StoreRecord {
                        feeds: Some(feeds),
                        ..Default::default()
                    })
                    .await?;
                true
            }
        };

        if added {
            self.broadcaster.broadcast(SyncEvent::FeedAdded);
        }
        Ok(added)
    }

    /// Remove a feed URL. Progress and played marks for its episodes are
    /// kept, so re-adding the feed restores them.
    pub async fn remove_feed(&self, url: &str) -> Result<bool, StorageError> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut feeds = self.feeds().await?;
            let before = feeds.len();
            feeds.retain(|f| f != url);
            if feeds.len() == before {
                false
            } else {
                self.backing
                    .set(StoreRecord {
                        feeds: Some(feeds),
                        ..Default::default()
                    })
                    .await?;
                true
            }
        };

        if removed {
            self.broadcaster.broadcast(SyncEvent::FeedRemoved);
        }
        Ok(removed)
    }

    pub async fn channels(&self) -> Result<Vec<LiveChannel>, StorageError> {
        let record = self.backing.get(&[StoreKey::LiveChannels]).await?;
        Ok(record.live_channels.unwrap_or_default())
    }

    /// Add a live channel, keyed by URL. Returns `false` on duplicates.
    pub async fn add_channel(&self, channel: LiveChannel) -> Result<bool, StorageError> {
        let added = {
            let _guard = self.write_lock.lock().await;
            let mut channels = self.channels().await?;
            if channels.iter().any(|c| c.url == channel.url) {
                false
            } else {
                channels.push(channel);
                self.backing
                    .set(StoreRecord {
                        live_channels: Some(channels),
                        ..Default::default()
                    })
                    .await?;
                true
            }
        };

        if added {
            self.broadcaster.broadcast(SyncEvent::ConfigImported);
        }
        Ok(added)
    }

    pub async fn remove_channel(&self, url: &str) -> Result<bool, StorageError> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut channels = self.channels().await?;
            let before = channels.len();
            channels.retain(|c| c.url != url);
            if channels.len() == before {
                false
            } else {
                self.backing
                    .set(StoreRecord {
                        live_channels: Some(channels),
                        ..Default::default()
                    })
                    .await?;
                true
            }
        };

        if removed {
            self.broadcaster.broadcast(SyncEvent::ConfigImported);
        }
        Ok(removed)
    }

    /// Fetch and normalize every subscribed feed concurrently. Each feed
    /// fails or succeeds on its own; one broken feed never poisons the
    /// batch.
    pub async fn refresh_all<C: HttpClient>(
        &self,
        client: &C,
    ) -> Result<Vec<(String, Result<Feed, FeedError>)>, StorageError> {
        let feeds = self.feeds().await?;

        let fetches = feeds.iter().map(|url| fetch_feed(client, url));
        let results = futures::future::join_all(fetches).await;

        Ok(feeds.into_iter().zip(results).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::store::backing::InMemoryStore;

    fn library() -> Library<InMemoryStore> {
        Library::new(Arc::new(InMemoryStore::new()), Broadcaster::default())
    }

    fn feed_url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn add_feed_rejects_duplicates() {
        let library = library();
        let url = feed_url("https://example.com/feed.xml");

        assert!(library.add_feed(&url).await.unwrap());
        assert!(!library.add_feed(&url).await.unwrap());
        assert_eq!(library.feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_and_remove_feed_broadcast_tags() {
        let library = library();
        let mut rx = library.broadcaster().subscribe();
        let url = feed_url("https://example.com/feed.xml");

        library.add_feed(&url).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::FeedAdded);

        library.remove_feed(url.as_str()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::FeedRemoved);
    }

    #[tokio::test]
    async fn removing_unknown_feed_is_quiet() {
        let library = library();
        let mut rx = library.broadcaster().subscribe();

        assert!(!library.remove_feed("https://example.com/gone.xml").await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn channels_are_keyed_by_url() {
        let library = library();

        let channel = LiveChannel::new("FIP", "https://stream.example/fip", "eclectic radio");
        assert!(library.add_channel(channel.clone()).await.unwrap());

        let same_url = LiveChannel::new("FIP again", "https://stream.example/fip", "");
        assert!(!library.add_channel(same_url).await.unwrap());

        assert!(library.remove_channel("https://stream.example/fip").await.unwrap());
        assert!(library.channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_edits_broadcast_config_imported() {
        let library = library();
        let mut rx = library.broadcaster().subscribe();

        library
            .add_channel(LiveChannel::new("FIP", "https://stream.example/fip", ""))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::ConfigImported);
    }

    struct FlakyClient;

    #[async_trait]
    impl HttpClient for FlakyClient {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
            if url.contains("good") {
                Ok(Bytes::from_static(
                    br#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Good</title>
    <description>D</description>
    <item>
      <title>Ep</title>
      <enclosure url="https://example.com/ep.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#,
                ))
            } else {
                // Malformed body stands in for an unreachable host; both
                // are per-feed failures
                Ok(Bytes::from_static(b"<garbage"))
            }
        }
    }

    #[tokio::test]
    async fn refresh_all_isolates_per_feed_failures() {
        let library = library();
        library
            .add_feed(&feed_url("https://example.com/good.xml"))
            .await
            .unwrap();
        library
            .add_feed(&feed_url("https://example.com/broken.xml"))
            .await
            .unwrap();

        let results = library.refresh_all(&FlakyClient).await.unwrap();
        assert_eq!(results.len(), 2);

        let good = results.iter().find(|(u, _)| u.contains("good")).unwrap();
        assert!(good.1.is_ok());

        let broken = results.iter().find(|(u, _)| u.contains("broken")).unwrap();
        assert!(matches!(broken.1, Err(FeedError::ParseFailed { .. })));
    }
}
