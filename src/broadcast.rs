use tokio::sync::broadcast;

/// Advisory change notifications between surfaces.
///
/// A tag means "something changed, re-derive your view from the store".
/// Tags carry no payload; every surface must be able to rebuild its full
/// view from the store alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    FeedAdded,
    FeedRemoved,
    ConfigImported,
    ConfigUpdated,
}

/// Fire-and-forget fan-out channel. No acknowledgment, no retry, no
/// ordering guarantee across listeners; a slow receiver that lags simply
/// misses events.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<SyncEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send a tag to whoever is currently listening. Having no listeners
    /// is not an error.
    pub fn broadcast(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_without_receivers_does_not_panic() {
        let broadcaster = Broadcaster::default();
        broadcaster.broadcast(SyncEvent::FeedAdded);
    }

    #[tokio::test]
    async fn all_subscribers_receive_the_tag() {
        let broadcaster = Broadcaster::default();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        broadcaster.broadcast(SyncEvent::ConfigImported);

        assert_eq!(rx1.recv().await.unwrap(), SyncEvent::ConfigImported);
        assert_eq!(rx2.recv().await.unwrap(), SyncEvent::ConfigImported);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_tags() {
        let broadcaster = Broadcaster::default();
        broadcaster.broadcast(SyncEvent::FeedRemoved);

        let mut late = broadcaster.subscribe();
        broadcaster.broadcast(SyncEvent::ConfigUpdated);

        // Only the tag sent after subscribing arrives; the receiver is
        // expected to re-derive its view from the store anyway.
        assert_eq!(late.recv().await.unwrap(), SyncEvent::ConfigUpdated);
    }
}
