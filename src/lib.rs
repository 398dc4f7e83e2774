pub mod broadcast;
pub mod channel;
pub mod error;
pub mod events;
pub mod feed;
pub mod http;
pub mod pagination;
pub mod player;
pub mod store;

// Re-export main types for convenience
pub use broadcast::{Broadcaster, SyncEvent};
pub use channel::LiveChannel;
pub use error::{FeedError, MediaError, StorageError};
pub use events::{EventSink, NoopSink, PlayerEvent, SharedEventSink};
pub use feed::{Episode, Feed, fetch_feed, parse_feed};
pub use http::{HttpClient, ReqwestClient};
pub use pagination::{DEFAULT_BATCH_SIZE, RevealPage, reveal};
pub use player::{
    MediaBackend, PROGRESS_SAVE_INTERVAL, PlaybackController, SessionSnapshot, SessionState,
    SourceKind,
};
pub use store::{
    InMemoryStore, JsonFileStore, KeyValueStore, Library, PlaybackProgress, ProgressStore,
    StoreChange, StoreKey, StoreRecord,
};
