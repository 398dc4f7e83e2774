mod backing;
mod library;
mod progress;

pub use backing::{InMemoryStore, JsonFileStore, KeyValueStore, StoreChange, StoreKey, StoreRecord};
pub use library::Library;
pub use progress::{PlaybackProgress, ProgressStore};
