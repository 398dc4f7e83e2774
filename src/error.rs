use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or normalizing a feed.
///
/// Feed errors are scoped to a single feed: one failing feed never aborts
/// work on the others.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse feed from {url}: {source}")]
    ParseFailed {
        url: String,
        #[source]
        source: rss::Error,
    },

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed {url} contains no playable episodes")]
    Empty { url: String },
}

/// Classified playback failures, surfaced to the UI with a user-facing
/// message. A media error terminates the current session only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("playback was interrupted")]
    Aborted,

    #[error("network error while loading media")]
    NetworkFailure,

    #[error("media could not be decoded")]
    DecodeFailure,

    #[error("audio format not supported")]
    FormatUnsupported,

    #[error("playback was blocked")]
    Blocked,

    #[error("playback failed: {0}")]
    Unknown(String),
}

/// Errors from the persistent backing store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read store file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize store record: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_error_messages_are_user_facing() {
        assert_eq!(
            MediaError::FormatUnsupported.to_string(),
            "audio format not supported"
        );
        assert_eq!(MediaError::Blocked.to_string(), "playback was blocked");
        assert_eq!(
            MediaError::Unknown("boom".to_string()).to_string(),
            "playback failed: boom"
        );
    }
}
