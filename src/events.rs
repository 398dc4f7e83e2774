use std::sync::Arc;

use crate::error::MediaError;
use crate::player::SessionState;

/// Events emitted at the rendering boundary. The UI consumes these to
/// redraw; the core never waits for it to do so.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The session state machine moved
    StateChanged {
        state: SessionState,
        /// URL holding the session, if any
        active_url: Option<String>,
        /// Display title of the active source
        title: Option<String>,
    },

    /// Playhead moved on the active source
    ProgressChanged {
        url: String,
        current_time: f64,
        duration: Option<f64>,
    },

    /// Playback failed with a classified, user-facing message
    ErrorOccurred { url: String, message: String },
}

impl PlayerEvent {
    pub fn error(url: impl Into<String>, error: &MediaError) -> Self {
        Self::ErrorOccurred {
            url: url.into(),
            message: error.to_string(),
        }
    }
}

/// Trait for observing player events.
///
/// Implementations can use this to update play buttons, progress bars,
/// or the now-playing line.
pub trait EventSink: Send + Sync {
    /// Handle a player event
    fn emit(&self, event: PlayerEvent);
}

/// A shared reference to an event sink
pub type SharedEventSink = Arc<dyn EventSink>;

/// A no-op sink that silently ignores all events.
/// Useful for tests or headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: PlayerEvent) {
        // Intentionally empty
    }
}

impl NoopSink {
    /// Create a new NoopSink wrapped in an Arc
    pub fn shared() -> SharedEventSink {
        Arc::new(Self)
    }
}
