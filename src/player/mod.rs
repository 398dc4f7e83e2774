// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod backend;
mod classify;

pub use backend::MediaBackend;
pub use classify::SourceKind;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channel::LiveChannel;
use crate::error::{MediaError, StorageError};
use crate::events::{PlayerEvent, SharedEventSink};
use crate::store::{KeyValueStore, PlaybackProgress, ProgressStore};

/// How often playing progress is flushed to the store.
pub const PROGRESS_SAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Session state machine. `Idle` is initial; `Ended` and `Error` are
/// terminal for their session, but any state accepts a fresh `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

/// Read-only view of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub active_url: Option<String>,
    pub title: Option<String>,
    pub kind: Option<SourceKind>,
}

struct SessionInner {
    state: SessionState,
    active_url: Option<String>,
    title: Option<String>,
    feed_id: Option<String>,
    kind: SourceKind,
    /// Bumped whenever a session is superseded. In-flight starts and the
    /// tick task compare against it and stand down when they lost.
    generation: u64,
    tick: Option<JoinHandle<()>>,
}

impl SessionInner {
    fn abort_tick(&mut self) {
        if let Some(handle) = self.tick.take() {
            handle.abort();
        }
    }

    fn clear_active(&mut self) {
        self.active_url = None;
        self.title = None;
        self.feed_id = None;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            active_url: self.active_url.clone(),
            title: self.title.clone(),
            kind: self.active_url.is_some().then_some(self.kind),
        }
    }
}

enum Arbitration {
    /// Same URL already playing: user-facing toggle to paused
    TogglePause,
    /// Same URL paused: continue where it stands, no seek
    Resume { generation: u64 },
    /// Same URL already loading: nothing to do
    AlreadyStarting,
    /// Different (or no) source: tear down and start fresh
    Switch {
        generation: u64,
        outgoing_episode: Option<String>,
    },
}

/// Owns the single audio output and arbitrates which logical source holds
/// it. Every playback entry point, episodes and live channels alike, goes
/// through here, so at most one URL is ever in `Playing` or `Paused`.
///
/// Every transition reads or writes the progress store; the store's own
/// write serialization keeps the periodic tick and explicit writes from
/// losing updates.
pub struct PlaybackController<B: MediaBackend + 'static, S: KeyValueStore + 'static> {
    backend: Arc<B>,
    store: Arc<ProgressStore<S>>,
    events: SharedEventSink,
    inner: Arc<Mutex<SessionInner>>,
    tick_period: Duration,
}

impl<B: MediaBackend + 'static, S: KeyValueStore + 'static> PlaybackController<B, S> {
    pub fn new(backend: Arc<B>, store: Arc<ProgressStore<S>>, events: SharedEventSink) -> Self {
        Self::with_tick_period(backend, store, events, PROGRESS_SAVE_INTERVAL)
    }

    pub fn with_tick_period(
        backend: Arc<B>,
        store: Arc<ProgressStore<S>>,
        events: SharedEventSink,
        tick_period: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            events,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                active_url: None,
                title: None,
                feed_id: None,
                kind: SourceKind::Episode,
                generation: 0,
                tick: None,
            })),
            tick_period,
        }
    }

    pub async fn session(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Start (or toggle) playback of a source.
    ///
    /// Calling this for the URL that is currently `Playing` pauses it;
    /// for the URL that is `Paused` it resumes. Any other URL supersedes
    /// the current session: the outgoing episode's progress is persisted
    /// before the incoming episode's saved position is read, and a saved
    /// position is only restored when the episode is not marked played
    /// for its feed. Live sources never seek and never persist.
    pub async fn play(
        &self,
        url: &str,
        title: &str,
        feed_id: Option<&str>,
    ) -> Result<(), MediaError> {
        let arbitration = {
            let mut inner = self.inner.lock().await;
            if inner.active_url.as_deref() == Some(url) {
                match inner.state {
                    SessionState::Playing => Arbitration::TogglePause,
                    SessionState::Paused => Arbitration::Resume {
                        generation: inner.generation,
                    },
                    SessionState::Loading => Arbitration::AlreadyStarting,
                    _ => self.prepare_switch(&mut inner, url, title, feed_id),
                }
            } else {
                self.prepare_switch(&mut inner, url, title, feed_id)
            }
        };

        match arbitration {
            Arbitration::TogglePause => {
                self.pause().await;
                Ok(())
            }
            Arbitration::AlreadyStarting => Ok(()),
            Arbitration::Resume { generation } => {
                match self.backend.start().await {
                    Ok(()) => {
                        self.finish_start(generation, url).await;
                        Ok(())
                    }
                    Err(error) => self.fail_start(generation, url, error).await,
                }
            }
            Arbitration::Switch {
                generation,
                outgoing_episode,
            } => {
                self.events.emit(PlayerEvent::StateChanged {
                    state: SessionState::Loading,
                    active_url: Some(url.to_string()),
                    title: Some(title.to_string()),
                });

                self.backend.pause().await;

                // The outgoing write must be issued before the incoming
                // saved-position read.
                if let Some(prev_url) = outgoing_episode {
                    self.persist_current_position(&prev_url, true).await;
                }

                let kind = SourceKind::classify(url);
                let resume_at = if kind.is_live() {
                    None
                } else {
                    self.saved_position(url, feed_id).await
                };

                self.backend.load(url).await;
                if let Some(position) = resume_at {
                    self.backend.seek(position).await;
                }

                match self.backend.start().await {
                    Ok(()) => {
                        self.finish_start(generation, url).await;
                        Ok(())
                    }
                    Err(error) => self.fail_start(generation, url, error).await,
                }
            }
        }
    }

    /// Convenience entry point for live channels; same arbitration as
    /// episodes, so starting a channel displaces any playing episode.
    pub async fn play_channel(&self, channel: &LiveChannel) -> Result<(), MediaError> {
        self.play(&channel.url, &channel.name, None).await
    }

    /// Pause the active source. Valid only while `Playing`; persists the
    /// current position (episodes only) before transitioning.
    pub async fn pause(&self) {
        let (generation, url, kind) = {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Playing {
                return;
            }
            inner.abort_tick();
            let Some(url) = inner.active_url.clone() else {
                return;
            };
            (inner.generation, url, inner.kind)
        };

        if !kind.is_live() {
            self.persist_current_position(&url, false).await;
        }
        self.backend.pause().await;

        let snapshot = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation || inner.state != SessionState::Playing {
                return;
            }
            inner.state = SessionState::Paused;
            inner.snapshot()
        };
        self.emit_state(snapshot);
    }

    /// The active episode reached its natural end. Persists a
    /// position-equals-duration record (complete without forcing the
    /// played mark) and releases the session.
    pub async fn handle_ended(&self) {
        let (generation, url, kind) = {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Playing {
                return;
            }
            let Some(url) = inner.active_url.clone() else {
                return;
            };
            inner.abort_tick();
            inner.generation += 1;
            (inner.generation, url, inner.kind)
        };

        if !kind.is_live()
            && let Some(duration) = self.backend.duration().await
        {
            let progress = PlaybackProgress::new(duration, Some(duration), Utc::now());
            if let Err(e) = self.store.set_progress(&url, progress).await {
                tracing::warn!("could not save final position for {url}: {e}");
            }
        }

        let snapshot = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            inner.state = SessionState::Ended;
            inner.clear_active();
            inner.snapshot()
        };
        self.emit_state(snapshot);
    }

    /// The output signalled a failure for the active source. Nothing is
    /// persisted; the session ends in `Error` with a classified message.
    pub async fn handle_error(&self, error: MediaError) {
        let url = {
            let mut inner = self.inner.lock().await;
            if !matches!(inner.state, SessionState::Loading | SessionState::Playing) {
                return;
            }
            let Some(url) = inner.active_url.clone() else {
                return;
            };
            inner.abort_tick();
            inner.generation += 1;
            inner.state = SessionState::Error;
            inner.clear_active();
            url
        };

        self.events.emit(PlayerEvent::StateChanged {
            state: SessionState::Error,
            active_url: None,
            title: None,
        });
        self.events.emit(PlayerEvent::error(url, &error));
    }

    /// Mark or unmark an episode as played. Marking the currently active
    /// URL played also stops playback and clears the session; this is the
    /// one place played-state and session-state are coupled.
    pub async fn mark_played(
        &self,
        feed_id: &str,
        url: &str,
        played: bool,
    ) -> Result<(), StorageError> {
        self.store.set_played(feed_id, url, played).await?;

        if !played {
            return Ok(());
        }

        let stopped = {
            let mut inner = self.inner.lock().await;
            if inner.active_url.as_deref() == Some(url) {
                inner.abort_tick();
                inner.generation += 1;
                inner.state = SessionState::Idle;
                inner.clear_active();
                true
            } else {
                false
            }
        };

        if stopped {
            self.backend.pause().await;
            self.events.emit(PlayerEvent::StateChanged {
                state: SessionState::Idle,
                active_url: None,
                title: None,
            });
        }
        Ok(())
    }

    /// Release the audio output and stop the progress timer.
    pub async fn dispose(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.abort_tick();
            inner.generation += 1;
            inner.state = SessionState::Idle;
            inner.clear_active();
        }
        self.backend.pause().await;
    }

    fn prepare_switch(
        &self,
        inner: &mut SessionInner,
        url: &str,
        title: &str,
        feed_id: Option<&str>,
    ) -> Arbitration {
        inner.abort_tick();
        inner.generation += 1;

        let outgoing_episode = match (&inner.active_url, inner.state) {
            (Some(prev), SessionState::Playing | SessionState::Paused)
                if !inner.kind.is_live() =>
            {
                Some(prev.clone())
            }
            _ => None,
        };

        inner.state = SessionState::Loading;
        inner.active_url = Some(url.to_string());
        inner.title = Some(title.to_string());
        inner.feed_id = feed_id.map(String::from);
        inner.kind = SourceKind::classify(url);

        Arbitration::Switch {
            generation: inner.generation,
            outgoing_episode,
        }
    }

    /// Persist the backend's current position for `url`. Storage failures
    /// here degrade one save, never the session.
    async fn persist_current_position(&self, url: &str, require_duration: bool) {
        let position = self.backend.position().await;
        let duration = self.backend.duration().await;

        if position <= 0.0 || (require_duration && duration.is_none()) {
            return;
        }

        let progress = PlaybackProgress::new(position, duration, Utc::now());
        if let Err(e) = self.store.set_progress(url, progress).await {
            tracing::warn!("could not save progress for {url}: {e}");
        }
    }

    /// Saved position to restore, unless the episode is marked played for
    /// its feed. Storage failures fall back to starting at zero.
    async fn saved_position(&self, url: &str, feed_id: Option<&str>) -> Option<f64> {
        let saved = match self.store.progress(url).await {
            Ok(saved) => saved?,
            Err(e) => {
                tracing::warn!("could not read saved position for {url}: {e}");
                return None;
            }
        };

        if saved.current_time <= 0.0 {
            return None;
        }

        if let Some(feed_id) = feed_id {
            let played = self.store.is_played(feed_id, url).await.unwrap_or_else(|e| {
                tracing::warn!("could not read played mark for {url}: {e}");
                false
            });
            if played {
                return None;
            }
        }

        Some(saved.current_time)
    }

    async fn finish_start(&self, generation: u64, url: &str) {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                // A newer session superseded this start while it was in
                // flight; its success belongs to nobody.
                tracing::debug!("discarding stale start completion for {url}");
                return;
            }
            inner.state = SessionState::Playing;
            if !inner.kind.is_live() {
                inner.tick = Some(self.spawn_tick(generation, url.to_string()));
            }
            inner.snapshot()
        };
        self.emit_state(snapshot);
    }

    async fn fail_start(
        &self,
        generation: u64,
        url: &str,
        error: MediaError,
    ) -> Result<(), MediaError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                tracing::debug!("discarding stale start failure for {url}");
                return Ok(());
            }
            inner.state = SessionState::Error;
            inner.clear_active();
        }

        self.events.emit(PlayerEvent::StateChanged {
            state: SessionState::Error,
            active_url: None,
            title: None,
        });
        self.events.emit(PlayerEvent::error(url, &error));
        Err(error)
    }

    fn spawn_tick(&self, generation: u64, url: String) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        let inner = Arc::clone(&self.inner);
        let period = self.tick_period;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick of a tokio interval fires immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                {
                    let inner = inner.lock().await;
                    if inner.generation != generation || inner.state != SessionState::Playing {
                        break;
                    }
                }

                let position = backend.position().await;
                let duration = backend.duration().await;
                if position <= 0.0 {
                    continue;
                }

                let progress = PlaybackProgress::new(position, duration, Utc::now());
                match store.set_progress(&url, progress).await {
                    Ok(()) => events.emit(PlayerEvent::ProgressChanged {
                        url: url.clone(),
                        current_time: position,
                        duration,
                    }),
                    // Skipped, not retried: the next tick or an explicit
                    // pause-time write will try again.
                    Err(e) => tracing::warn!("periodic progress save skipped for {url}: {e}"),
                }
            }
        })
    }

    fn emit_state(&self, snapshot: SessionSnapshot) {
        self.events.emit(PlayerEvent::StateChanged {
            state: snapshot.state,
            active_url: snapshot.active_url,
            title: snapshot.title,
        });
    }
}
