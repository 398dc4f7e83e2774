// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;

use crate::error::MediaError;

/// The single physical audio output.
///
/// Exactly one `PlaybackController` owns an implementation of this trait;
/// no other component may set its source. Episode and live playback both
/// go through the same owner, which is what keeps the at-most-one-active
/// invariant enforceable.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Point the output at a new source URL without starting it. Resets
    /// the playhead to zero.
    async fn load(&self, url: &str);

    /// Begin playback of the loaded source. Failures come back already
    /// classified.
    async fn start(&self) -> Result<(), MediaError>;

    /// Halt output, keeping the source and playhead.
    async fn pause(&self);

    /// Move the playhead, in seconds. Meaningless for live streams.
    async fn seek(&self, position: f64);

    /// Current playhead in seconds.
    async fn position(&self) -> f64;

    /// Total duration in seconds, once the media has been probed.
    async fn duration(&self) -> Option<f64>;
}
