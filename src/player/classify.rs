/// How the controller treats the active source. Decided once per session
/// from the URL and fixed for the session's lifetime; everything else in
/// the controller matches on the variant instead of re-testing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Finite on-demand audio: seeks, saves progress, can end.
    Episode,
    /// Continuous stream: no duration, no seeking, no progress.
    Live,
}

impl SourceKind {
    /// Heuristic live detection: playlist-manifest extensions or
    /// stream-indicating tokens in the URL.
    pub fn classify(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains(".m3u8")
            || lower.contains(".pls")
            || lower.contains("stream")
            || lower.contains("live")
        {
            SourceKind::Live
        } else {
            SourceKind::Episode
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, SourceKind::Live)
    }
}
