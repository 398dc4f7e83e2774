use crate::feed::Episode;

/// Episodes revealed per "show more" step.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// One page of an incremental reveal.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealPage<'a> {
    /// Episodes visible after this reveal
    pub shown: &'a [Episode],
    /// Episodes not yet revealed
    pub remaining: &'a [Episode],
    pub has_more: bool,
}

/// Incrementally reveal episodes in batches. Pure: the caller owns the
/// cumulative `from_index` state.
///
/// The initial reveal is widened by the number of already-played episodes
/// within the first `batch_size` window; marking items played must not
/// make previously visible episodes disappear.
pub fn reveal<'a, F>(
    episodes: &'a [Episode],
    from_index: usize,
    batch_size: usize,
    is_played: F,
) -> RevealPage<'a>
where
    F: Fn(&Episode) -> bool,
{
    let mut end = from_index.saturating_add(batch_size);

    if from_index == 0 {
        let played_in_first_batch = episodes
            .iter()
            .take(batch_size)
            .filter(|e| is_played(e))
            .count();
        end += played_in_first_batch;
    }

    let end = end.min(episodes.len());
    let start = from_index.min(end);

    RevealPage {
        shown: &episodes[start..end],
        remaining: &episodes[end..],
        has_more: end < episodes.len(),
    }
}
