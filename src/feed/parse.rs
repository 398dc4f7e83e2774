// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use url::Url;

use crate::error::FeedError;

/// A normalized feed: the ordered episode list plus feed-level aggregates.
///
/// Identity is the feed URL. A refresh produces a whole new `Feed`; stored
/// progress and played state are matched back by episode URL, never by
/// position in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    /// Feed URL, the stable identity of this feed
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Episodes in feed-document order (assumed reverse-chronological)
    pub episodes: Vec<Episode>,
    /// Most recent publication date across all episodes
    pub latest_date: Option<DateTime<FixedOffset>>,
}

impl Feed {
    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    /// Opt-in check for callers that require at least one episode.
    /// An empty feed is valid by default.
    pub fn ensure_non_empty(&self) -> Result<(), FeedError> {
        if self.episodes.is_empty() {
            return Err(FeedError::Empty {
                url: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// A single playable episode. Identity is the enclosure URL: the same URL
/// seen across refreshes is the same episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    /// Enclosure URL, the stable identity of this episode
    pub id: String,
    pub title: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    /// URL of the feed this episode belongs to
    pub source_feed_id: String,
    pub description: Option<String>,
}

/// Parse raw feed XML into a normalized `Feed`.
///
/// Entries without a playable audio enclosure are dropped silently. Pure
/// with respect to its inputs: the same document always yields the same
/// `Feed`.
pub fn parse_feed(xml_bytes: &[u8], feed_url: &Url) -> Result<Feed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes).map_err(|e| FeedError::ParseFailed {
        url: feed_url.to_string(),
        source: e,
    })?;

    let feed_id = feed_url.to_string();

    let episodes: Vec<Episode> = channel
        .items()
        .iter()
        .filter_map(|item| parse_episode(item, &feed_id))
        .collect();

    // Document order is not guaranteed to be strictly by date, so the
    // latest date is found by scanning every entry rather than taking the
    // first one.
    let latest_date = episodes.iter().filter_map(|e| e.published_at).max();

    let title = Some(channel.title().trim())
        .filter(|t| !t.is_empty())
        .map(decode_text)
        .or_else(|| feed_url.host_str().map(String::from))
        .unwrap_or_else(|| feed_id.clone());

    Ok(Feed {
        id: feed_id,
        title,
        description: Some(channel.description())
            .filter(|s| !s.is_empty())
            .map(decode_text),
        episodes,
        latest_date,
    })
}

fn parse_episode(item: &rss::Item, feed_id: &str) -> Option<Episode> {
    let enclosure = item.enclosure().filter(|e| is_playable(e))?;

    let title = item
        .title()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(decode_text)
        .unwrap_or_else(|| "Untitled".to_string());

    // Entries with unparseable dates stay in the list; they just don't
    // participate in the latest-date aggregate.
    let published_at = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str)
            .or_else(|_| parse_relaxed_date(date_str))
            .ok()
    });

    Some(Episode {
        id: enclosure.url().to_string(),
        title,
        published_at,
        source_feed_id: feed_id.to_string(),
        description: item.description().map(decode_text),
    })
}

/// An entry is audio-eligible only if its enclosure is playable: an
/// `audio/*` MIME type, or a known audio file extension when the feed
/// omits the type.
fn is_playable(enclosure: &rss::Enclosure) -> bool {
    let mime = enclosure.mime_type().trim();
    if !mime.is_empty() {
        return mime.starts_with("audio/");
    }

    const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "m4b", "aac", "ogg", "opus", "flac", "wav"];

    let path = enclosure.url().split(['?', '#']).next().unwrap_or("");
    path.rsplit('.')
        .next()
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn decode_text(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Ok(dt);
        }
    }

    Err(chrono::DateTime::parse_from_rfc2822("invalid").unwrap_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast for unit testing</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 2</title>
      <description>Second episode</description>
      <pubDate>Mon, 08 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep2.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 1</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Video Special</title>
      <enclosure url="https://example.com/special.mp4" type="video/mp4"/>
    </item>
    <item>
      <title>Show Notes Only</title>
    </item>
  </channel>
</rss>"#;

    fn feed_url() -> Url {
        Url::parse("https://example.com/feed.xml").unwrap()
    }

    #[test]
    fn parse_feed_extracts_feed_metadata() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes(), &feed_url()).unwrap();

        assert_eq!(feed.id, "https://example.com/feed.xml");
        assert_eq!(feed.title, "Test Podcast");
        assert_eq!(
            feed.description,
            Some("A test podcast for unit testing".to_string())
        );
    }

    #[test]
    fn parse_feed_keeps_only_audio_enclosures() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes(), &feed_url()).unwrap();

        assert_eq!(feed.episode_count(), 2);
        assert!(feed.episodes.iter().all(|e| e.id.ends_with(".mp3")));
    }

    #[test]
    fn parse_feed_preserves_document_order() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes(), &feed_url()).unwrap();

        assert_eq!(feed.episodes[0].title, "Episode 2");
        assert_eq!(feed.episodes[1].title, "Episode 1");
    }

    #[test]
    fn parse_feed_computes_latest_date_by_scanning() {
        // Oldest entry listed first: document order must not decide
        let out_of_order = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title>
    <description>D</description>
    <item>
      <title>Old</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/old.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>New</title>
      <pubDate>Mon, 08 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/new.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(out_of_order.as_bytes(), &feed_url()).unwrap();
        let latest = feed.latest_date.unwrap();
        assert_eq!(latest, feed.episodes[1].published_at.unwrap());
    }

    #[test]
    fn unparseable_dates_excluded_from_latest_but_episode_kept() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title>
    <description>D</description>
    <item>
      <title>Bad Date</title>
      <pubDate>sometime last week</pubDate>
      <enclosure url="https://example.com/bad.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(xml.as_bytes(), &feed_url()).unwrap();
        assert_eq!(feed.episode_count(), 1);
        assert!(feed.episodes[0].published_at.is_none());
        assert!(feed.latest_date.is_none());
    }

    #[test]
    fn missing_episode_title_defaults_to_untitled() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title>
    <description>D</description>
    <item>
      <enclosure url="https://example.com/ep.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(xml.as_bytes(), &feed_url()).unwrap();
        assert_eq!(feed.episodes[0].title, "Untitled");
    }

    #[test]
    fn missing_feed_title_falls_back_to_host() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title></title>
    <description>D</description>
  </channel>
</rss>"#;

        let feed = parse_feed(xml.as_bytes(), &feed_url()).unwrap();
        assert_eq!(feed.title, "example.com");
    }

    #[test]
    fn entity_encoded_titles_are_decoded() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Tom &amp;amp; Jerry</title>
    <description>D</description>
    <item>
      <title>Q&amp;amp;A</title>
      <enclosure url="https://example.com/qa.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(xml.as_bytes(), &feed_url()).unwrap();
        assert_eq!(feed.title, "Tom & Jerry");
        assert_eq!(feed.episodes[0].title, "Q&A");
    }

    #[test]
    fn enclosure_without_mime_matched_by_extension() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title>
    <description>D</description>
    <item>
      <title>No Mime</title>
      <enclosure url="https://example.com/ep.mp3?session=4711" type=""/>
    </item>
    <item>
      <title>Not Audio</title>
      <enclosure url="https://example.com/cover.jpg" type=""/>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(xml.as_bytes(), &feed_url()).unwrap();
        assert_eq!(feed.episode_count(), 1);
        assert_eq!(feed.episodes[0].title, "No Mime");
    }

    #[test]
    fn empty_feed_is_valid_until_required() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>T</title>
    <description>D</description>
  </channel>
</rss>"#;

        let feed = parse_feed(xml.as_bytes(), &feed_url()).unwrap();
        assert!(feed.episodes.is_empty());
        assert!(matches!(
            feed.ensure_non_empty(),
            Err(FeedError::Empty { .. })
        ));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_feed(b"this is not xml <", &feed_url());
        assert!(matches!(result, Err(FeedError::ParseFailed { .. })));
    }

    #[test]
    fn parse_feed_is_idempotent() {
        let first = parse_feed(SAMPLE_FEED.as_bytes(), &feed_url()).unwrap();
        let second = parse_feed(SAMPLE_FEED.as_bytes(), &feed_url()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn episodes_carry_their_source_feed() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes(), &feed_url()).unwrap();
        assert!(
            feed.episodes
                .iter()
                .all(|e| e.source_feed_id == "https://example.com/feed.xml")
        );
    }
}
