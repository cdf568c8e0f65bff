//! Canonical play events produced by every format adapter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artist used when an export omits one.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Album used when an export omits one, and for podcast episodes.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Show used for podcast episodes exported without a show name.
pub const UNKNOWN_SHOW: &str = "Unknown Show";

/// Spotify's end reason for a play that reached the end of the track.
const END_REASON_TRACK_DONE: &str = "trackdone";

/// Service that produced an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Spotify,
    AppleMusic,
    YoutubeMusic,
}

impl Source {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::AppleMusic => "apple_music",
            Self::YoutubeMusic => "youtube_music",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spotify" => Ok(Self::Spotify),
            "apple_music" => Ok(Self::AppleMusic),
            "youtube_music" => Ok(Self::YoutubeMusic),
            _ => Err(format!("invalid source: {s}")),
        }
    }
}

/// One listen, after normalization from any export format.
///
/// Podcast episodes reuse `track_name` for the episode and `artist_name` for
/// the show so that name-based tallies treat both kinds uniformly; the
/// `episode_name`/`show_name` fields mark the event as a podcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    /// When the play ended or was recorded.
    pub timestamp: DateTime<Utc>,
    pub duration_played_ms: i64,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<i64>,
    /// The listener skipped ahead before the play ended.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

/// Trims a name and drops it when nothing is left.
pub(crate) fn clean_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl PlayEvent {
    /// Creates a music play, substituting sentinels for a missing artist or album.
    pub fn track(
        track_name: impl Into<String>,
        artist_name: Option<&str>,
        album_name: Option<&str>,
        timestamp: DateTime<Utc>,
        duration_played_ms: i64,
        source: Source,
    ) -> Self {
        Self {
            track_name: track_name.into(),
            artist_name: clean_name(artist_name).unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album_name: clean_name(album_name).unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            timestamp,
            duration_played_ms: duration_played_ms.max(0),
            source,
            show_name: None,
            episode_name: None,
            end_reason: None,
            total_duration_ms: None,
            skipped: false,
        }
    }

    /// Creates a podcast episode play.
    pub fn episode(
        episode_name: impl Into<String>,
        show_name: Option<&str>,
        timestamp: DateTime<Utc>,
        duration_played_ms: i64,
        source: Source,
    ) -> Self {
        let episode_name = episode_name.into();
        let show_name = clean_name(show_name).unwrap_or_else(|| UNKNOWN_SHOW.to_string());
        Self {
            track_name: episode_name.clone(),
            artist_name: show_name.clone(),
            album_name: UNKNOWN_ALBUM.to_string(),
            timestamp,
            duration_played_ms: duration_played_ms.max(0),
            source,
            show_name: Some(show_name),
            episode_name: Some(episode_name),
            end_reason: None,
            total_duration_ms: None,
            skipped: false,
        }
    }

    #[must_use]
    pub fn with_end_reason(mut self, end_reason: Option<&str>) -> Self {
        self.end_reason = clean_name(end_reason);
        self
    }

    #[must_use]
    pub const fn with_skipped(mut self, skipped: bool) -> Self {
        self.skipped = skipped;
        self
    }

    #[must_use]
    pub fn with_total_duration(mut self, total_duration_ms: Option<i64>) -> Self {
        self.total_duration_ms = total_duration_ms.filter(|ms| *ms > 0);
        self
    }

    pub const fn is_podcast(&self) -> bool {
        self.episode_name.is_some()
    }

    /// Whether the album is a real value rather than the sentinel.
    pub fn has_album(&self) -> bool {
        self.album_name != UNKNOWN_ALBUM
    }

    /// Whether the play ran to the end of the item.
    pub fn is_completed(&self) -> bool {
        self.end_reason.as_deref() == Some(END_REASON_TRACK_DONE)
            || self
                .total_duration_ms
                .is_some_and(|total| self.duration_played_ms >= total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn track_substitutes_sentinels() {
        let event = PlayEvent::track("Song A", None, Some("   "), ts(), 200_000, Source::Spotify);

        assert_eq!(event.artist_name, UNKNOWN_ARTIST);
        assert_eq!(event.album_name, UNKNOWN_ALBUM);
        assert!(!event.has_album());
        assert!(!event.is_podcast());
    }

    #[test]
    fn negative_duration_is_clamped() {
        let event = PlayEvent::track("Song A", Some("X"), None, ts(), -5, Source::AppleMusic);
        assert_eq!(event.duration_played_ms, 0);
    }

    #[test]
    fn episode_uses_show_as_artist() {
        let event = PlayEvent::episode("Ep 1", Some("The Show"), ts(), 60_000, Source::Spotify);

        assert!(event.is_podcast());
        assert_eq!(event.track_name, "Ep 1");
        assert_eq!(event.artist_name, "The Show");
        assert_eq!(event.show_name.as_deref(), Some("The Show"));
    }

    #[test]
    fn completion_from_end_reason_or_duration() {
        let done = PlayEvent::track("A", None, None, ts(), 10, Source::Spotify)
            .with_end_reason(Some("trackdone"));
        assert!(done.is_completed());

        let full = PlayEvent::episode("E", None, ts(), 120_000, Source::Spotify)
            .with_total_duration(Some(120_000));
        assert!(full.is_completed());

        let partial = PlayEvent::episode("E", None, ts(), 60_000, Source::Spotify)
            .with_end_reason(Some("endplay"))
            .with_total_duration(Some(120_000));
        assert!(!partial.is_completed());
    }

    #[test]
    fn source_roundtrip() {
        for source in [Source::Spotify, Source::AppleMusic, Source::YoutubeMusic] {
            let parsed: Source = source.to_string().parse().expect("should parse");
            assert_eq!(parsed, source);
        }
        assert!("tidal".parse::<Source>().is_err());
    }
}
