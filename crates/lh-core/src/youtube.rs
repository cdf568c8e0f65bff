//! YouTube Music watch history parsing (Google Takeout `watch-history.json`).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapter::{AdapterContext, AdapterError, FormatAdapter, ParseOutcome, name_matches};
use crate::event::{PlayEvent, Source, clean_name};

const FILE_MARKERS: &[&str] = &["watch-history", "watch_history", "youtube"];

/// Takeout mixes plain YouTube and YouTube Music entries in one file.
const MUSIC_HEADER: &str = "YouTube Music";
const TITLE_PREFIX: &str = "Watched ";
const TOPIC_SUFFIX: &str = " - Topic";

#[derive(Debug, Deserialize)]
struct WatchEntry {
    header: Option<String>,
    title: Option<String>,
    #[serde(default)]
    subtitles: Vec<Subtitle>,
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Subtitle {
    name: Option<String>,
}

impl WatchEntry {
    /// Title without the "Watched " prefix. Removed videos only keep their URL.
    fn track_name(&self) -> Option<String> {
        let title = self.title.as_deref()?;
        let title = title.strip_prefix(TITLE_PREFIX).unwrap_or(title);
        clean_name(Some(title)).filter(|t| !t.starts_with("https://"))
    }

    fn artist_name(&self) -> Option<String> {
        let name = self.subtitles.first()?.name.as_deref()?;
        clean_name(Some(name.strip_suffix(TOPIC_SUFFIX).unwrap_or(name)))
    }
}

/// Adapter for YouTube Music Takeout exports.
pub struct YoutubeMusicAdapter;

impl FormatAdapter for YoutubeMusicAdapter {
    fn source(&self) -> Source {
        Source::YoutubeMusic
    }

    fn matches(&self, file_name: &str) -> bool {
        name_matches(file_name, FILE_MARKERS, "json")
    }

    fn parse(&self, content: &str, ctx: &AdapterContext) -> Result<ParseOutcome, AdapterError> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(content)?;
        let mut outcome = ParseOutcome::default();

        for value in entries {
            let entry: WatchEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::trace!(error = %e, "skipping malformed watch entry");
                    outcome.skip_malformed();
                    continue;
                }
            };
            if entry.header.as_deref() != Some(MUSIC_HEADER) {
                continue;
            }

            let Some(timestamp) = entry
                .time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                outcome.skip_malformed();
                continue;
            };
            let Some(track) = entry.track_name() else {
                outcome.skip_null_name();
                continue;
            };

            outcome.push(PlayEvent::track(
                track,
                entry.artist_name().as_deref(),
                None,
                timestamp,
                ctx.full_play_ms,
                Source::YoutubeMusic,
            ));
        }

        Ok(outcome)
    }
}
