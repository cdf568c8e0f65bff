//! Spotify streaming history parsing.
//!
//! Two record shapes appear in the wild: the extended history
//! (`endsong_N.json`, `Streaming_History_Audio_*.json`) keyed by `ts`, and the
//! account-data history (`StreamingHistoryN.json`) keyed by `endTime`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::adapter::{AdapterContext, AdapterError, FormatAdapter, ParseOutcome, name_matches};
use crate::event::{PlayEvent, Source, clean_name};

const FILE_MARKERS: &[&str] = &["spotify", "streaming_history", "streaminghistory", "endsong"];

/// `endTime` format of the account-data history.
const ACCOUNT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Extended streaming history record.
#[derive(Debug, Deserialize)]
struct ExtendedRecord {
    ts: String,
    #[serde(default)]
    ms_played: i64,
    master_metadata_track_name: Option<String>,
    master_metadata_album_artist_name: Option<String>,
    master_metadata_album_album_name: Option<String>,
    episode_name: Option<String>,
    episode_show_name: Option<String>,
    reason_end: Option<String>,
    skipped: Option<bool>,
}

/// Account-data streaming history record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    end_time: String,
    artist_name: Option<String>,
    track_name: Option<String>,
    #[serde(default)]
    ms_played: i64,
}

fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_end_time(end_time: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(end_time, ACCOUNT_TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

impl ExtendedRecord {
    fn into_event(self, outcome: &mut ParseOutcome) {
        let Some(timestamp) = parse_ts(&self.ts) else {
            tracing::trace!(ts = %self.ts, "skipping record with invalid timestamp");
            outcome.skip_malformed();
            return;
        };

        let event = if let Some(track) = clean_name(self.master_metadata_track_name.as_deref()) {
            PlayEvent::track(
                track,
                self.master_metadata_album_artist_name.as_deref(),
                self.master_metadata_album_album_name.as_deref(),
                timestamp,
                self.ms_played,
                Source::Spotify,
            )
        } else if let Some(episode) = clean_name(self.episode_name.as_deref()) {
            PlayEvent::episode(
                episode,
                self.episode_show_name.as_deref(),
                timestamp,
                self.ms_played,
                Source::Spotify,
            )
        } else {
            outcome.skip_null_name();
            return;
        };

        outcome.push(
            event
                .with_end_reason(self.reason_end.as_deref())
                .with_skipped(self.skipped.unwrap_or(false)),
        );
    }
}

impl AccountRecord {
    fn into_event(self, outcome: &mut ParseOutcome) {
        let Some(timestamp) = parse_end_time(&self.end_time) else {
            tracing::trace!(end_time = %self.end_time, "skipping record with invalid endTime");
            outcome.skip_malformed();
            return;
        };
        let Some(track) = clean_name(self.track_name.as_deref()) else {
            outcome.skip_null_name();
            return;
        };

        outcome.push(PlayEvent::track(
            track,
            self.artist_name.as_deref(),
            None,
            timestamp,
            self.ms_played,
            Source::Spotify,
        ));
    }
}

/// Adapter for Spotify JSON exports.
pub struct SpotifyAdapter;

impl FormatAdapter for SpotifyAdapter {
    fn source(&self) -> Source {
        Source::Spotify
    }

    fn matches(&self, file_name: &str) -> bool {
        name_matches(file_name, FILE_MARKERS, "json")
    }

    fn parse(&self, content: &str, _ctx: &AdapterContext) -> Result<ParseOutcome, AdapterError> {
        let records: Vec<serde_json::Value> = serde_json::from_str(content)?;
        let mut outcome = ParseOutcome::default();

        for record in records {
            let parsed = if record.get("ts").is_some() {
                serde_json::from_value::<ExtendedRecord>(record).map(|r| r.into_event(&mut outcome))
            } else if record.get("endTime").is_some() {
                serde_json::from_value::<AccountRecord>(record).map(|r| r.into_event(&mut outcome))
            } else {
                tracing::trace!("skipping record of unknown shape");
                outcome.skip_malformed();
                continue;
            };

            if let Err(e) = parsed {
                tracing::trace!(error = %e, "skipping malformed record");
                outcome.skip_malformed();
            }
        }

        Ok(outcome)
    }
}
