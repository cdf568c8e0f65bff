//! Apple Music play activity parsing.
//!
//! Apple exports are CSV with inconsistent column names across export
//! versions, so columns are located by header substring. The exports carry
//! no reliable play duration; unless a play-duration column is present the
//! duration is estimated from the user-initiated flag.

use chrono::{DateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::adapter::{AdapterContext, AdapterError, FormatAdapter, ParseOutcome, name_matches};
use crate::event::{PlayEvent, Source, clean_name};

const FILE_MARKERS: &[&str] = &["apple", "play activity", "play_activity", "music"];

/// Combined "Artist - Track" field.
const DESCRIPTION_HEADERS: &[&str] = &["track description"];
const TRACK_HEADERS: &[&str] = &[
    "track name",
    "song name",
    "title",
    "track",
    "song",
];
const TIMESTAMP_HEADERS: &[&str] = &[
    "timestamp",
    "played at",
    "date played",
    "last played",
    "played",
    "date",
];
const ARTIST_HEADERS: &[&str] = &["artist"];
const ALBUM_HEADERS: &[&str] = &["album"];
const USER_INITIATED_HEADERS: &[&str] = &["user initiated"];
const DURATION_HEADERS: &[&str] = &["play duration"];

/// Finds the first header containing a marker, trying markers in priority order.
fn find_column(headers: &StringRecord, markers: &[&str], taken: &[usize]) -> Option<usize> {
    let lowered: Vec<String> = headers.iter().map(str::to_lowercase).collect();
    markers.iter().find_map(|marker| {
        lowered
            .iter()
            .enumerate()
            .find(|(i, h)| h.contains(marker) && !taken.contains(i))
            .map(|(i, _)| i)
    })
}

/// Column positions resolved from the header row.
#[derive(Debug)]
struct Columns {
    track: usize,
    /// The track column holds a combined artist and track field.
    combined: bool,
    timestamp: usize,
    artist: Option<usize>,
    album: Option<usize>,
    user_initiated: Option<usize>,
    duration: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, AdapterError> {
        let description = find_column(headers, DESCRIPTION_HEADERS, &[]);
        let separate = find_column(headers, TRACK_HEADERS, description.as_slice());
        let has_artist = find_column(headers, ARTIST_HEADERS, &[]).is_some();
        let (track, combined) = match (separate, description) {
            (Some(track), Some(_)) if has_artist => (track, false),
            (_, Some(description)) => (description, true),
            (Some(track), None) => (track, false),
            (None, None) => return Err(AdapterError::MissingColumn("track")),
        };
        let timestamp = find_column(headers, TIMESTAMP_HEADERS, &[track])
            .ok_or(AdapterError::MissingColumn("timestamp"))?;
        let taken = [track, timestamp];

        Ok(Self {
            track,
            combined,
            timestamp,
            artist: find_column(headers, ARTIST_HEADERS, &taken),
            album: find_column(headers, ALBUM_HEADERS, &taken),
            user_initiated: find_column(headers, USER_INITIATED_HEADERS, &taken),
            duration: find_column(headers, DURATION_HEADERS, &taken),
        })
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Splits a combined "Artist - Track" or "Track, Artist" field.
///
/// Returns `(track, artist)`; the artist is `None` when neither convention applies.
pub(crate) fn split_combined(field: &str) -> (String, Option<String>) {
    if let Some((artist, track)) = field.split_once(" - ") {
        return (track.trim().to_string(), clean_name(Some(artist)));
    }
    if let Some((track, artist)) = field.rsplit_once(", ") {
        return (track.trim().to_string(), clean_name(Some(artist)));
    }
    (field.trim().to_string(), None)
}

/// Strips a leading "Artist - " from a combined field whose artist is known.
fn strip_artist_prefix<'a>(field: &'a str, artist: &str) -> &'a str {
    field
        .strip_prefix(artist)
        .and_then(|rest| rest.strip_prefix(" - "))
        .map_or(field, str::trim)
}

/// Parses epoch milliseconds or RFC 3339, falling back to `now`.
fn parse_played_at(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(ts) = raw
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    {
        return ts;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    tracing::trace!(raw, "unparseable play timestamp, substituting current time");
    now
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "y")
}

/// Adapter for Apple Music CSV exports.
pub struct AppleMusicAdapter;

impl AppleMusicAdapter {
    fn parse_row(
        record: &StringRecord,
        columns: &Columns,
        ctx: &AdapterContext,
        outcome: &mut ParseOutcome,
    ) {
        let Some(track_field) = cell(record, Some(columns.track)) else {
            outcome.skip_null_name();
            return;
        };
        let Some(played_at) = cell(record, Some(columns.timestamp)) else {
            outcome.skip_malformed();
            return;
        };

        let (track, artist) = match cell(record, columns.artist) {
            Some(artist) if columns.combined => (
                strip_artist_prefix(track_field, artist).to_string(),
                Some(artist.to_string()),
            ),
            Some(artist) => (track_field.to_string(), Some(artist.to_string())),
            None => split_combined(track_field),
        };
        if track.is_empty() {
            outcome.skip_null_name();
            return;
        }

        let duration_ms = cell(record, columns.duration)
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|ms| *ms >= 0)
            .unwrap_or_else(|| {
                let user_initiated = cell(record, columns.user_initiated).is_some_and(parse_flag);
                if user_initiated {
                    ctx.full_play_ms
                } else {
                    ctx.partial_play_ms
                }
            });

        outcome.push(PlayEvent::track(
            track,
            artist.as_deref(),
            cell(record, columns.album),
            parse_played_at(played_at, ctx.now),
            duration_ms,
            Source::AppleMusic,
        ));
    }
}

impl FormatAdapter for AppleMusicAdapter {
    fn source(&self) -> Source {
        Source::AppleMusic
    }

    fn matches(&self, file_name: &str) -> bool {
        name_matches(file_name, FILE_MARKERS, "csv")
    }

    fn parse(&self, content: &str, ctx: &AdapterContext) -> Result<ParseOutcome, AdapterError> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());
        let columns = Columns::locate(reader.headers()?)?;
        let mut outcome = ParseOutcome::default();

        for record in reader.records() {
            match record {
                Ok(record) => Self::parse_row(&record, &columns, ctx, &mut outcome),
                Err(e) => {
                    tracing::trace!(error = %e, "skipping malformed row");
                    outcome.skip_malformed();
                }
            }
        }

        Ok(outcome)
    }
}
