//! Ad-hoc queries over the canonical event stream.
//!
//! Used for custom date range views and podcast views: filter by an inclusive
//! day range and an optional entity set, group, rank and truncate.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::PlayEvent;
use crate::identity::{IdentityResolver, MatchKey};

/// Bounds applied to [`QueryOptions::top_n`].
pub const MIN_TOP_N: usize = 1;
pub const MAX_TOP_N: usize = 999;

/// Ranking key; results are always sorted descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Total played time.
    #[default]
    Played,
    /// Distinct listening sessions.
    Sessions,
    /// Plays that ran to completion.
    Completed,
}

impl SortKey {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Played => "played",
            Self::Sessions => "sessions",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "played" => Ok(Self::Played),
            "sessions" => Ok(Self::Sessions),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("invalid sort key: {s}")),
        }
    }
}

/// What a query groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    /// Music tracks, filtered by artist.
    #[default]
    Tracks,
    /// Podcast episodes, filtered by show.
    Episodes,
}

/// Parameters of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// First included day. `None` means the earliest observed play.
    pub start_date: Option<NaiveDate>,
    /// Last included day. `None` means the latest observed play.
    pub end_date: Option<NaiveDate>,
    /// Artists (tracks) or shows (episodes) to keep. Empty keeps everything.
    pub entities: Vec<String>,
    pub top_n: usize,
    pub sort_key: SortKey,
    pub scope: QueryScope,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            entities: Vec::new(),
            top_n: 10,
            sort_key: SortKey::default(),
            scope: QueryScope::default(),
        }
    }
}

/// One ranked group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRow {
    /// Track or episode name.
    pub title: String,
    /// Artist or show name.
    pub subtitle: String,
    pub total_played_ms: i64,
    /// Distinct play timestamps; duplicate exports of one play count once.
    pub sessions: u32,
    pub completed_plays: u32,
    /// Plays the listener skipped.
    pub skips: u32,
    pub end_reasons: BTreeMap<String, u32>,
    pub first_played: DateTime<Utc>,
    pub last_played: DateTime<Utc>,
}

impl QueryRow {
    fn new(event: &PlayEvent) -> Self {
        Self {
            title: event.track_name.clone(),
            subtitle: event.artist_name.clone(),
            total_played_ms: 0,
            sessions: 0,
            completed_plays: 0,
            skips: 0,
            end_reasons: BTreeMap::new(),
            first_played: event.timestamp,
            last_played: event.timestamp,
        }
    }

    fn sort_value(&self, key: SortKey) -> i64 {
        match key {
            SortKey::Played => self.total_played_ms,
            SortKey::Sessions => i64::from(self.sessions),
            SortKey::Completed => i64::from(self.completed_plays),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Track(MatchKey),
    Episode { episode: String, show: String },
}

#[derive(Debug)]
struct Group {
    row: QueryRow,
    seen: BTreeSet<DateTime<Utc>>,
}

impl Group {
    fn absorb(&mut self, event: &PlayEvent) {
        let row = &mut self.row;
        if event.timestamp < row.first_played {
            // Display names follow the earliest play so grouping is order independent.
            row.title.clone_from(&event.track_name);
            row.subtitle.clone_from(&event.artist_name);
            row.first_played = event.timestamp;
        }
        row.last_played = row.last_played.max(event.timestamp);
        row.total_played_ms = row.total_played_ms.saturating_add(event.duration_played_ms);
        if self.seen.insert(event.timestamp) {
            row.sessions = row.sessions.saturating_add(1);
        }
        if event.is_completed() {
            row.completed_plays = row.completed_plays.saturating_add(1);
        }
        if event.skipped {
            row.skips = row.skips.saturating_add(1);
        }
        if let Some(reason) = &event.end_reason {
            *row.end_reasons.entry(reason.clone()).or_insert(0) += 1;
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound for a range ending on `date`; `None` past the last representable day.
fn after_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.succ_opt().map(start_of_day)
}

/// Runs a query over `events`.
///
/// An empty result is a normal outcome, never an error.
pub fn query(
    events: &[PlayEvent],
    options: &QueryOptions,
    resolver: &IdentityResolver,
) -> Vec<QueryRow> {
    let start = options.start_date.map(start_of_day);
    let end = options.end_date.and_then(after_day);
    let entities: BTreeSet<&str> = options.entities.iter().map(String::as_str).collect();
    let episodes = options.scope == QueryScope::Episodes;

    let mut groups: HashMap<GroupKey, Group> = HashMap::new();
    for event in events {
        if event.is_podcast() != episodes {
            continue;
        }
        if start.is_some_and(|s| event.timestamp < s) || end.is_some_and(|e| event.timestamp >= e) {
            continue;
        }
        let entity: &str = if episodes {
            event.show_name.as_deref().unwrap_or(&event.artist_name)
        } else {
            &event.artist_name
        };
        if !entities.is_empty() && !entities.contains(entity) {
            continue;
        }

        let key = if episodes {
            GroupKey::Episode {
                episode: event.track_name.clone(),
                show: entity.to_string(),
            }
        } else {
            GroupKey::Track(resolver.match_key(&event.track_name, &event.artist_name))
        };
        groups
            .entry(key)
            .or_insert_with(|| Group {
                row: QueryRow::new(event),
                seen: BTreeSet::new(),
            })
            .absorb(event);
    }

    let mut rows: Vec<QueryRow> = groups.into_values().map(|g| g.row).collect();
    rows.sort_by(|a, b| {
        b.sort_value(options.sort_key)
            .cmp(&a.sort_value(options.sort_key))
            .then_with(|| b.total_played_ms.cmp(&a.total_played_ms))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.subtitle.cmp(&b.subtitle))
    });
    rows.truncate(options.top_n.clamp(MIN_TOP_N, MAX_TOP_N));

    tracing::debug!(
        scope = ?options.scope,
        sort = %options.sort_key,
        rows = rows.len(),
        "query complete"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Source;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn song(track: &str, artist: &str, ts: DateTime<Utc>, ms: i64) -> PlayEvent {
        PlayEvent::track(track, Some(artist), None, ts, ms, Source::Spotify)
    }

    fn episode(name: &str, show: &str, ts: DateTime<Utc>, ms: i64, reason: &str) -> PlayEvent {
        PlayEvent::episode(name, Some(show), ts, ms, Source::Spotify).with_end_reason(Some(reason))
    }

    fn run(events: &[PlayEvent], options: &QueryOptions) -> Vec<QueryRow> {
        query(events, options, &IdentityResolver::default())
    }

    fn sample() -> Vec<PlayEvent> {
        vec![
            song("Song A", "Artist X", at(1, 10), 200_000),
            song("song a", "Artist X", at(2, 10), 100_000),
            song("Song B", "Artist Y", at(2, 11), 500_000),
            song("Song C", "Artist X", at(3, 23) + Duration::minutes(59), 50_000),
            episode("Ep 1", "Show S", at(1, 8), 1_000_000, "trackdone"),
            episode("Ep 1", "Show S", at(4, 8), 300_000, "endplay"),
            episode("Ep 2", "Show T", at(2, 8), 2_000_000, "trackdone"),
        ]
    }

    #[test]
    fn groups_tracks_by_identity() {
        let rows = run(&sample(), &QueryOptions::default());

        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Song B", "Song A", "Song C"]);
        assert_eq!(rows[1].total_played_ms, 300_000);
        assert_eq!(rows[1].sessions, 2);
        assert_eq!(rows[1].first_played, at(1, 10));
        assert_eq!(rows[1].last_played, at(2, 10));
    }

    #[test]
    fn date_range_is_inclusive_of_whole_days() {
        let options = QueryOptions {
            start_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 3),
            ..QueryOptions::default()
        };
        let rows = run(&sample(), &options);

        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Song B", "song a", "Song C"]);
    }

    #[test]
    fn range_end_covers_the_last_instant_of_the_day() {
        let last_instant = at(3, 23) + Duration::minutes(59) + Duration::nanoseconds(59_999_999_999);
        let events = vec![
            song("Late", "Artist X", last_instant, 60_000),
            song("Next Day", "Artist X", at(4, 0), 60_000),
        ];
        let options = QueryOptions {
            end_date: NaiveDate::from_ymd_opt(2024, 5, 3),
            ..QueryOptions::default()
        };
        let rows = run(&events, &options);

        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Late"]);
    }

    #[test]
    fn range_ending_on_the_last_day_has_no_upper_bound() {
        let options = QueryOptions {
            end_date: Some(NaiveDate::MAX),
            ..QueryOptions::default()
        };
        assert_eq!(run(&sample(), &options).len(), 3);
    }

    #[test]
    fn entity_filter_restricts_artists() {
        let options = QueryOptions {
            entities: vec!["Artist Y".to_string()],
            ..QueryOptions::default()
        };
        let rows = run(&sample(), &options);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subtitle, "Artist Y");
    }

    #[test]
    fn episodes_group_by_episode_and_show() {
        let options = QueryOptions {
            scope: QueryScope::Episodes,
            sort_key: SortKey::Sessions,
            ..QueryOptions::default()
        };
        let rows = run(&sample(), &options);

        assert_eq!(rows.len(), 2);
        let ep1 = &rows[0];
        assert_eq!(ep1.title, "Ep 1");
        assert_eq!(ep1.subtitle, "Show S");
        assert_eq!(ep1.sessions, 2);
        assert_eq!(ep1.completed_plays, 1);
        assert_eq!(ep1.end_reasons.get("trackdone"), Some(&1));
        assert_eq!(ep1.end_reasons.get("endplay"), Some(&1));
    }

    #[test]
    fn skipped_plays_are_counted() {
        let events = vec![
            song("Song A", "Artist X", at(1, 10), 20_000).with_skipped(true),
            song("Song A", "Artist X", at(1, 11), 200_000),
            song("Song A", "Artist X", at(1, 12), 15_000).with_skipped(true),
        ];
        let rows = run(&events, &QueryOptions::default());

        assert_eq!(rows[0].sessions, 3);
        assert_eq!(rows[0].skips, 2);
    }

    #[test]
    fn show_filter_restricts_episodes() {
        let options = QueryOptions {
            scope: QueryScope::Episodes,
            entities: vec!["Show T".to_string()],
            ..QueryOptions::default()
        };
        let rows = run(&sample(), &options);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Ep 2");
        assert_eq!(rows[0].completed_plays, 1);
    }

    #[test]
    fn duplicate_timestamps_are_one_session() {
        let events = vec![
            song("Song A", "Artist X", at(1, 10), 200_000),
            song("Song A", "Artist X", at(1, 10), 200_000),
        ];
        let rows = run(&events, &QueryOptions::default());
        assert_eq!(rows[0].sessions, 1);
    }

    #[test]
    fn top_n_is_clamped() {
        let zero = QueryOptions {
            top_n: 0,
            ..QueryOptions::default()
        };
        assert_eq!(run(&sample(), &zero).len(), 1);

        let events: Vec<_> = (0..1200)
            .map(|i| song(&format!("Song {i}"), "Artist", at(1, 0) + Duration::seconds(i), 40_000))
            .collect();
        let huge = QueryOptions {
            top_n: 5000,
            ..QueryOptions::default()
        };
        assert_eq!(run(&events, &huge).len(), MAX_TOP_N);
    }

    #[test]
    fn no_matches_is_empty() {
        let options = QueryOptions {
            entities: vec!["Nobody".to_string()],
            ..QueryOptions::default()
        };
        assert!(run(&sample(), &options).is_empty());
        assert!(run(&[], &QueryOptions::default()).is_empty());
    }

    #[test]
    fn sort_key_parses() {
        assert_eq!("sessions".parse::<SortKey>(), Ok(SortKey::Sessions));
        assert!("loudest".parse::<SortKey>().is_err());
    }
}
