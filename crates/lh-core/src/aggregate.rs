//! Aggregation of play events into per-track, per-artist and per-album statistics.
//!
//! # Algorithm Summary
//!
//! 1. Drop nameless events (null-name tally), then plays under the minimum
//!    duration (short-play tally)
//! 2. Fold the rest into track aggregates keyed by [`MatchKey`] and artist/album
//!    aggregates keyed by their unmodified display names
//! 3. Rank each collection and derive artist top tracks and streaks
//!
//! Only track identity is fuzzy; artist and album statistics use the names
//! exactly as exported.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{PlayEvent, UNKNOWN_ALBUM};
use crate::identity::{IdentityResolver, MatchKey};
use crate::temporal::{Streak, compute_streak};

/// Accumulated statistics for one logical track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackAggregate {
    pub key: MatchKey,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub total_played_ms: i64,
    pub play_count: u32,
    /// Play timestamps in encounter order.
    #[serde(skip)]
    pub timestamps: Vec<DateTime<Utc>>,
    /// Timestamp of the event that supplied the display metadata.
    #[serde(skip)]
    display_at: Option<DateTime<Utc>>,
}

impl TrackAggregate {
    /// Creates an empty aggregate; the first recorded event may replace the display metadata.
    pub fn new(key: MatchKey, name: &str, artist: &str, album: &str) -> Self {
        Self {
            key,
            name: name.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            total_played_ms: 0,
            play_count: 0,
            timestamps: Vec::new(),
            display_at: None,
        }
    }

    /// Adds one play without touching display metadata.
    pub fn record(&mut self, timestamp: DateTime<Utc>, played_ms: i64) {
        self.total_played_ms = self.total_played_ms.saturating_add(played_ms);
        self.play_count = self.play_count.saturating_add(1);
        self.timestamps.push(timestamp);
    }

    fn has_album(&self) -> bool {
        self.album != UNKNOWN_ALBUM
    }

    /// Whether `event` carries better display metadata than the current one.
    ///
    /// A real album beats the sentinel; otherwise the earliest event wins, with
    /// the display strings as the final tie-break. The ordering is total, so
    /// the outcome does not depend on the order events arrive in.
    fn is_improved_by(&self, event: &PlayEvent) -> bool {
        let Some(display_at) = self.display_at else {
            return true;
        };
        match (event.has_album(), self.has_album()) {
            (true, false) => true,
            (false, true) => false,
            _ => {
                (
                    event.timestamp,
                    event.track_name.as_str(),
                    event.artist_name.as_str(),
                    event.album_name.as_str(),
                ) < (
                    display_at,
                    self.name.as_str(),
                    self.artist.as_str(),
                    self.album.as_str(),
                )
            }
        }
    }

    fn absorb(&mut self, event: &PlayEvent) {
        if self.is_improved_by(event) {
            self.name.clone_from(&event.track_name);
            self.artist.clone_from(&event.artist_name);
            self.album.clone_from(&event.album_name);
            self.display_at = Some(event.timestamp);
        }
        self.record(event.timestamp, event.duration_played_ms);
    }
}

/// Accumulated statistics for one artist name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistAggregate {
    pub name: String,
    pub total_played_ms: i64,
    pub play_count: u32,
    pub first_listen: DateTime<Utc>,
    /// The artist's most played track by play count.
    pub top_track: Option<TrackAggregate>,
    pub streak: Streak,
    #[serde(skip)]
    pub timestamps: Vec<DateTime<Utc>>,
}

/// Accumulated statistics for one album of one artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumAggregate {
    pub name: String,
    pub artist: String,
    pub total_played_ms: i64,
    pub play_count: u32,
    /// Number of distinct track names heard on this album.
    pub track_count: usize,
    pub first_listen: DateTime<Utc>,
    #[serde(skip)]
    track_names: BTreeSet<String>,
}

/// Running totals for one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Listening time over every included event, podcasts included.
    pub total_listening_ms: i64,
    /// Events that passed the name and duration checks.
    pub processed_count: usize,
    pub short_play_count: usize,
    pub null_name_count: usize,
    pub malformed_count: usize,
    pub podcast_listening_ms: i64,
    pub podcast_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_play: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_play: Option<DateTime<Utc>>,
}

/// Result of [`aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Ranked by total played time.
    pub tracks: Vec<TrackAggregate>,
    /// Ranked by total played time.
    pub artists: Vec<ArtistAggregate>,
    /// Ranked by total played time.
    pub albums: Vec<AlbumAggregate>,
    pub play_history_by_track: BTreeMap<MatchKey, Vec<DateTime<Utc>>>,
    pub totals: Totals,
    /// Events that passed exclusion, in encounter order.
    pub included: Vec<PlayEvent>,
}

#[derive(Debug)]
struct ArtistState {
    aggregate: ArtistAggregate,
    /// Per-track (plays, played ms) for picking the top track.
    track_plays: HashMap<MatchKey, (u32, i64)>,
}

/// Per-run state threaded through the fold.
#[derive(Debug, Default)]
struct AggregationState {
    tracks: HashMap<MatchKey, TrackAggregate>,
    artists: HashMap<String, ArtistState>,
    albums: HashMap<(String, String), AlbumAggregate>,
    totals: Totals,
    included: Vec<PlayEvent>,
}

impl AggregationState {
    fn absorb(mut self, event: &PlayEvent, resolver: &IdentityResolver, min_play_ms: i64) -> Self {
        if event.track_name.trim().is_empty() {
            self.totals.null_name_count += 1;
            return self;
        }
        if event.duration_played_ms < 0 {
            tracing::trace!(track = %event.track_name, "skipping event with negative duration");
            self.totals.malformed_count += 1;
            return self;
        }
        if event.duration_played_ms < min_play_ms {
            self.totals.short_play_count += 1;
            return self;
        }

        let totals = &mut self.totals;
        totals.total_listening_ms = totals
            .total_listening_ms
            .saturating_add(event.duration_played_ms);
        totals.processed_count += 1;
        totals.first_play = Some(totals.first_play.map_or(event.timestamp, |t| t.min(event.timestamp)));
        totals.last_play = Some(totals.last_play.map_or(event.timestamp, |t| t.max(event.timestamp)));
        self.included.push(event.clone());

        if event.is_podcast() {
            totals.podcast_count += 1;
            totals.podcast_listening_ms = totals
                .podcast_listening_ms
                .saturating_add(event.duration_played_ms);
            return self;
        }

        let key = resolver.match_key(&event.track_name, &event.artist_name);
        self.absorb_track(&key, event);
        self.absorb_artist(key, event);
        self.absorb_album(event);
        self
    }

    fn absorb_track(&mut self, key: &MatchKey, event: &PlayEvent) {
        self.tracks
            .entry(key.clone())
            .or_insert_with(|| {
                TrackAggregate::new(
                    key.clone(),
                    &event.track_name,
                    &event.artist_name,
                    &event.album_name,
                )
            })
            .absorb(event);
    }

    fn absorb_artist(&mut self, key: MatchKey, event: &PlayEvent) {
        let state = self
            .artists
            .entry(event.artist_name.clone())
            .or_insert_with(|| ArtistState {
                aggregate: ArtistAggregate {
                    name: event.artist_name.clone(),
                    total_played_ms: 0,
                    play_count: 0,
                    first_listen: event.timestamp,
                    top_track: None,
                    streak: Streak::default(),
                    timestamps: Vec::new(),
                },
                track_plays: HashMap::new(),
            });

        let artist = &mut state.aggregate;
        artist.total_played_ms = artist.total_played_ms.saturating_add(event.duration_played_ms);
        artist.play_count = artist.play_count.saturating_add(1);
        artist.first_listen = artist.first_listen.min(event.timestamp);
        artist.timestamps.push(event.timestamp);

        let (plays, played_ms) = state.track_plays.entry(key).or_insert((0, 0));
        *plays = plays.saturating_add(1);
        *played_ms = played_ms.saturating_add(event.duration_played_ms);
    }

    fn absorb_album(&mut self, event: &PlayEvent) {
        let album = self
            .albums
            .entry((event.album_name.clone(), event.artist_name.clone()))
            .or_insert_with(|| AlbumAggregate {
                name: event.album_name.clone(),
                artist: event.artist_name.clone(),
                total_played_ms: 0,
                play_count: 0,
                track_count: 0,
                first_listen: event.timestamp,
                track_names: BTreeSet::new(),
            });

        album.total_played_ms = album.total_played_ms.saturating_add(event.duration_played_ms);
        album.play_count = album.play_count.saturating_add(1);
        album.first_listen = album.first_listen.min(event.timestamp);
        if album.track_names.insert(event.track_name.clone()) {
            album.track_count = album.track_names.len();
        }
    }

    fn finish(self, evaluated_at: DateTime<Utc>) -> Aggregation {
        let Self {
            tracks,
            artists,
            albums,
            totals,
            included,
        } = self;

        let mut artists: Vec<ArtistAggregate> = artists
            .into_values()
            .map(|state| {
                let mut artist = state.aggregate;
                artist.top_track = state
                    .track_plays
                    .iter()
                    .max_by(|(ka, (pa, ma)), (kb, (pb, mb))| {
                        (pa, ma, Reverse(ka)).cmp(&(pb, mb, Reverse(kb)))
                    })
                    .and_then(|(key, _)| tracks.get(key).cloned());
                artist.streak = compute_streak(&artist.timestamps, evaluated_at);
                artist
            })
            .collect();
        artists.sort_by(|a, b| {
            (Reverse(a.total_played_ms), &a.name).cmp(&(Reverse(b.total_played_ms), &b.name))
        });

        let mut albums: Vec<AlbumAggregate> = albums.into_values().collect();
        albums.sort_by(|a, b| {
            (Reverse(a.total_played_ms), &a.name, &a.artist)
                .cmp(&(Reverse(b.total_played_ms), &b.name, &b.artist))
        });

        let mut tracks: Vec<TrackAggregate> = tracks.into_values().collect();
        tracks.sort_by(|a, b| {
            (Reverse(a.total_played_ms), Reverse(a.play_count), &a.key)
                .cmp(&(Reverse(b.total_played_ms), Reverse(b.play_count), &b.key))
        });

        let play_history_by_track = tracks
            .iter()
            .map(|t| (t.key.clone(), t.timestamps.clone()))
            .collect();

        Aggregation {
            tracks,
            artists,
            albums,
            play_history_by_track,
            totals,
            included,
        }
    }
}

/// Folds play events into ranked aggregates and running totals.
///
/// Never fails: events that cannot be used are counted in [`Totals`] and
/// skipped. `evaluated_at` decides whether artist streaks are still current.
pub fn aggregate(
    events: &[PlayEvent],
    resolver: &IdentityResolver,
    min_play_ms: i64,
    evaluated_at: DateTime<Utc>,
) -> Aggregation {
    events
        .iter()
        .fold(AggregationState::default(), |state, event| {
            state.absorb(event, resolver, min_play_ms)
        })
        .finish(evaluated_at)
}
