//! Temporal analysis over aggregated play histories.
//!
//! - Streaks: runs of consecutive calendar days with at least one play
//! - Brief obsessions: low-play tracks with a dense burst inside one window
//! - Year rankings: per-year top tracks scored by `plays^1.5`
//! - Listening patterns: hour/weekday/month distributions
//!
//! Calendar days and years are UTC.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::aggregate::TrackAggregate;
use crate::config::EngineConfig;
use crate::event::PlayEvent;
use crate::identity::MatchKey;

/// Days with a play beyond which a trailing run no longer counts as current.
const CURRENT_STREAK_GRACE_DAYS: i64 = 1;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Consecutive-day listening runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub longest_run_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_run_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_run_end: Option<NaiveDate>,
    /// Length of the trailing run, or zero once it has gone cold.
    pub current_run_days: u32,
}

/// Computes the longest and current day streaks of a timestamp history.
///
/// The earliest of several equally long runs is reported. The current run is
/// zero when the last listening day is more than one day before `evaluated_at`.
pub fn compute_streak(timestamps: &[DateTime<Utc>], evaluated_at: DateTime<Utc>) -> Streak {
    let days: BTreeSet<NaiveDate> = timestamps.iter().map(DateTime::date_naive).collect();
    let mut days = days.into_iter();
    let Some(first) = days.next() else {
        return Streak::default();
    };

    let mut run_start = first;
    let mut run_len = 1u32;
    let mut previous = first;
    let mut longest = (1u32, first, first);

    for day in days {
        if previous.succ_opt() == Some(day) {
            run_len += 1;
        } else {
            run_start = day;
            run_len = 1;
        }
        if run_len > longest.0 {
            longest = (run_len, run_start, day);
        }
        previous = day;
    }

    let idle_days = (evaluated_at.date_naive() - previous).num_days();
    let current_run_days = if idle_days > CURRENT_STREAK_GRACE_DAYS {
        0
    } else {
        run_len
    };

    Streak {
        longest_run_days: longest.0,
        longest_run_start: Some(longest.1),
        longest_run_end: Some(longest.2),
        current_run_days,
    }
}

/// A track whose plays cluster inside one short window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefObsession {
    pub track: TrackAggregate,
    /// Start of the best window; the window is `(window_start, window_start + window]`.
    pub window_start: DateTime<Utc>,
    pub plays_in_window: u32,
}

/// Finds the densest trailing window in a track's history.
///
/// Only tracks with at most `obsession_max_plays` plays are considered, and the
/// best window must hold at least `obsession_min_plays` plays.
pub fn find_obsession(track: &TrackAggregate, config: &EngineConfig) -> Option<BriefObsession> {
    if track.play_count > config.obsession_max_plays || track.timestamps.is_empty() {
        return None;
    }

    let mut sorted = track.timestamps.clone();
    sorted.sort_unstable();
    let window = Duration::try_days(config.obsession_window_days.max(1)).unwrap_or(Duration::MAX);

    let mut best: Option<(usize, DateTime<Utc>)> = None;
    let mut first_in_window = 0;
    for (i, &end) in sorted.iter().enumerate() {
        let window_start = end
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        while sorted[first_in_window] <= window_start {
            first_in_window += 1;
        }
        let plays = i - first_in_window + 1;
        if best.is_none_or(|(most, _)| plays > most) {
            best = Some((plays, window_start));
        }
    }

    let (plays, window_start) = best?;
    let plays_in_window = count_u32(plays);
    (plays_in_window >= config.obsession_min_plays).then(|| BriefObsession {
        track: track.clone(),
        window_start,
        plays_in_window,
    })
}

/// Ranks every qualifying brief obsession.
///
/// Ordered by plays in window descending, then window start ascending, capped
/// at `ranking_limit`.
pub fn rank_obsessions(tracks: &[TrackAggregate], config: &EngineConfig) -> Vec<BriefObsession> {
    let mut obsessions: Vec<BriefObsession> = tracks
        .iter()
        .filter_map(|t| find_obsession(t, config))
        .collect();
    obsessions.sort_by(|a, b| {
        b.plays_in_window
            .cmp(&a.plays_in_window)
            .then_with(|| a.window_start.cmp(&b.window_start))
            .then_with(|| a.track.key.cmp(&b.track.key))
    });
    obsessions.truncate(config.ranking_limit);
    obsessions
}

/// A track's statistics scoped to one calendar year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearTrack {
    pub year: i32,
    /// `plays^1.5`; only meaningful for ordering within the year.
    pub score: f64,
    /// Play count and played time restricted to the year.
    pub track: TrackAggregate,
}

#[allow(clippy::cast_precision_loss)]
fn year_score(plays: usize) -> f64 {
    (plays as f64).powf(1.5)
}

/// Scales `total_ms` by `part / whole` without intermediate overflow.
fn scale_ms(total_ms: i64, part: usize, whole: usize) -> i64 {
    let part = i128::try_from(part).unwrap_or(i128::MAX);
    let whole = i128::try_from(whole).unwrap_or(i128::MAX).max(1);
    i64::try_from(i128::from(total_ms) * part / whole).unwrap_or(i64::MAX)
}

/// Partitions each track's history by year and ranks every year.
///
/// Histories are taken from `history` when present, else from the track.
/// Each year keeps at most `limit` tracks ordered by score, then scaled
/// played time, then key.
pub fn rank_by_year(
    tracks: &[TrackAggregate],
    history: &BTreeMap<MatchKey, Vec<DateTime<Utc>>>,
    limit: usize,
) -> BTreeMap<i32, Vec<YearTrack>> {
    let mut years: BTreeMap<i32, Vec<YearTrack>> = BTreeMap::new();

    for track in tracks {
        let timestamps = history.get(&track.key).unwrap_or(&track.timestamps);
        if timestamps.is_empty() {
            continue;
        }

        let mut by_year: BTreeMap<i32, Vec<DateTime<Utc>>> = BTreeMap::new();
        for ts in timestamps {
            by_year.entry(ts.year()).or_default().push(*ts);
        }

        for (year, stamps) in by_year {
            let plays = stamps.len();
            let mut scoped = track.clone();
            scoped.play_count = count_u32(plays);
            scoped.total_played_ms = scale_ms(track.total_played_ms, plays, timestamps.len());
            scoped.timestamps = stamps;
            years.entry(year).or_default().push(YearTrack {
                year,
                score: year_score(plays),
                track: scoped,
            });
        }
    }

    for ranked in years.values_mut() {
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.track.total_played_ms.cmp(&a.track.total_played_ms))
                .then_with(|| a.track.key.cmp(&b.track.key))
        });
        ranked.truncate(limit);
    }

    years
}

/// When listening happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningPatterns {
    /// Plays per hour of day (0-23, UTC).
    pub hourly: [u32; 24],
    /// Plays per weekday, Monday first.
    pub weekday: [u32; 7],
    /// Listened milliseconds per month, keyed `YYYY-MM`.
    pub monthly_ms: BTreeMap<String, i64>,
}

impl ListeningPatterns {
    /// Hour with the most plays; the earliest hour wins ties.
    pub fn peak_hour(&self) -> Option<u32> {
        peak_index(&self.hourly).and_then(|i| u32::try_from(i).ok())
    }

    /// Weekday with the most plays; the earliest weekday wins ties.
    pub fn busiest_weekday(&self) -> Option<Weekday> {
        peak_index(&self.weekday).map(|i| WEEKDAYS[i])
    }
}

fn peak_index(counts: &[u32]) -> Option<usize> {
    counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .fold(None, |best: Option<(usize, u32)>, (i, &c)| match best {
            Some((_, most)) if most >= c => best,
            _ => Some((i, c)),
        })
        .map(|(i, _)| i)
}

/// Builds hour, weekday and month distributions over `events`.
pub fn listening_patterns(events: &[PlayEvent]) -> ListeningPatterns {
    let mut patterns = ListeningPatterns::default();
    for event in events {
        let ts = event.timestamp;
        let hour = ts.hour() as usize;
        let weekday = ts.weekday().num_days_from_monday() as usize;
        patterns.hourly[hour] = patterns.hourly[hour].saturating_add(1);
        patterns.weekday[weekday] = patterns.weekday[weekday].saturating_add(1);
        let month = patterns
            .monthly_ms
            .entry(ts.format("%Y-%m").to_string())
            .or_insert(0);
        *month = month.saturating_add(event.duration_played_ms);
    }
    patterns
}
