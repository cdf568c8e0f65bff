//! Batch orchestration: a set of export files in, one report out.
//!
//! Files are parsed concurrently since adapters share no state. The
//! aggregation and analysis passes then run sequentially over the combined
//! event stream, in file order, so the same file set always yields the same
//! report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::adapter::{AdapterContext, AdapterRegistry, FileStatus, ParsedFile};
use crate::aggregate::{AlbumAggregate, ArtistAggregate, Totals, TrackAggregate, aggregate};
use crate::config::EngineConfig;
use crate::event::PlayEvent;
use crate::identity::{IdentityResolver, MatchKey};
use crate::query::{QueryOptions, QueryRow, QueryScope, query};
use crate::temporal::{
    BriefObsession, ListeningPatterns, YearTrack, listening_patterns, rank_by_year, rank_obsessions,
};

/// The one failure surfaced to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no valid data found in {files} file(s)")]
    NoValidData { files: usize },
}

/// A named text blob submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// How much one file contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub status: FileStatus,
    pub events: usize,
    pub null_names: usize,
    pub malformed_records: usize,
}

impl From<&ParsedFile> for FileSummary {
    fn from(file: &ParsedFile) -> Self {
        Self {
            name: file.file_name.clone(),
            status: file.status,
            events: file.outcome.events.len(),
            null_names: file.outcome.null_names,
            malformed_records: file.outcome.malformed,
        }
    }
}

/// Everything the presentation layer consumes from one run.
#[derive(Debug, Clone, Serialize)]
pub struct ListeningReport {
    pub evaluated_at: DateTime<Utc>,
    pub totals: Totals,
    pub files: Vec<FileSummary>,
    pub artists: Vec<ArtistAggregate>,
    pub albums: Vec<AlbumAggregate>,
    pub tracks: Vec<TrackAggregate>,
    pub years: BTreeMap<i32, Vec<YearTrack>>,
    pub obsessions: Vec<BriefObsession>,
    pub top_episodes: Vec<QueryRow>,
    pub patterns: ListeningPatterns,
    /// Included events sorted by timestamp, for ad-hoc queries.
    pub events: Vec<PlayEvent>,
    #[serde(skip)]
    pub play_history_by_track: BTreeMap<MatchKey, Vec<DateTime<Utc>>>,
}

/// Stateless engine; each run recomputes everything from its input.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    adapters: AdapterRegistry,
    resolver: IdentityResolver,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_adapters(config, AdapterRegistry::default())
    }

    pub fn with_adapters(config: EngineConfig, adapters: AdapterRegistry) -> Self {
        let resolver = IdentityResolver::new(&config.overrides);
        Self {
            config,
            adapters,
            resolver,
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Parses every file concurrently, keeping input order.
    pub fn parse_files(&self, files: &[SourceFile], now: DateTime<Utc>) -> Vec<ParsedFile> {
        let ctx = AdapterContext::from_config(&self.config, now);
        files
            .par_iter()
            .map(|f| self.adapters.parse(&f.name, &f.content, &ctx))
            .collect()
    }

    /// Runs the full pipeline, evaluating streaks against the current time.
    pub fn run(&self, files: &[SourceFile]) -> Result<ListeningReport, EngineError> {
        self.run_at(files, Utc::now())
    }

    /// Runs the full pipeline as of `evaluated_at`.
    ///
    /// Fails only when the whole batch yields no events.
    pub fn run_at(
        &self,
        files: &[SourceFile],
        evaluated_at: DateTime<Utc>,
    ) -> Result<ListeningReport, EngineError> {
        let parsed = self.parse_files(files, evaluated_at);
        let summaries: Vec<FileSummary> = parsed.iter().map(FileSummary::from).collect();

        let mut null_names = 0;
        let mut malformed = 0;
        let mut events = Vec::new();
        for file in parsed {
            null_names += file.outcome.null_names;
            malformed += file.outcome.malformed;
            events.extend(file.outcome.events);
        }

        if events.is_empty() {
            tracing::warn!(files = files.len(), "no usable events in batch");
            return Err(EngineError::NoValidData { files: files.len() });
        }

        let mut aggregation = aggregate(
            &events,
            &self.resolver,
            self.config.min_play_ms,
            evaluated_at,
        );
        aggregation.totals.null_name_count += null_names;
        aggregation.totals.malformed_count += malformed;

        let years = rank_by_year(
            &aggregation.tracks,
            &aggregation.play_history_by_track,
            self.config.ranking_limit,
        );
        let obsessions = rank_obsessions(&aggregation.tracks, &self.config);
        let top_episodes = self.query(
            &aggregation.included,
            &QueryOptions {
                scope: QueryScope::Episodes,
                top_n: self.config.ranking_limit,
                ..QueryOptions::default()
            },
        );
        let patterns = listening_patterns(&aggregation.included);

        let mut events = aggregation.included;
        events.sort_by_key(|e| e.timestamp);

        tracing::info!(
            files = files.len(),
            events = events.len(),
            tracks = aggregation.tracks.len(),
            artists = aggregation.artists.len(),
            short_plays = aggregation.totals.short_play_count,
            "listening report ready"
        );

        Ok(ListeningReport {
            evaluated_at,
            totals: aggregation.totals,
            files: summaries,
            artists: aggregation.artists,
            albums: aggregation.albums,
            tracks: aggregation.tracks,
            years,
            obsessions,
            top_episodes,
            patterns,
            events,
            play_history_by_track: aggregation.play_history_by_track,
        })
    }

    /// Runs an ad-hoc query with this engine's identity resolver.
    pub fn query(&self, events: &[PlayEvent], options: &QueryOptions) -> Vec<QueryRow> {
        query(events, options, &self.resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Source;
    use crate::identity::IdentityOverride;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 4, 12, 0, 0).unwrap()
    }

    const SPOTIFY: &str = r#"[
        {"ts": "2023-05-01T10:00:00Z", "ms_played": 200000,
         "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X",
         "master_metadata_album_album_name": "Album Q"},
        {"ts": "2023-05-02T10:00:00Z", "ms_played": 250000,
         "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X",
         "master_metadata_album_album_name": "Album Q"},
        {"ts": "2023-05-03T10:00:00Z", "ms_played": 10000,
         "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X",
         "master_metadata_album_album_name": "Album Q"},
        {"ts": "2023-05-03T11:00:00Z", "ms_played": 900000,
         "episode_name": "Ep 1", "episode_show_name": "Show S", "reason_end": "trackdone"},
        {"ts": "2023-05-03T12:00:00Z", "ms_played": 50000}
    ]"#;

    #[test]
    fn spotify_end_to_end() {
        let engine = Engine::default();
        let report = engine
            .run_at(&[SourceFile::new("StreamingHistory0.json", SPOTIFY)], now())
            .expect("should produce a report");

        let track = &report.tracks[0];
        assert_eq!(track.name, "Song A");
        assert_eq!(track.play_count, 2);
        assert_eq!(track.total_played_ms, 450_000);
        assert_eq!(report.totals.short_play_count, 1);
        assert_eq!(report.totals.null_name_count, 1);
        assert_eq!(report.totals.processed_count, 3);

        let artist = &report.artists[0];
        assert_eq!(artist.streak.longest_run_days, 2);
        assert_eq!(artist.streak.current_run_days, 0);

        assert_eq!(report.top_episodes.len(), 1);
        assert_eq!(report.top_episodes[0].title, "Ep 1");
        assert_eq!(report.years[&2023].len(), 1);
        assert!(report.obsessions.is_empty());
        assert_eq!(report.events.len(), 3);
        assert!(report.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn merges_identity_across_services() {
        let apple = "Track Description,Event Start Timestamp,Is User Initiated\n\
                     Artist X - Song A (feat. Someone),1683108000000,true\n";
        let engine = Engine::default();
        let report = engine
            .run_at(
                &[
                    SourceFile::new("StreamingHistory0.json", SPOTIFY),
                    SourceFile::new("Apple Music Play Activity.csv", apple),
                ],
                now(),
            )
            .expect("should produce a report");

        assert_eq!(report.tracks.len(), 1);
        let track = &report.tracks[0];
        assert_eq!(track.play_count, 3);
        assert_eq!(track.album, "Album Q");
        assert_eq!(track.total_played_ms, 450_000 + 180_000);
        assert_eq!(report.artists[0].streak.longest_run_days, 3);
        assert_eq!(report.artists[0].streak.current_run_days, 3);
        assert_eq!(
            report.files.iter().map(|f| f.status).collect::<Vec<_>>(),
            vec![
                FileStatus::Parsed(Source::Spotify),
                FileStatus::Parsed(Source::AppleMusic)
            ]
        );
    }

    #[test]
    fn no_valid_data_is_an_error() {
        let engine = Engine::default();
        let files = [
            SourceFile::new("notes.txt", "hello"),
            SourceFile::new("StreamingHistory0.json", "{broken"),
            SourceFile::new("StreamingHistory1.json", "[]"),
        ];
        let err = engine.run_at(&files, now()).unwrap_err();

        assert!(matches!(err, EngineError::NoValidData { files: 3 }));
        assert_eq!(err.to_string(), "no valid data found in 3 file(s)");
    }

    #[test]
    fn skipped_files_are_summarized() {
        let engine = Engine::default();
        let files = [
            SourceFile::new("notes.txt", "hello"),
            SourceFile::new("StreamingHistory1.json", "{broken"),
            SourceFile::new("StreamingHistory0.json", SPOTIFY),
        ];
        let report = engine.run_at(&files, now()).expect("should produce a report");

        assert_eq!(report.files[0].status, FileStatus::Unrecognized);
        assert_eq!(report.files[1].status, FileStatus::Malformed(Source::Spotify));
        assert_eq!(report.files[2].events, 4);
        assert_eq!(report.files[2].null_names, 1);
    }

    #[test]
    fn configured_overrides_merge_tracks() {
        let spotify = r#"[
            {"ts": "2023-05-01T10:00:00Z", "ms_played": 200000,
             "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X"},
            {"ts": "2023-05-02T10:00:00Z", "ms_played": 200000,
             "master_metadata_track_name": "Song A (Alt Take)", "master_metadata_album_artist_name": "Artist X"}
        ]"#;
        let files = [SourceFile::new("endsong_0.json", spotify)];

        let plain = Engine::default().run_at(&files, now()).expect("report");
        assert_eq!(plain.tracks.len(), 2);

        let engine = Engine::new(EngineConfig {
            overrides: vec![IdentityOverride::new("song a", "artist x", "song a|artist x")],
            ..EngineConfig::default()
        });
        let merged = engine.run_at(&files, now()).expect("report");
        assert_eq!(merged.tracks.len(), 1);
        assert_eq!(merged.tracks[0].play_count, 2);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let engine = Engine::default();
        let files = [SourceFile::new("StreamingHistory0.json", SPOTIFY)];
        let first = engine.run_at(&files, now()).expect("report");
        let second = engine.run_at(&files, now()).expect("report");

        assert_eq!(first.totals, second.totals);
        assert_eq!(first.tracks, second.tracks);
        assert_eq!(first.artists, second.artists);
    }
}
