//! Format adapter abstraction.
//!
//! Every supported export format implements [`FormatAdapter`]. The
//! [`AdapterRegistry`] picks an adapter by file name and turns any failure
//! into a zero contribution, so a messy export never aborts a batch.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::apple::AppleMusicAdapter;
use crate::config::EngineConfig;
use crate::event::{PlayEvent, Source};
use crate::spotify::SpotifyAdapter;
use crate::youtube::YoutubeMusicAdapter;

/// Failure that makes a whole file contribute nothing.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required {0} column")]
    MissingColumn(&'static str),
}

/// Values adapters need beyond the file itself.
#[derive(Debug, Clone, Copy)]
pub struct AdapterContext {
    /// Substituted for timestamps that cannot be parsed.
    pub now: DateTime<Utc>,
    /// Estimated duration of a full, user-initiated play.
    pub full_play_ms: i64,
    /// Estimated duration of a play that was not user-initiated.
    pub partial_play_ms: i64,
}

impl AdapterContext {
    pub const fn from_config(config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            now,
            full_play_ms: config.full_play_ms,
            partial_play_ms: config.partial_play_ms,
        }
    }
}

/// Events extracted from one file plus the records that had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub events: Vec<PlayEvent>,
    /// Records without a track or episode name.
    pub null_names: usize,
    /// Records that failed required-field or parse checks.
    pub malformed: usize,
}

impl ParseOutcome {
    pub(crate) fn push(&mut self, event: PlayEvent) {
        self.events.push(event);
    }

    pub(crate) fn skip_null_name(&mut self) {
        self.null_names += 1;
    }

    pub(crate) fn skip_malformed(&mut self) {
        self.malformed += 1;
    }
}

/// Trait implemented by every export format.
///
/// Adapters must be pure: the same name and content always produce the same
/// outcome, and nothing outside the returned value is touched.
pub trait FormatAdapter: Send + Sync {
    /// Which service this adapter handles.
    fn source(&self) -> Source;

    /// Whether a file with this name belongs to this adapter.
    fn matches(&self, file_name: &str) -> bool;

    /// Parses a file.
    ///
    /// Individual bad records are counted in the outcome; only a file that
    /// cannot be read as a whole returns `Err`.
    fn parse(&self, content: &str, ctx: &AdapterContext) -> Result<ParseOutcome, AdapterError>;
}

/// How a file was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum FileStatus {
    Parsed(Source),
    /// No adapter claims the file name.
    Unrecognized,
    /// An adapter claimed the file but could not parse it.
    Malformed(Source),
}

/// Result of routing one file through the registry.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file_name: String,
    pub status: FileStatus,
    pub outcome: ParseOutcome,
}

/// Lower-cased final path component of a file name.
fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name)
        .to_lowercase()
}

/// Shared file-name test: one of `markers` in the base name and the given extension.
pub(crate) fn name_matches(file_name: &str, markers: &[&str], extension: &str) -> bool {
    let name = base_name(file_name);
    let has_extension = Path::new(&name)
        .extension()
        .is_some_and(|ext| ext == extension);
    has_extension && markers.iter().any(|m| name.contains(m))
}

/// The set of adapters consulted for every file, in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SpotifyAdapter),
            Box::new(YoutubeMusicAdapter),
            Box::new(AppleMusicAdapter),
        ])
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| a.source()))
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Box<dyn FormatAdapter>>) -> Self {
        Self { adapters }
    }

    /// Returns the first adapter that claims the file name.
    pub fn select(&self, file_name: &str) -> Option<&dyn FormatAdapter> {
        self.adapters
            .iter()
            .find(|a| a.matches(file_name))
            .map(AsRef::as_ref)
    }

    /// Parses one file, never failing.
    pub fn parse(&self, file_name: &str, content: &str, ctx: &AdapterContext) -> ParsedFile {
        let Some(adapter) = self.select(file_name) else {
            tracing::debug!(file = %file_name, "no adapter for file, skipping");
            return ParsedFile {
                file_name: file_name.to_string(),
                status: FileStatus::Unrecognized,
                outcome: ParseOutcome::default(),
            };
        };

        let source = adapter.source();
        match adapter.parse(content, ctx) {
            Ok(outcome) => {
                tracing::debug!(
                    file = %file_name,
                    %source,
                    events = outcome.events.len(),
                    null_names = outcome.null_names,
                    malformed = outcome.malformed,
                    "parsed export file"
                );
                ParsedFile {
                    file_name: file_name.to_string(),
                    status: FileStatus::Parsed(source),
                    outcome,
                }
            }
            Err(err) => {
                tracing::warn!(file = %file_name, %source, error = %err, "skipping malformed export file");
                ParsedFile {
                    file_name: file_name.to_string(),
                    status: FileStatus::Malformed(source),
                    outcome: ParseOutcome::default(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> AdapterContext {
        AdapterContext::from_config(
            &EngineConfig::default(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn selects_adapter_by_name_and_extension() {
        let registry = AdapterRegistry::default();
        let cases = [
            ("StreamingHistory_music_0.json", Some(Source::Spotify)),
            ("my_spotify_data/endsong_3.json", Some(Source::Spotify)),
            ("Takeout/YouTube/history/watch-history.json", Some(Source::YoutubeMusic)),
            ("Apple Music Play Activity.csv", Some(Source::AppleMusic)),
            ("spotify_history.csv", None),
            ("notes.txt", None),
            ("StreamingHistory.json.bak", None),
        ];

        for (name, expected) in cases {
            let selected = registry.select(name).map(|a| a.source());
            assert_eq!(selected, expected, "wrong adapter for {name}");
        }
    }

    #[test]
    fn unrecognized_file_contributes_nothing() {
        let registry = AdapterRegistry::default();
        let parsed = registry.parse("readme.md", "# hi", &ctx());

        assert_eq!(parsed.status, FileStatus::Unrecognized);
        assert!(parsed.outcome.events.is_empty());
    }

    #[test]
    fn malformed_file_contributes_nothing() {
        let registry = AdapterRegistry::default();
        let parsed = registry.parse("StreamingHistory0.json", "[{\"ts\": ", &ctx());

        assert_eq!(parsed.status, FileStatus::Malformed(Source::Spotify));
        assert!(parsed.outcome.events.is_empty());
    }
}
