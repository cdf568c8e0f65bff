//! Engine tunables.

use serde::{Deserialize, Serialize};

use crate::identity::IdentityOverride;

/// Configuration for a single engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Plays shorter than this are tallied as short plays and excluded.
    /// Default: 30000 (30 seconds).
    pub min_play_ms: i64,

    /// Estimated duration of a user-initiated play in exports without durations.
    /// Default: 180000 (3 minutes).
    pub full_play_ms: i64,

    /// Estimated duration of any other play in exports without durations.
    /// Default: 30000, so such plays still pass the inclusion threshold.
    pub partial_play_ms: i64,

    /// Tracks with more total plays than this are never brief obsessions.
    pub obsession_max_plays: u32,

    /// Plays needed inside one window to qualify as a brief obsession.
    pub obsession_min_plays: u32,

    pub obsession_window_days: i64,

    /// Cap on the obsession list and on each year's ranking.
    pub ranking_limit: usize,

    /// Identity corrections consulted before the built-in table.
    pub overrides: Vec<IdentityOverride>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_play_ms: 30_000,
            full_play_ms: 180_000,
            partial_play_ms: 30_000,
            obsession_max_plays: 50,
            obsession_min_plays: 5,
            obsession_window_days: 7,
            ranking_limit: 100,
            overrides: Vec::new(),
        }
    }
}
