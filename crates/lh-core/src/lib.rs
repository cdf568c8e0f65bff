//! Core engine for listening history statistics.
//!
//! This crate contains the fundamental types and logic for:
//! - Format adapters: turning Spotify, Apple Music and YouTube Music exports into play events
//! - Identity resolution: merging the same logical track across services
//! - Aggregation: per-track, per-artist and per-album running statistics
//! - Temporal analysis: streaks, brief obsessions and year rankings
//! - Queries: ad-hoc date range and entity filtered rankings
//!
//! The engine is a pure transform. Every call to [`Engine::run`] recomputes
//! everything from the supplied file set; nothing is persisted between calls.

pub mod adapter;
pub mod aggregate;
mod apple;
mod config;
mod engine;
pub mod event;
pub mod identity;
pub mod query;
mod spotify;
pub mod temporal;
mod youtube;

pub use adapter::{
    AdapterContext, AdapterError, AdapterRegistry, FileStatus, FormatAdapter, ParseOutcome,
    ParsedFile,
};
pub use aggregate::{
    AlbumAggregate, Aggregation, ArtistAggregate, Totals, TrackAggregate, aggregate,
};
pub use config::EngineConfig;
pub use engine::{Engine, EngineError, FileSummary, ListeningReport, SourceFile};
pub use event::{PlayEvent, Source, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_SHOW};
pub use identity::{IdentityOverride, IdentityResolver, MatchKey, match_key, normalize};
pub use query::{QueryOptions, QueryRow, QueryScope, SortKey, query};
pub use temporal::{BriefObsession, ListeningPatterns, Streak, YearTrack};
