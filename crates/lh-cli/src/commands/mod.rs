//! CLI subcommand implementations.

pub mod query;
pub mod report;
pub mod util;
pub mod years;
