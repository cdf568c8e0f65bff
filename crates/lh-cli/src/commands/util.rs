//! Shared utilities for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use lh_core::{Engine, ListeningReport, SourceFile};
use rayon::prelude::*;
use regex::Regex;

use crate::Config;

/// Pre-compiled regex for relative date parsing.
static RELATIVE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(day|week)s?\s+ago$").unwrap());

/// Conservative bound for relative date parsing (~1000 years in days).
const MAX_RELATIVE_DAYS: u64 = 1000 * 365;

/// Parse a date string as either `YYYY-MM-DD` or a relative date.
///
/// Supports:
/// - ISO 8601 dates: "2024-01-15"
/// - Relative: "3 days ago", "1 week ago", "today"
pub fn parse_date(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if s.eq_ignore_ascii_case("today") {
        return Ok(today);
    }

    let Some(caps) = RELATIVE_DATE_RE.captures(s) else {
        anyhow::bail!("Invalid date: {s}. Use YYYY-MM-DD (e.g., 2024-01-15) or relative (e.g., '30 days ago')");
    };

    let n: u64 = caps[1]
        .parse()
        .context("failed to parse number in relative date")?;
    let days = match &caps[2] {
        "day" => n,
        "week" => n.saturating_mul(7),
        unit => anyhow::bail!("Unknown date unit: {unit}"),
    };
    if days > MAX_RELATIVE_DAYS {
        anyhow::bail!("Relative date too far back: {s}");
    }

    today
        .checked_sub_days(Days::new(days))
        .with_context(|| format!("date out of range: {s}"))
}

/// Expands directories into the files beneath them, in a stable order.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        collect_into(path, &mut files)?;
    }
    Ok(files)
}

fn collect_into(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("failed to read {}", path.display()))?;
    if !metadata.is_dir() {
        files.push(path.to_path_buf());
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to list {}", path.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .with_context(|| format!("failed to list {}", path.display()))?;
    entries.sort();

    for entry in entries {
        collect_into(&entry, files)?;
    }
    Ok(())
}

/// Reads every file concurrently into engine input.
///
/// Content that is not valid UTF-8 is decoded lossily; the adapters then
/// decide whether anything usable remains.
pub fn read_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    paths
        .par_iter()
        .map(|path| -> Result<SourceFile> {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(SourceFile::new(
                path.display().to_string(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        })
        .collect()
}

/// Reads the given paths and runs the engine over them.
pub fn load_report(config: &Config, paths: &[PathBuf]) -> Result<(Engine, ListeningReport)> {
    let files = collect_files(paths)?;
    tracing::debug!(count = files.len(), "collected input files");

    let sources = read_sources(&files)?;
    let engine = Engine::new(config.engine.clone());
    let report = engine.run(&sources)?;
    Ok((engine, report))
}

/// Formats milliseconds as duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if < 1 hour.
/// Negative durations are treated as 0m.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Writes a section heading with an underline of matching width.
pub fn write_section(output: &mut String, title: &str) {
    output.push('\n');
    output.push_str(title);
    output.push('\n');
    output.push_str(&"─".repeat(title.chars().count()));
    output.push('\n');
}
