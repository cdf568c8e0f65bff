//! Report command for the full listening summary.
//!
//! This module implements `lh report` with human-readable and JSON output.

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use lh_core::{FileStatus, ListeningReport};

use super::util::{format_duration, load_report, write_section};
use crate::Config;

/// Formats the human-readable report output.
pub fn format_report(report: &ListeningReport, top: usize) -> String {
    let mut output = String::new();
    let totals = &report.totals;

    writeln!(output, "LISTENING REPORT").unwrap();
    if let (Some(first), Some(last)) = (totals.first_play, totals.last_play) {
        writeln!(
            output,
            "{} to {}",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        )
        .unwrap();
    }

    let parsed_files = report
        .files
        .iter()
        .filter(|f| matches!(f.status, FileStatus::Parsed(_)))
        .count();
    let skipped_files = report.files.len() - parsed_files;

    write_section(&mut output, "SUMMARY");
    writeln!(
        output,
        "  Listening:  {}",
        format_duration(totals.total_listening_ms)
    )
    .unwrap();
    writeln!(
        output,
        "  Podcasts:   {} ({} plays)",
        format_duration(totals.podcast_listening_ms),
        totals.podcast_count
    )
    .unwrap();
    writeln!(output, "  Plays:      {}", totals.processed_count).unwrap();
    writeln!(
        output,
        "  Skipped:    {} short, {} unnamed, {} malformed",
        totals.short_play_count, totals.null_name_count, totals.malformed_count
    )
    .unwrap();
    writeln!(
        output,
        "  Files:      {parsed_files} parsed, {skipped_files} skipped"
    )
    .unwrap();

    write_section(&mut output, "TOP ARTISTS");
    write_none_if_empty(&mut output, report.artists.is_empty());
    for (i, artist) in report.artists.iter().take(top).enumerate() {
        writeln!(
            output,
            "  {:>2}. {:<28} {:>8}  streak {}d",
            i + 1,
            artist.name,
            format_duration(artist.total_played_ms),
            artist.streak.longest_run_days
        )
        .unwrap();
    }

    write_section(&mut output, "TOP TRACKS");
    write_none_if_empty(&mut output, report.tracks.is_empty());
    for (i, track) in report.tracks.iter().take(top).enumerate() {
        let label = format!("{} by {}", track.name, track.artist);
        writeln!(
            output,
            "  {:>2}. {label:<28} {:>8}  {} plays",
            i + 1,
            format_duration(track.total_played_ms),
            track.play_count
        )
        .unwrap();
    }

    write_section(&mut output, "TOP ALBUMS");
    write_none_if_empty(&mut output, report.albums.is_empty());
    for (i, album) in report.albums.iter().take(top).enumerate() {
        let label = format!("{} by {}", album.name, album.artist);
        writeln!(
            output,
            "  {:>2}. {label:<28} {:>8}  {} tracks",
            i + 1,
            format_duration(album.total_played_ms),
            album.track_count
        )
        .unwrap();
    }

    write_section(&mut output, "BRIEF OBSESSIONS");
    write_none_if_empty(&mut output, report.obsessions.is_empty());
    for (i, obsession) in report.obsessions.iter().take(top).enumerate() {
        let label = format!("{} by {}", obsession.track.name, obsession.track.artist);
        writeln!(
            output,
            "  {:>2}. {label:<28} {} plays from {}",
            i + 1,
            obsession.plays_in_window,
            obsession.window_start.format("%Y-%m-%d")
        )
        .unwrap();
    }

    write_section(&mut output, "TOP EPISODES");
    write_none_if_empty(&mut output, report.top_episodes.is_empty());
    for (i, episode) in report.top_episodes.iter().take(top).enumerate() {
        let label = format!("{} ({})", episode.title, episode.subtitle);
        writeln!(
            output,
            "  {:>2}. {label:<28} {:>8}",
            i + 1,
            format_duration(episode.total_played_ms)
        )
        .unwrap();
    }

    write_section(&mut output, "PATTERNS");
    if let Some(hour) = report.patterns.peak_hour() {
        writeln!(output, "  Peak hour:    {hour:02}:00 UTC").unwrap();
    }
    if let Some(weekday) = report.patterns.busiest_weekday() {
        writeln!(output, "  Busiest day:  {weekday}").unwrap();
    }
    for (month, ms) in &report.patterns.monthly_ms {
        writeln!(output, "  {month}:      {}", format_duration(*ms)).unwrap();
    }

    output
}

fn write_none_if_empty(output: &mut String, empty: bool) {
    if empty {
        writeln!(output, "  (none)").unwrap();
    }
}

/// Formats the full report as JSON.
pub fn format_report_json(report: &ListeningReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Runs the report command.
pub fn run(config: &Config, paths: &[PathBuf], json: bool, top: Option<usize>) -> Result<()> {
    let (_engine, report) = load_report(config, paths)?;

    if json {
        let output = format_report_json(&report)?;
        println!("{output}");
    } else {
        let output = format_report(&report, top.unwrap_or(config.top_n));
        print!("{output}");
    }

    Ok(())
}
