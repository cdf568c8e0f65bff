//! Years command: the top tracks of each calendar year.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use lh_core::YearTrack;

use super::util::{format_duration, load_report, write_section};
use crate::Config;

/// Keeps the requested year (or all of them) and at most `top` tracks each.
pub fn select_years(
    years: &BTreeMap<i32, Vec<YearTrack>>,
    year: Option<i32>,
    top: usize,
) -> BTreeMap<i32, Vec<YearTrack>> {
    years
        .iter()
        .filter(|(y, _)| year.is_none_or(|wanted| wanted == **y))
        .map(|(y, tracks)| (*y, tracks.iter().take(top).cloned().collect()))
        .collect()
}

/// Formats year rankings for the terminal.
pub fn format_years(years: &BTreeMap<i32, Vec<YearTrack>>) -> String {
    let mut output = String::new();
    writeln!(output, "TOP TRACKS BY YEAR").unwrap();

    if years.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "No plays in the selected years.").unwrap();
        return output;
    }

    for (year, tracks) in years {
        write_section(&mut output, &year.to_string());
        for (i, entry) in tracks.iter().enumerate() {
            let label = format!("{} by {}", entry.track.name, entry.track.artist);
            writeln!(
                output,
                "  {:>2}. {label:<28} {:>8}  {} plays  score {:.2}",
                i + 1,
                format_duration(entry.track.total_played_ms),
                entry.track.play_count,
                entry.score
            )
            .unwrap();
        }
    }

    output
}

/// Runs the years command.
pub fn run(
    config: &Config,
    paths: &[PathBuf],
    year: Option<i32>,
    top: Option<usize>,
    json: bool,
) -> Result<()> {
    let (_engine, report) = load_report(config, paths)?;
    let years = select_years(&report.years, year, top.unwrap_or(config.top_n));

    if json {
        println!("{}", serde_json::to_string_pretty(&years)?);
    } else {
        print!("{}", format_years(&years));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;
    use lh_core::{Engine, SourceFile};

    const SPOTIFY: &str = r#"[
        {"ts": "2023-05-01T10:00:00Z", "ms_played": 200000,
         "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X"},
        {"ts": "2023-05-02T10:00:00Z", "ms_played": 250000,
         "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X"},
        {"ts": "2024-01-01T10:00:00Z", "ms_played": 150000,
         "master_metadata_track_name": "Song A", "master_metadata_album_artist_name": "Artist X"},
        {"ts": "2024-01-02T10:00:00Z", "ms_played": 240000,
         "master_metadata_track_name": "Song B", "master_metadata_album_artist_name": "Artist Y"},
        {"ts": "2024-01-03T10:00:00Z", "ms_played": 240000,
         "master_metadata_track_name": "Song B", "master_metadata_album_artist_name": "Artist Y"}
    ]"#;

    fn sample_years() -> BTreeMap<i32, Vec<YearTrack>> {
        let evaluated_at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        Engine::default()
            .run_at(&[SourceFile::new("StreamingHistory0.json", SPOTIFY)], evaluated_at)
            .unwrap()
            .years
    }

    #[test]
    fn test_years_all() {
        let years = select_years(&sample_years(), None, 10);
        assert_snapshot!(format_years(&years), @r"
        TOP TRACKS BY YEAR

        2023
        ────
           1. Song A by Artist X                 6m  2 plays  score 2.83

        2024
        ────
           1. Song B by Artist Y                 8m  2 plays  score 2.83
           2. Song A by Artist X                 3m  1 plays  score 1.00
        ");
    }

    #[test]
    fn test_years_single_year_and_top() {
        let years = select_years(&sample_years(), Some(2024), 1);
        assert_eq!(years.len(), 1);
        assert_eq!(years[&2024].len(), 1);
        assert_eq!(years[&2024][0].track.name, "Song B");
    }

    #[test]
    fn test_years_missing_year() {
        let years = select_years(&sample_years(), Some(1999), 10);
        assert!(years.is_empty());
        assert_snapshot!(format_years(&years), @r"
        TOP TRACKS BY YEAR

        No plays in the selected years.
        ");
    }
}
