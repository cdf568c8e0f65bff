//! Query command for custom date range and podcast rankings.

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use lh_core::{QueryOptions, QueryRow, QueryScope, SortKey};
use serde::Serialize;

use super::util::{format_duration, load_report, parse_date};
use crate::Config;

/// Query flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    pub artists: Vec<String>,
    pub shows: Vec<String>,
    pub podcasts: bool,
    pub top: Option<usize>,
    pub sort: SortKey,
}

impl QueryRequest {
    /// Resolves dates relative to `today` and fills in defaults.
    pub fn into_options(self, default_top: usize, today: NaiveDate) -> Result<QueryOptions> {
        let start_date = self.start.map(|s| parse_date(&s, today)).transpose()?;
        let end_date = self.end.map(|s| parse_date(&s, today)).transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                bail!("start date {start} is after end date {end}");
            }
        }

        let (scope, entities) = if self.podcasts || !self.shows.is_empty() {
            (QueryScope::Episodes, self.shows)
        } else {
            (QueryScope::Tracks, self.artists)
        };

        Ok(QueryOptions {
            start_date,
            end_date,
            entities,
            top_n: self.top.unwrap_or(default_top),
            sort_key: self.sort,
            scope,
        })
    }
}

#[derive(Debug, Serialize)]
struct JsonQuery<'a> {
    options: &'a QueryOptions,
    rows: &'a [QueryRow],
}

fn format_range(options: &QueryOptions) -> String {
    match (options.start_date, options.end_date) {
        (None, None) => "all time".to_string(),
        (Some(start), None) => format!("{start} onwards"),
        (None, Some(end)) => format!("up to {end}"),
        (Some(start), Some(end)) => format!("{start} to {end}"),
    }
}

/// Formats query rows for the terminal.
pub fn format_query(rows: &[QueryRow], options: &QueryOptions) -> String {
    let mut output = String::new();
    let what = match options.scope {
        QueryScope::Tracks => "TRACKS",
        QueryScope::Episodes => "EPISODES",
    };
    writeln!(
        output,
        "TOP {what} BY {}",
        options.sort_key.as_str().to_uppercase()
    )
    .unwrap();
    writeln!(output, "Range: {}", format_range(options)).unwrap();
    if !options.entities.is_empty() {
        writeln!(output, "Only: {}", options.entities.join(", ")).unwrap();
    }
    writeln!(output).unwrap();

    if rows.is_empty() {
        writeln!(output, "No plays match this query.").unwrap();
        return output;
    }

    for (i, row) in rows.iter().enumerate() {
        let label = match options.scope {
            QueryScope::Tracks => format!("{} by {}", row.title, row.subtitle),
            QueryScope::Episodes => format!("{} ({})", row.title, row.subtitle),
        };
        writeln!(
            output,
            "  {:>2}. {label:<28} {:>8}  {} sessions, {} completed",
            i + 1,
            format_duration(row.total_played_ms),
            row.sessions,
            row.completed_plays
        )
        .unwrap();
    }

    output
}

/// Formats query rows as JSON, echoing the resolved options.
pub fn format_query_json(rows: &[QueryRow], options: &QueryOptions) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonQuery { options, rows })?)
}

/// Runs the query command.
pub fn run(config: &Config, paths: &[PathBuf], options: &QueryOptions, json: bool) -> Result<()> {
    let (engine, report) = load_report(config, paths)?;
    let rows = engine.query(&report.events, options);

    if json {
        println!("{}", format_query_json(&rows, options)?);
    } else {
        print!("{}", format_query(&rows, options));
    }

    Ok(())
}
