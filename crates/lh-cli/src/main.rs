use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lh_cli::commands::query::QueryRequest;
use lh_cli::commands::{query, report, years};
use lh_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match command {
        Commands::Report { paths, json, top } => report::run(&config, &paths, json, top)?,
        Commands::Query {
            paths,
            start,
            end,
            artists,
            shows,
            podcasts,
            top,
            sort,
            json,
        } => {
            let request = QueryRequest {
                start,
                end,
                artists,
                shows,
                podcasts,
                top,
                sort,
            };
            let today = chrono::Utc::now().date_naive();
            let options = request.into_options(config.top_n, today)?;
            query::run(&config, &paths, &options, json)?;
        }
        Commands::Years {
            paths,
            year,
            top,
            json,
        } => years::run(&config, &paths, year, top, json)?,
    }

    Ok(())
}
