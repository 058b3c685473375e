mod console;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use grants_core::ExtractName;
use grants_sync::{GrantsConfig, GrantsPipeline, PostDateWindow, RunSummary};
use tracing::info;

use crate::console::ConsoleReporter;

#[derive(Debug, Parser)]
#[command(name = "grants-cli")]
#[command(about = "Download, filter and export the Grants.gov daily extract")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, extract, parse, filter and write the CSV (default).
    Run(RunArgs),
    /// Print the download URL and local paths for an extract date.
    Url {
        #[arg(long, value_parser = parse_extract_date)]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Post-date window; overrides the filters file.
    #[arg(long, value_enum)]
    window: Option<WindowArg>,
    /// Extract date, YYYY-MM-DD or YYYYMMDD. Defaults to today.
    #[arg(long, value_parser = parse_extract_date)]
    date: Option<NaiveDate>,
    /// YAML file overriding the allow-lists.
    #[arg(long)]
    filters: Option<PathBuf>,
    #[arg(long)]
    preview_rows: Option<usize>,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WindowArg {
    Today,
    #[value(name = "last-3-days", alias = "last_3_days")]
    Last3Days,
    #[value(alias = "one_week")]
    OneWeek,
    #[value(alias = "four_weeks")]
    FourWeeks,
    All,
}

impl From<WindowArg> for PostDateWindow {
    fn from(value: WindowArg) -> Self {
        match value {
            WindowArg::Today => PostDateWindow::Today,
            WindowArg::Last3Days => PostDateWindow::Last3Days,
            WindowArg::OneWeek => PostDateWindow::OneWeek,
            WindowArg::FourWeeks => PostDateWindow::FourWeeks,
            WindowArg::All => PostDateWindow::All,
        }
    }
}

fn parse_extract_date(value: &str) -> Result<NaiveDate, String> {
    ["%Y-%m-%d", "%Y%m%d"]
        .into_iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| format!("expected YYYY-MM-DD or YYYYMMDD, got {value:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = GrantsConfig::from_env();
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            if let Some(path) = args.filters {
                config.filters_file = Some(path);
            }
            if let Some(rows) = args.preview_rows {
                config.preview_rows = rows;
            }
            let mut filters = config.load_filters()?;
            if let Some(window) = args.window {
                filters = filters.with_window(window.into());
            }

            let now = Local::now().naive_local();
            let extract_date = args.date.unwrap_or(now.date());
            info!(%extract_date, window = %filters.post_date_window, "starting run");

            let pipeline = GrantsPipeline::new(config, filters)?
                .with_reporter(Box::<ConsoleReporter>::default());
            let summary = pipeline.run_once(extract_date, now).await?;
            print_summary(&summary, args.json)?;
        }
        Commands::Url { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let layout = config.layout(date);
            println!("{}", ExtractName::for_date(date).download_url(&config.base_url));
            println!("zip: {}", layout.zip_path().display());
            println!("xml: {}", layout.xml_path().display());
            println!("csv: {}", layout.csv_path().display());
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!(
        "run complete: run_id={} parsed={} kept={} window={} csv={}",
        summary.run_id,
        summary.parsed_records,
        summary.written_rows,
        summary.post_date_window,
        summary.csv_path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn extract_dates_accept_both_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_extract_date("2024-01-15").unwrap(), expected);
        assert_eq!(parse_extract_date("20240115").unwrap(), expected);
        assert!(parse_extract_date("01/15/2024").is_err());
    }

    #[test]
    fn run_is_the_default_and_window_names_are_kebab_case() {
        let cli = Cli::try_parse_from(["grants-cli"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "grants-cli",
            "run",
            "--window",
            "last-3-days",
            "--date",
            "20240115",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert!(matches!(args.window, Some(WindowArg::Last3Days)));
                assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 1, 15));
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["grants-cli", "run", "--window", "four-weeks"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run(RunArgs {
                window: Some(WindowArg::FourWeeks),
                ..
            }))
        ));
    }

    #[test]
    fn printed_window_names_are_accepted_back() {
        for window in [
            PostDateWindow::Today,
            PostDateWindow::Last3Days,
            PostDateWindow::OneWeek,
            PostDateWindow::FourWeeks,
            PostDateWindow::All,
        ] {
            let name = window.to_string();
            let cli = Cli::try_parse_from(["grants-cli", "run", "--window", name.as_str()])
                .unwrap_or_else(|err| panic!("{name}: {err}"));
            match cli.command {
                Some(Commands::Run(RunArgs {
                    window: Some(arg), ..
                })) => assert_eq!(PostDateWindow::from(arg), window),
                other => panic!("unexpected command: {other:?}"),
            }
        }
    }
}
