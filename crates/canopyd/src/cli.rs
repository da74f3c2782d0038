use std::ffi::OsStr;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RunArgs {
    #[arg(
        long,
        value_parser = parse_anchor,
        help = "Processing anchor date (YYYY-MM-DD); defaults to today (UTC)"
    )]
    pub anchor: Option<NaiveDate>,

    #[arg(long, help = "Assemble reports but do not publish them")]
    pub local: bool,

    #[arg(
        long,
        help = "Publish the latest ledger entry even when no window has new data"
    )]
    pub force_publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct WindowsArgs {
    #[arg(
        long,
        value_parser = parse_anchor,
        help = "Anchor date (YYYY-MM-DD); defaults to today (UTC)"
    )]
    pub anchor: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct HistoryArgs {
    #[arg(help = "AOI id (snake_case project name)")]
    pub aoi: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Evaluate every configured AOI and publish reports for new data.
    Run(RunArgs),
    /// Print the time windows for an anchor date.
    Windows(WindowsArgs),
    /// Print the processing dates and satellite dates stored for an AOI.
    History(HistoryArgs),
}

#[derive(Debug, Parser)]
#[command(author, version, about = "CANOPY vegetation cover change daemon")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .canopy/config.toml"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(long, short, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_anchor(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("invalid anchor date '{value}': {err}"))
}
