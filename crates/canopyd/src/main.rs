use std::path::Path;

use anyhow::{Context, Result, bail};
use canopy_config::{CanopyConfig, config_path, ensure_workspace_config, validate_config};
use canopy_core::windows;
use canopy_store::{JsonLedgerStore, LedgerStore};
use canopyd::cli::{Cli, Commands, LogFormat, RunArgs, parse_cli};
use canopyd::inspect::{print_history, print_windows};
use canopyd::pipeline::{Pipeline, RunOptions, resolve_path};
use canopyd::publish::{JsonMaskRenderer, JsonReportPublisher};
use chrono::{NaiveDate, Utc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = parse_cli();
    init_logging(cli.log_format, cli.verbose);
    run(cli)
}

fn init_logging(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Human => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            config_path(&workspace).display()
        )
    })?;
    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "config warning: {}", warning.message);
    }

    match cli.command {
        Commands::Run(args) => run_pipeline(&workspace, &config, args),
        Commands::Windows(args) => {
            let set = windows(anchor_or_today(args.anchor), &config.windows.definitions())?;
            print_windows(&set, &mut std::io::stdout().lock())
        }
        Commands::History(args) => {
            let dir = resolve_path(&workspace, &config.ledger.dir);
            let store = JsonLedgerStore::open(&dir)
                .with_context(|| format!("failed to open ledger directory {}", dir.display()))?;
            let ledger = store.load(&args.aoi)?;
            print_history(&ledger, &mut std::io::stdout().lock())
        }
    }
}

fn run_pipeline(workspace: &Path, config: &CanopyConfig, args: RunArgs) -> Result<()> {
    let options = RunOptions {
        anchor: anchor_or_today(args.anchor),
        local: args.local,
        force_publish: args.force_publish,
    };
    let renderer = JsonMaskRenderer;
    let publisher = JsonReportPublisher::new(resolve_path(workspace, &config.report.output_dir));
    let pipeline = Pipeline::new(config, workspace, &renderer, &publisher);

    tracing::info!(anchor = %options.anchor, projects = config.projects.len(), "run started");
    let summary = pipeline.run(&options)?;
    for outcome in &summary.outcomes {
        tracing::info!(
            aoi = %outcome.aoi_id,
            processing_date = %outcome.processing_date,
            new = ?outcome.new_windows,
            filled = ?outcome.filled_windows,
            skipped = ?outcome.skipped_windows,
            published = ?outcome.published,
            "AOI finished"
        );
    }

    if !summary.failures.is_empty() {
        let failed: Vec<_> = summary.failures.iter().map(|(name, _)| name.as_str()).collect();
        bail!(
            "{} of {} AOIs or projects failed: {}",
            failed.len(),
            failed.len() + summary.outcomes.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

fn anchor_or_today(anchor: Option<NaiveDate>) -> NaiveDate {
    anchor.unwrap_or_else(|| Utc::now().date_naive())
}
