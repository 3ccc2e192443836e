//! CLI entry point for the harvester tool.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::config::resolve_default_config_path;
use harvester_core::{FileConfig, Harvester, Settings};
use tracing::{debug, info};

mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let settings = resolve_settings(&args)?;
    debug!(?settings, "settings resolved");
    info!(sources = %settings.sources.display(), "harvester starting");

    let harvester = Harvester::new(settings).context("cannot start harvester")?;

    let use_spinner = !args.quiet && !args.list_only && io::stderr().is_terminal();
    let (spinner, stop) = progress::spawn_progress_ui(use_spinner, harvester.stats());
    let result = harvester.run().await;
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }
    let summary = result.context("harvest failed")?;

    if summary.list_only {
        let mut stdout = io::stdout().lock();
        for link in &summary.links {
            writeln!(stdout, "{}", link.url)?;
        }
        return Ok(());
    }

    info!(
        discovered = summary.discovered(),
        downloaded = summary.downloaded,
        unchanged = summary.unchanged + summary.not_modified,
        failed = summary.failed,
        manifest = %harvester.settings().manifest.display(),
        "done"
    );
    Ok(())
}

/// Defaults, then the config file, then the environment, then the flags.
fn resolve_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::default();

    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => resolve_default_config_path().filter(|path| path.is_file()),
    };
    if let Some(path) = config_path {
        let file = FileConfig::load(&path)?;
        debug!(path = %path.display(), "config file loaded");
        settings.apply_file(&file);
    }

    settings.apply_process_env()?;
    args.apply_to(&mut settings);
    settings.validate().context("invalid settings")?;
    Ok(settings)
}
