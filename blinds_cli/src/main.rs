//! `blinds`: window blind actuator node.

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("color-eyre install failed: {e}");
    }

    if let Err(err) = real_main(cli) {
        tracing::error!(error = %format!("{err:#}"), "fatal");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config, cli.zones.as_deref())?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run { ticks, tick_ms } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = Arc::clone(&shutdown);
                if let Err(e) = ctrlc::set_handler(move || {
                    shutdown.store(true, Ordering::Relaxed);
                }) {
                    tracing::warn!(error = %e, "failed to install Ctrl-C handler");
                }
            }
            let summary = run::run_node(&cfg, ticks, tick_ms, cli.json, shutdown)?;
            run::print_summary(&summary, cli.json);
        }
        Commands::Status => {
            let snap = run::status(&cfg)?;
            if cli.json {
                println!("{}", run::snapshot_json(&snap));
            } else {
                println!("{snap}");
            }
        }
        Commands::SelfCheck => {
            run::self_check(&cfg)?;
            println!("ok");
        }
    }
    Ok(())
}

/// Read, parse and validate the TOML; a zone CSV replaces `[motion].zones`.
fn load_config(path: &Path, zones: Option<&Path>) -> Result<blinds_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let mut cfg = blinds_config::load_toml(&text)
        .wrap_err_with(|| format!("parsing config {}", path.display()))?;
    if let Some(csv) = zones {
        cfg.motion.zones = blinds_config::load_zones_csv(csv)
            .wrap_err_with(|| format!("loading zone table {}", csv.display()))?;
    }
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout carries only command output. A file
/// sink from `[logging].file` receives JSON lines.
fn init_tracing(cli: &Cli, logging: &blinds_config::Logging) -> Result<()> {
    // RUST_LOG, then a non-default --log-level, then [logging].level.
    let level = match logging.level.as_deref() {
        Some(cfg_level) if cli.log_level == "info" => cfg_level,
        _ => cli.log_level.as_str(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level '{level}'"))?;

    let file_writer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "never" => tracing_appender::rolling::never(dir, name),
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                other => eyre::bail!("logging.rotation must be never|daily|hourly, got '{other}'"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(writer)
        }
        None => None,
    };

    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let console = if cli.json {
        console.json().boxed()
    } else {
        console.boxed()
    };
    let file = file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w));
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("tracing init failed: {e}"))
}
