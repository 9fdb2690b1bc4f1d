//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "blinds", version, about = "Window blind actuator controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/blinds_encoder.toml")]
    pub config: PathBuf,

    /// Optional zone table CSV (strict header); replaces [motion].zones
    #[arg(long, value_name = "FILE")]
    pub zones: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve commands from the broker and drive the blind
    Run {
        /// Stop after this many control ticks (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Override [runner].tick_ms
        #[arg(long = "tick-ms", value_name = "MS")]
        tick_ms: Option<u64>,
    },
    /// Print one diagnostic snapshot and exit
    Status,
    /// Quick health check (config, driver and encoder presence)
    SelfCheck,
}
