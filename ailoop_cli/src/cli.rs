//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "ailoop", version, about = "Six-channel 4-20 mA input module")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the module on the simulated board and report every channel
    Simulate {
        /// Scheduling ticks to run
        #[arg(long, default_value_t = 3_000)]
        ticks: u64,
        /// Pace ticks at scheduler.period_ms instead of running flat out
        #[arg(long, action = ArgAction::SetTrue)]
        realtime: bool,
        /// Keep running until Ctrl-C (implies --realtime)
        #[arg(long, action = ArgAction::SetTrue)]
        until_interrupt: bool,
        /// Request one receive on each listed bus channel at start
        #[arg(long, value_name = "CH", value_delimiter = ',')]
        receive: Vec<u8>,
        /// Fail if a --receive channel got no complete frame by the end of the run
        #[arg(long, action = ArgAction::SetTrue, requires = "receive")]
        require_rx: bool,
        /// Flash image to boot from (overrides simulation.flash_image)
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
    },
    /// Calibrate one channel on the simulated board, save, power-cycle and verify
    Calibrate {
        /// Channel to calibrate (0..=5)
        #[arg(long)]
        channel: u8,
        /// Flash image receiving the record (overrides simulation.flash_image)
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
        /// Reference current checked after the power cycle, in mA
        #[arg(long, value_name = "MA", default_value_t = 12)]
        verify_ma: u16,
    },
    /// Fit a correction curve offline from a points CSV (headers: ma,code)
    Fit {
        #[arg(value_name = "CSV")]
        points: PathBuf,
    },
    /// Decode and verify the calibration record in a flash image
    Inspect {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Validate the config and boot the simulated board once
    SelfCheck,
}
