//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use weigher_hardware::SimProfile;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "weigher", version, about = "Serial scale weight collector")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/weigher.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON lines
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Use a simulated scale instead of serial hardware
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub sim: bool,

    /// Weight sequence for the simulated scale, as `weight:frames` steps
    #[arg(
        long = "sim-profile",
        value_name = "STEPS",
        value_parser = parse_sim_profile,
        global = true
    )]
    pub sim_profile: Option<SimProfile>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the collector: acquisition loop, maintenance and the local HTTP API
    Run {
        /// Do not start the HTTP API even if enabled in the config
        #[arg(long, action = ArgAction::SetTrue)]
        no_api: bool,
        /// Stop on its own after this many milliseconds
        #[arg(long, value_name = "MS")]
        stop_after_ms: Option<u64>,
    },
    /// Locate the scale, capture one stable weight and record it
    ReadNow {
        /// Print the weight without recording it
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Show the latest recorded weight
    Latest {
        /// Station name filter (defaults to this station)
        #[arg(long)]
        desktop: Option<String>,
        /// Company/site filter (defaults to the configured one)
        #[arg(long)]
        company: Option<String>,
    },
    /// List serial endpoints
    Ports {
        /// Probe each endpoint for scale frames
        #[arg(long, action = ArgAction::SetTrue)]
        probe: bool,
    },
    /// Quick health check: config, storage, port enumeration
    SelfCheck,
}

/// Parse `0:30,1250:40` into a simulator profile.
pub fn parse_sim_profile(s: &str) -> Result<SimProfile, String> {
    let mut steps = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (w, n) = part
            .split_once(':')
            .ok_or_else(|| format!("step {part:?} is not weight:frames"))?;
        let weight: i32 = w
            .trim()
            .parse()
            .map_err(|_| format!("weight {w:?} is not an integer"))?;
        let frames: u32 = n
            .trim()
            .parse()
            .map_err(|_| format!("frame count {n:?} is not a positive integer"))?;
        if frames == 0 {
            return Err(format!("step {part:?} must last at least one frame"));
        }
        steps.push((weight, frames));
    }
    if steps.is_empty() {
        return Err("profile has no steps".to_string());
    }
    Ok(SimProfile {
        steps,
        period: Duration::from_millis(100),
    })
}
