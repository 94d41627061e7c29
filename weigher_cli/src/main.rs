#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `weigher`: collects stable weights from a serial scale.

mod api;
mod cli;
mod commands;
mod error_fmt;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() -> ExitCode {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let json = cli.json;
    let _ = JSON_MODE.set(json);

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if json {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            ExitCode::from(exit_code_for_error(&e))
        }
    }
}
