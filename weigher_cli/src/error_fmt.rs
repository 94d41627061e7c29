//! Human-readable error descriptions and structured JSON error formatting.

use weigher_core::ScaleError;
use weigher_store::StoreError;

/// Stable exit codes.
pub mod exit {
    pub const GENERIC: u8 = 1;
    pub const CONFIG: u8 = 2;
    pub const NO_SCALE: u8 = 3;
    pub const NOT_STABLE: u8 = 4;
    pub const STORAGE: u8 = 5;
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::NotConnected => {
                "What happened: No scale answered on any serial port.\nLikely causes: Scale powered off, USB adapter unplugged, or another program holds the port.\nHow to fix: Check the cable and power, close other serial tools, run `weigher ports --probe`, or restrict [serial].ports in the config.".to_string()
            }
            ScaleError::Timeout => {
                "What happened: The scale did not settle within the capture timeout.\nLikely causes: Load still moving, or readings jittering by more than the tolerance.\nHow to fix: Wait for the load to come to rest and retry; raise [on_demand].timeout_ms or [stabilization].tolerance if it never settles.".to_string()
            }
            ScaleError::Transport(msg) => format!(
                "What happened: Serial communication failed ({msg}).\nLikely causes: Cable disconnected mid-read or the adapter was reset.\nHow to fix: Reconnect the scale and retry."
            ),
            ScaleError::Sink(msg) => format!(
                "What happened: The reading could not be stored ({msg}).\nLikely causes: Storage path not writable or the remote API is unreachable.\nHow to fix: Check [storage] / [remote] in the config."
            ),
            ScaleError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            ScaleError::Internal(msg) => format!(
                "What happened: Internal error ({msg}).\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug and report the log."
            ),
        };
    }

    if let Some(st) = err.downcast_ref::<StoreError>() {
        return match st {
            StoreError::Io(e) => format!(
                "What happened: The local weight store could not be accessed ({e}).\nLikely causes: Missing permissions or a read-only disk.\nHow to fix: Check [storage].path and its directory permissions."
            ),
            StoreError::Http(e) => format!(
                "What happened: The remote API could not be reached ({e}).\nLikely causes: Network down or wrong [remote].url.\nHow to fix: Verify the URL and connectivity."
            ),
            StoreError::Status { status, .. } => format!(
                "What happened: The remote API refused the request (HTTP {status}).\nLikely causes: Server-side validation or outage.\nHow to fix: Check the server logs."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path.\nHow to fix: Pass --config <FILE> or create etc/weigher.toml. Original: {msg}"
        );
    }

    if lower.starts_with("parse config") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: A typo or an out-of-range value.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    if lower.contains("address in use") || lower.contains("bind api") {
        return format!(
            "What happened: The HTTP API could not listen on its address.\nLikely causes: Another collector instance is already running.\nHow to fix: Stop the other instance or change [api].bind. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

pub fn exit_code_for_error(err: &eyre::Report) -> u8 {
    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::NotConnected | ScaleError::Transport(_) => exit::NO_SCALE,
            ScaleError::Timeout => exit::NOT_STABLE,
            ScaleError::Sink(_) => exit::STORAGE,
            ScaleError::Config(_) => exit::CONFIG,
            ScaleError::Internal(_) => exit::GENERIC,
        };
    }
    if err.downcast_ref::<StoreError>().is_some() {
        return exit::STORAGE;
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.starts_with("read config") || lower.starts_with("parse config") || lower.contains("must be") {
        return exit::CONFIG;
    }
    exit::GENERIC
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match err.downcast_ref::<ScaleError>() {
        Some(ScaleError::NotConnected) => "NotConnected",
        Some(ScaleError::Timeout) => "NotStable",
        Some(ScaleError::Transport(_)) => "Transport",
        Some(ScaleError::Sink(_)) => "Storage",
        Some(ScaleError::Config(_)) => "Config",
        Some(ScaleError::Internal(_)) => "Internal",
        None if err.downcast_ref::<StoreError>().is_some() => "Storage",
        None => "Error",
    };
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
