#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the scale data collector.
//!
//! - `Config` and its sections are deserialized from TOML; every section has
//!   defaults matching the field deployment, so an empty file is valid.
//! - `Config::validate` rejects values the acquisition loop cannot run with.
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialCfg {
    pub baud_rate: u32,
    /// Read timeout used while probing endpoints (ms)
    pub probe_timeout_ms: u64,
    /// Firmware settle time after opening an endpoint, before the probe read (ms)
    pub settle_ms: u64,
    /// Read poll used once connected; also the shutdown latency bound (ms)
    pub poll_ms: u64,
    /// Restrict probing to these endpoint names. Empty probes everything enumerated.
    pub ports: Vec<String>,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            probe_timeout_ms: 2000,
            settle_ms: 1000,
            poll_ms: 100,
            ports: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StabilizationCfg {
    /// Number of consecutive samples that must agree
    pub window: usize,
    /// Max spread (kg) between the largest and smallest sample in the window
    pub tolerance: i32,
}

impl Default for StabilizationCfg {
    fn default() -> Self {
        Self {
            window: 3,
            tolerance: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchCfg {
    /// Minimum time between two recorded values (ms). 2000 locally, 20000 against the remote API.
    pub min_send_interval_ms: u64,
}

impl Default for DispatchCfg {
    fn default() -> Self {
        Self {
            min_send_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReconnectCfg {
    /// Wait before rescanning when no scale answered (ms)
    pub not_found_backoff_ms: u64,
    /// Cooldown after an unexpected fault in the loop body (ms)
    pub fault_cooldown_ms: u64,
}

impl Default for ReconnectCfg {
    fn default() -> Self {
        Self {
            not_found_backoff_ms: 10_000,
            fault_cooldown_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferCfg {
    /// Discard the receive buffer once it grows past this without a frame
    pub max_unframed_bytes: usize,
}

impl Default for BufferCfg {
    fn default() -> Self {
        Self {
            max_unframed_bytes: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OnDemandCfg {
    /// Absolute wall-clock bound for a "read now" request (ms)
    pub timeout_ms: u64,
}

impl Default for OnDemandCfg {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityCfg {
    /// Station name recorded with every reading. Defaults to the host name.
    pub source_id: Option<String>,
    pub group_id: String,
}

impl Default for IdentityCfg {
    fn default() -> Self {
        Self {
            source_id: None,
            group_id: "SITC, SAN-PEDRO".to_string(),
        }
    }
}

impl IdentityCfg {
    /// Configured source id, else the host name, else "unknown".
    pub fn resolve_source_id(&self) -> String {
        if let Some(s) = self.source_id.as_deref().map(str::trim)
            && !s.is_empty()
        {
            return s.to_string();
        }
        let host = gethostname::gethostname().to_string_lossy().trim().to_string();
        if host.is_empty() {
            "unknown".to_string()
        } else {
            host
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageCfg {
    pub mode: StorageMode,
    /// JSON-lines file used in local mode
    pub path: PathBuf,
    /// Rows retained by the periodic prune
    pub keep: usize,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            mode: StorageMode::Local,
            path: PathBuf::from("var/weights.jsonl"),
            keep: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteCfg {
    /// Endpoint accepting `POST {poids, company, desktop}`
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteCfg {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiCfg {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceCfg {
    /// Period of the storage prune task (ms)
    pub interval_ms: u64,
}

impl Default for MaintenanceCfg {
    fn default() -> Self {
        Self {
            interval_ms: 600_000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Write the file log as JSON lines
    pub json: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub serial: SerialCfg,
    pub stabilization: StabilizationCfg,
    pub dispatch: DispatchCfg,
    pub reconnect: ReconnectCfg,
    pub buffer: BufferCfg,
    pub on_demand: OnDemandCfg,
    pub identity: IdentityCfg,
    pub storage: StorageCfg,
    pub remote: RemoteCfg,
    pub api: ApiCfg,
    pub maintenance: MaintenanceCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.baud_rate == 0 {
            eyre::bail!("serial.baud_rate must be > 0");
        }
        if self.serial.probe_timeout_ms == 0 {
            eyre::bail!("serial.probe_timeout_ms must be >= 1");
        }
        if self.serial.poll_ms == 0 {
            eyre::bail!("serial.poll_ms must be >= 1");
        }
        if self.serial.poll_ms >= self.serial.probe_timeout_ms {
            eyre::bail!("serial.poll_ms must be shorter than serial.probe_timeout_ms");
        }
        if self.serial.settle_ms > 60_000 {
            eyre::bail!("serial.settle_ms is unreasonably large (>60s)");
        }

        // Stabilization
        if self.stabilization.window == 0 {
            eyre::bail!("stabilization.window must be >= 1");
        }
        if self.stabilization.tolerance < 0 {
            eyre::bail!("stabilization.tolerance must be >= 0");
        }

        // Buffer: must hold at least one frame plus slack
        if self.buffer.max_unframed_bytes < 11 {
            eyre::bail!("buffer.max_unframed_bytes must be >= 11 (one frame)");
        }

        // Reconnect
        if self.reconnect.not_found_backoff_ms == 0 {
            eyre::bail!("reconnect.not_found_backoff_ms must be >= 1");
        }
        if self.reconnect.fault_cooldown_ms == 0 {
            eyre::bail!("reconnect.fault_cooldown_ms must be >= 1");
        }

        // On-demand
        if self.on_demand.timeout_ms == 0 {
            eyre::bail!("on_demand.timeout_ms must be >= 1");
        }

        // Storage
        if self.storage.keep == 0 {
            eyre::bail!("storage.keep must be >= 1");
        }
        if self.storage.mode == StorageMode::Local && self.storage.path.as_os_str().is_empty() {
            eyre::bail!("storage.path must be set in local mode");
        }
        if self.storage.mode == StorageMode::Remote {
            match self.remote.url.as_deref() {
                Some(u) if u.starts_with("http://") || u.starts_with("https://") => {}
                Some(u) => eyre::bail!("remote.url must be an http(s) URL, got {u:?}"),
                None => eyre::bail!("remote.url is required when storage.mode = \"remote\""),
            }
            if self.remote.timeout_ms == 0 {
                eyre::bail!("remote.timeout_ms must be >= 1");
            }
        }

        // Api
        if self.api.enabled && self.api.bind.parse::<std::net::SocketAddr>().is_err() {
            eyre::bail!("api.bind must be a socket address like 127.0.0.1:5000");
        }

        // Maintenance
        if self.maintenance.interval_ms == 0 {
            eyre::bail!("maintenance.interval_ms must be >= 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r:?}");
        }

        Ok(())
    }
}
