//! Runtime configuration for the acquisition core.
//!
//! These are the structs the components are constructed with. They are
//! separate from the TOML-deserialized config in `weigher_config`; see
//! `conversions` for the mapping.

use std::time::Duration;
use weigher_traits::LinkSettings;

/// How the port locator probes endpoints.
#[derive(Debug, Clone)]
pub struct ProbeCfg {
    /// Line settings used to open each candidate (9600 8N1, 2 s read timeout).
    pub link: LinkSettings,
    /// Firmware settle time between opening and the probe read.
    pub settle: Duration,
    /// Only probe these endpoints when non-empty.
    pub allow: Vec<String>,
}

impl Default for ProbeCfg {
    fn default() -> Self {
        Self {
            link: LinkSettings::default(),
            settle: Duration::from_secs(1),
            allow: Vec::new(),
        }
    }
}

/// Stabilization window parameters.
#[derive(Debug, Clone, Copy)]
pub struct StabilityCfg {
    pub window: usize,
    /// Largest accepted `max - min` spread inside a full window.
    pub tolerance: i32,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window: 3,
            tolerance: 1,
        }
    }
}

/// Dispatch policy parameters.
#[derive(Debug, Clone, Copy)]
pub struct PolicyCfg {
    pub min_send_interval: Duration,
}

impl Default for PolicyCfg {
    fn default() -> Self {
        Self {
            min_send_interval: Duration::from_secs(2),
        }
    }
}

/// Acquisition loop timing and buffer bounds.
#[derive(Debug, Clone, Copy)]
pub struct LoopCfg {
    /// Bounded read poll once connected; shutdown is observed at this boundary.
    pub poll: Duration,
    /// Wait before rescanning when no endpoint answered like a scale.
    pub not_found_backoff: Duration,
    /// Cooldown after an unexpected fault in the loop body.
    pub fault_cooldown: Duration,
    /// Receive buffer is discarded once it grows past this without a frame.
    pub max_unframed_bytes: usize,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(100),
            not_found_backoff: Duration::from_secs(10),
            fault_cooldown: Duration::from_secs(5),
            max_unframed_bytes: 100,
        }
    }
}

/// On-demand ("read now") parameters.
#[derive(Debug, Clone, Copy)]
pub struct OnDemandCfg {
    /// Absolute bound on a single capture.
    pub timeout: Duration,
}

impl Default for OnDemandCfg {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Who is recording: station name and site/company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub source_id: String,
    pub group_id: String,
}

/// Everything the acquisition loop and on-demand reader are built from.
#[derive(Debug, Clone)]
pub struct AcquisitionCfg {
    pub probe: ProbeCfg,
    pub stability: StabilityCfg,
    pub policy: PolicyCfg,
    pub timing: LoopCfg,
    pub on_demand: OnDemandCfg,
    pub identity: Identity,
}

impl AcquisitionCfg {
    pub fn new(identity: Identity) -> Self {
        Self {
            probe: ProbeCfg::default(),
            stability: StabilityCfg::default(),
            policy: PolicyCfg::default(),
            timing: LoopCfg::default(),
            on_demand: OnDemandCfg::default(),
            identity,
        }
    }
}

/// Background maintenance (storage pruning).
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceCfg {
    pub interval: Duration,
    /// Rows the sink keeps on each prune.
    pub keep: usize,
}

impl Default for MaintenanceCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            keep: 5,
        }
    }
}
