//! `From` implementations bridging `weigher_config` types to `weigher_core` types.

use std::time::Duration;

use weigher_traits::LinkSettings;

use crate::config::{
    AcquisitionCfg, Identity, LoopCfg, MaintenanceCfg, OnDemandCfg, PolicyCfg, ProbeCfg,
    StabilityCfg,
};

// ── ProbeCfg ─────────────────────────────────────────────────────────────────

impl From<&weigher_config::SerialCfg> for ProbeCfg {
    fn from(c: &weigher_config::SerialCfg) -> Self {
        Self {
            link: LinkSettings {
                baud_rate: c.baud_rate,
                read_timeout: Duration::from_millis(c.probe_timeout_ms),
            },
            settle: Duration::from_millis(c.settle_ms),
            allow: c.ports.clone(),
        }
    }
}

// ── StabilityCfg ─────────────────────────────────────────────────────────────

impl From<&weigher_config::StabilizationCfg> for StabilityCfg {
    fn from(c: &weigher_config::StabilizationCfg) -> Self {
        Self {
            window: c.window,
            tolerance: c.tolerance,
        }
    }
}

// ── PolicyCfg ────────────────────────────────────────────────────────────────

impl From<&weigher_config::DispatchCfg> for PolicyCfg {
    fn from(c: &weigher_config::DispatchCfg) -> Self {
        Self {
            min_send_interval: Duration::from_millis(c.min_send_interval_ms),
        }
    }
}

// ── LoopCfg ──────────────────────────────────────────────────────────────────

impl From<&weigher_config::Config> for LoopCfg {
    fn from(c: &weigher_config::Config) -> Self {
        Self {
            poll: Duration::from_millis(c.serial.poll_ms),
            not_found_backoff: Duration::from_millis(c.reconnect.not_found_backoff_ms),
            fault_cooldown: Duration::from_millis(c.reconnect.fault_cooldown_ms),
            max_unframed_bytes: c.buffer.max_unframed_bytes,
        }
    }
}

// ── OnDemandCfg ──────────────────────────────────────────────────────────────

impl From<&weigher_config::OnDemandCfg> for OnDemandCfg {
    fn from(c: &weigher_config::OnDemandCfg) -> Self {
        Self {
            timeout: Duration::from_millis(c.timeout_ms),
        }
    }
}

// ── Identity ─────────────────────────────────────────────────────────────────

impl From<&weigher_config::IdentityCfg> for Identity {
    fn from(c: &weigher_config::IdentityCfg) -> Self {
        Self {
            source_id: c.resolve_source_id(),
            group_id: c.group_id.clone(),
        }
    }
}

// ── AcquisitionCfg ───────────────────────────────────────────────────────────

impl From<&weigher_config::Config> for AcquisitionCfg {
    fn from(c: &weigher_config::Config) -> Self {
        Self {
            probe: (&c.serial).into(),
            stability: (&c.stabilization).into(),
            policy: (&c.dispatch).into(),
            timing: c.into(),
            on_demand: (&c.on_demand).into(),
            identity: (&c.identity).into(),
        }
    }
}

// ── MaintenanceCfg ───────────────────────────────────────────────────────────

impl From<&weigher_config::Config> for MaintenanceCfg {
    fn from(c: &weigher_config::Config) -> Self {
        Self {
            interval: Duration::from_millis(c.maintenance.interval_ms),
            keep: c.storage.keep,
        }
    }
}
