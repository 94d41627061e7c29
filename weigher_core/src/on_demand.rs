//! One-shot "read now" capture on the port the acquisition loop holds.
//!
//! The reader takes the port lock for the whole capture, so the loop pauses
//! at its next read. A shutdown request ends the capture at the next read
//! boundary. The first stable window is recorded without the dispatch
//! policy's duplicate and interval suppression.

use std::sync::Arc;
use std::time::Duration;

use weigher_traits::clock::Clock;
use weigher_traits::{ScalePort, WeightSink};

use crate::config::{AcquisitionCfg, Identity, StabilityCfg};
use crate::error::ScaleError;
use crate::fault::{map_port_error, map_sink_error};
use crate::frame::RawBuffer;
use crate::shutdown::Shutdown;
use crate::slot::PortSlot;
use crate::window::StabilizationWindow;

/// A stable weight captured on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub weight: i32,
    /// Whether the sink accepted the record.
    pub recorded: bool,
}

/// Parameters of a single capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureCfg {
    pub stability: StabilityCfg,
    pub max_unframed_bytes: usize,
    /// Read timeout used for each read inside the capture.
    pub poll: Duration,
    /// Absolute bound on the whole capture.
    pub timeout: Duration,
}

impl From<&AcquisitionCfg> for CaptureCfg {
    fn from(c: &AcquisitionCfg) -> Self {
        Self {
            stability: c.stability,
            max_unframed_bytes: c.timing.max_unframed_bytes,
            poll: c.timing.poll,
            timeout: c.on_demand.timeout,
        }
    }
}

/// Discard stale input, then read until a window is stable or time runs out.
///
/// `Ok(None)` means the scale never settled within `cfg.timeout` or
/// `shutdown` fired first. Each read waits at most `cfg.poll`.
pub fn capture_stable<C: Clock>(
    port: &mut dyn ScalePort,
    cfg: &CaptureCfg,
    clock: &C,
    shutdown: &Shutdown,
) -> Result<Option<i32>, ScaleError> {
    port.clear_input().map_err(|e| map_port_error(e.as_ref()))?;
    port.set_read_timeout(cfg.poll)
        .map_err(|e| map_port_error(e.as_ref()))?;

    let start = clock.now();
    let mut buffer = RawBuffer::new(cfg.max_unframed_bytes);
    let mut window = StabilizationWindow::new(cfg.stability);
    let mut chunk = [0u8; 64];
    while clock.elapsed_since(start) < cfg.timeout {
        if shutdown.is_triggered() {
            tracing::debug!("capture abandoned: shutting down");
            return Ok(None);
        }
        let n = match port.read_chunk(&mut chunk) {
            Ok(n) => n,
            Err(e) => match map_port_error(e.as_ref()) {
                ScaleError::Timeout => 0,
                other => return Err(other),
            },
        };
        buffer.extend(&chunk[..n]);
        while let Some(sample) = buffer.next_sample() {
            window.push(sample);
            if let Some(v) = window.stable_value() {
                return Ok(Some(v));
            }
        }
    }
    Ok(None)
}

pub struct OnDemandReader<S: WeightSink, C: Clock> {
    slot: Arc<PortSlot>,
    sink: S,
    identity: Identity,
    cfg: CaptureCfg,
    clock: C,
    shutdown: Shutdown,
}

impl<S: WeightSink, C: Clock> OnDemandReader<S, C> {
    /// `shutdown` cuts a running capture short so `stop` is not held up
    /// behind the port lock.
    pub fn new(
        slot: Arc<PortSlot>,
        sink: S,
        cfg: &AcquisitionCfg,
        clock: C,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            slot,
            sink,
            identity: cfg.identity.clone(),
            cfg: cfg.into(),
            clock,
            shutdown,
        }
    }

    /// Capture a stable weight now and record it.
    ///
    /// Fails with `NotConnected` when no port is open. A transport error
    /// closes the port so the acquisition loop rescans. A sink failure is
    /// logged and reported through `Capture::recorded`. `Ok(None)` also
    /// covers a capture cut short by shutdown.
    pub fn read_now(&self) -> Result<Option<Capture>, ScaleError> {
        let captured = {
            let mut guard = self.slot.lock();
            let Some(port) = guard.as_mut() else {
                return Err(ScaleError::NotConnected);
            };
            self.slot.note_handoff();
            tracing::debug!(port = %port.name(), "on-demand capture started");
            match capture_stable(&mut **port, &self.cfg, &self.clock, &self.shutdown) {
                Ok(v) => v,
                Err(e) => {
                    if e.is_transport() {
                        *guard = None;
                    }
                    tracing::warn!(error = %e, "on-demand capture failed");
                    return Err(e);
                }
            }
        };

        let Some(weight) = captured else {
            if self.shutdown.is_triggered() {
                return Ok(None);
            }
            tracing::info!(
                timeout_ms = self.cfg.timeout.as_millis() as u64,
                "no stable reading"
            );
            return Ok(None);
        };
        let Identity {
            source_id,
            group_id,
        } = &self.identity;
        let recorded = match self.sink.record(weight, source_id, group_id) {
            Ok(()) => {
                tracing::info!(weight, "on-demand weight recorded");
                true
            }
            Err(e) => {
                tracing::error!(weight, error = %map_sink_error(e.as_ref()), "failed to record on-demand weight");
                false
            }
        };
        Ok(Some(Capture { weight, recorded }))
    }
}
