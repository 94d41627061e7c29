//! Continuous acquisition: locate the scale, read, decode, stabilize, dispatch.
//!
//! ```text
//! Disconnected ──found──▶ Connected ──▶ Reading ⇄ StableCheck
//!      ▲  │                                 │
//!      │  └─not found: backoff              │ transport fault: close, rescan
//!      └────────────────────────────────────┘
//! ```
//!
//! Each connection starts a fresh [`Session`]; nothing carries over from the
//! previous port. Waits go through [`Shutdown::wait`] so a stop request is
//! seen within one poll interval. Unexpected errors and panics in the loop
//! body are logged and followed by a cooldown instead of ending the thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use weigher_traits::clock::Clock;
use weigher_traits::{PortEnumerator, ScalePort, WeightSink};

use crate::config::{AcquisitionCfg, LoopCfg, StabilityCfg};
use crate::error::ScaleError;
use crate::fault::map_port_error;
use crate::frame::RawBuffer;
use crate::locator::PortLocator;
use crate::policy::{DispatchOutcome, DispatchPolicy, DispatchState, Dispatcher};
use crate::shutdown::Shutdown;
use crate::slot::PortSlot;
use crate::window::StabilizationWindow;

/// Largest single read from the driver queue.
const READ_CHUNK: usize = 256;

/// Per-connection decode and dispatch state.
#[derive(Debug, Clone)]
pub struct Session {
    buffer: RawBuffer,
    window: StabilizationWindow,
    state: DispatchState,
}

impl Session {
    pub fn new(stability: StabilityCfg, max_unframed_bytes: usize) -> Self {
        Self {
            buffer: RawBuffer::new(max_unframed_bytes),
            window: StabilizationWindow::new(stability),
            state: DispatchState::default(),
        }
    }

    /// Feed received bytes through the decoder, window and dispatcher.
    ///
    /// Samples are handled strictly in arrival order; the result lists what
    /// happened to every stable candidate seen.
    pub fn ingest<S: WeightSink>(
        &mut self,
        bytes: &[u8],
        dispatcher: &Dispatcher<S>,
        now: Instant,
    ) -> Vec<DispatchOutcome> {
        self.buffer.extend(bytes);
        let mut outcomes = Vec::new();
        while let Some(sample) = self.buffer.next_sample() {
            self.window.push(sample);
            if let Some(candidate) = self.window.stable_value() {
                outcomes.push(dispatcher.offer(candidate, &mut self.state, &mut self.window, now));
            }
        }
        outcomes
    }

    /// Drop a partially received frame whose start no longer matches the stream.
    pub fn discard_partial(&mut self) {
        self.buffer.clear();
    }

    pub fn window(&self) -> &StabilizationWindow {
        &self.window
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// How one connect-and-read attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Shutdown,
    NotFound,
    Fault,
}

pub struct AcquisitionLoop<E: PortEnumerator, C: Clock, S: WeightSink> {
    locator: PortLocator<E, C>,
    dispatcher: Dispatcher<S>,
    clock: C,
    stability: StabilityCfg,
    timing: LoopCfg,
    slot: Arc<PortSlot>,
    shutdown: Shutdown,
}

impl<E, C, S> AcquisitionLoop<E, C, S>
where
    E: PortEnumerator,
    C: Clock + Clone,
    S: WeightSink,
{
    pub fn new(
        enumerator: E,
        clock: C,
        sink: S,
        cfg: &AcquisitionCfg,
        slot: Arc<PortSlot>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            locator: PortLocator::new(enumerator, clock.clone(), cfg.probe.clone()),
            dispatcher: Dispatcher::new(
                DispatchPolicy::new(cfg.policy),
                sink,
                cfg.identity.clone(),
            ),
            clock,
            stability: cfg.stability,
            timing: cfg.timing,
            slot,
            shutdown,
        }
    }

    /// Run until shutdown. Never returns early on errors.
    pub fn run(&self) {
        tracing::info!("acquisition loop started");
        while !self.shutdown.is_triggered() {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.connect_and_read()));
            let cooldown = match attempt {
                Ok(Ok(Exit::Shutdown)) => break,
                Ok(Ok(Exit::Fault)) => continue,
                Ok(Ok(Exit::NotFound)) => {
                    tracing::info!(
                        backoff_ms = self.timing.not_found_backoff.as_millis() as u64,
                        "scale not found, retrying"
                    );
                    self.timing.not_found_backoff
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "acquisition loop fault");
                    self.timing.fault_cooldown
                }
                Err(payload) => {
                    tracing::error!(panic = %panic_message(payload.as_ref()), "acquisition loop panicked");
                    self.timing.fault_cooldown
                }
            };
            if let Some(name) = self.slot.close() {
                tracing::debug!(port = %name, "port closed");
            }
            if self.shutdown.wait(cooldown) {
                break;
            }
        }
        if let Some(name) = self.slot.close() {
            tracing::info!(port = %name, "port closed on shutdown");
        }
        tracing::info!("acquisition loop stopped");
    }

    fn connect_and_read(&self) -> Result<Exit, ScaleError> {
        let port = match self.locator.locate() {
            Ok(Some(port)) => port,
            Ok(None) => return Ok(Exit::NotFound),
            Err(e) => {
                tracing::warn!(error = %e, "port scan failed");
                return Ok(Exit::NotFound);
            }
        };
        let name = port.name().to_owned();
        self.slot.install(port);
        tracing::info!(port = %name, "connected");

        let mut session = Session::new(self.stability, self.timing.max_unframed_bytes);
        let mut seen_handoffs = self.slot.handoffs();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if self.shutdown.is_triggered() {
                return Ok(Exit::Shutdown);
            }
            let read = {
                let mut guard = self.slot.lock();
                let Some(port) = guard.as_mut() else {
                    tracing::warn!(port = %name, "port closed underneath the loop");
                    return Ok(Exit::Fault);
                };
                let handoffs = self.slot.handoffs();
                if handoffs != seen_handoffs {
                    seen_handoffs = handoffs;
                    session.discard_partial();
                }
                read_waiting(port.as_mut(), &mut chunk)
            };
            let n = match read {
                Ok(n) => n,
                Err(ScaleError::Timeout) => 0,
                Err(e) if e.is_transport() => {
                    tracing::warn!(port = %name, error = %e, "serial fault, reconnecting");
                    if self.slot.close().is_some() {
                        tracing::debug!(port = %name, "port closed");
                    }
                    return Ok(Exit::Fault);
                }
                Err(e) => return Err(e),
            };
            if n > 0 {
                session.ingest(&chunk[..n], &self.dispatcher, self.clock.now());
            }
            if self.shutdown.wait(self.timing.poll) {
                return Ok(Exit::Shutdown);
            }
        }
    }
}

/// Read what the driver already holds, without blocking.
fn read_waiting(port: &mut dyn ScalePort, chunk: &mut [u8]) -> Result<usize, ScaleError> {
    let waiting = port
        .bytes_to_read()
        .map_err(|e| map_port_error(e.as_ref()))?;
    if waiting == 0 {
        return Ok(0);
    }
    let want = waiting.min(chunk.len());
    port.read_chunk(&mut chunk[..want])
        .map_err(|e| map_port_error(e.as_ref()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
