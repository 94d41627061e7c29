//! Dispatch policy: which stable weights are worth recording.
//!
//! Checks run in a fixed order and the first rejection wins:
//! negative, duplicate of the last recorded value, too soon after the last
//! record, then the zero rule (a zero is only recorded when the last known
//! value is non-zero or unknown).

use std::time::{Duration, Instant};

use weigher_traits::{BoxError, WeightSink};

use crate::config::{Identity, PolicyCfg};
use crate::fault::map_sink_error;
use crate::window::StabilizationWindow;

/// What the policy remembers between decisions.
///
/// Owned by one acquisition session; reset whenever the port is reopened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchState {
    pub last_sent_weight: Option<i32>,
    pub last_sent_time: Option<Instant>,
}

impl DispatchState {
    pub fn mark_sent(&mut self, weight: i32, at: Instant) {
        self.last_sent_weight = Some(weight);
        self.last_sent_time = Some(at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Negative,
    Duplicate,
    TooSoon { remaining: Duration },
    /// The last known value is already zero.
    ZeroAlreadyRecorded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Negative => f.write_str("negative weight"),
            RejectReason::Duplicate => f.write_str("same as last recorded weight"),
            RejectReason::TooSoon { remaining } => {
                write!(f, "too soon, {}ms left", remaining.as_millis())
            }
            RejectReason::ZeroAlreadyRecorded => f.write_str("zero already recorded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchPolicy {
    cfg: PolicyCfg,
}

impl DispatchPolicy {
    pub fn new(cfg: PolicyCfg) -> Self {
        Self { cfg }
    }

    /// Decide whether `weight` should be recorded now.
    ///
    /// `last_known` is only called for a zero that passed the earlier checks.
    /// When it reports a zero, `state.last_sent_weight` is set to zero so the
    /// following zeros stop at the duplicate check without another lookup.
    /// A failing lookup does not block the zero.
    pub fn decide<F>(
        &self,
        weight: i32,
        state: &mut DispatchState,
        now: Instant,
        last_known: F,
    ) -> Decision
    where
        F: FnOnce() -> Result<Option<f64>, BoxError>,
    {
        if weight < 0 {
            return Decision::Reject(RejectReason::Negative);
        }
        if state.last_sent_weight == Some(weight) {
            return Decision::Reject(RejectReason::Duplicate);
        }
        if let Some(at) = state.last_sent_time {
            let elapsed = now.saturating_duration_since(at);
            if elapsed < self.cfg.min_send_interval {
                return Decision::Reject(RejectReason::TooSoon {
                    remaining: self.cfg.min_send_interval - elapsed,
                });
            }
        }
        if weight == 0 {
            match last_known() {
                Ok(Some(v)) if v == 0.0 => {
                    state.last_sent_weight = Some(0);
                    return Decision::Reject(RejectReason::ZeroAlreadyRecorded);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "last known weight lookup failed; recording zero");
                }
            }
        }
        Decision::Accept
    }
}

/// What happened to one stable weight offered for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Recorded(i32),
    Rejected { weight: i32, reason: RejectReason },
    SinkFailed { weight: i32, error: String },
}

/// Policy plus sink plus identity: the commit path for stable weights.
pub struct Dispatcher<S: WeightSink> {
    policy: DispatchPolicy,
    sink: S,
    identity: Identity,
}

impl<S: WeightSink> Dispatcher<S> {
    pub fn new(policy: DispatchPolicy, sink: S, identity: Identity) -> Self {
        Self {
            policy,
            sink,
            identity,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Run the policy on `weight` and record it if accepted.
    ///
    /// On a successful record the state advances and the window is cleared so
    /// a fresh run of samples is needed before the next dispatch. A failed
    /// record leaves both untouched; the next stable sample retries.
    pub fn offer(
        &self,
        weight: i32,
        state: &mut DispatchState,
        window: &mut StabilizationWindow,
        now: Instant,
    ) -> DispatchOutcome {
        let Identity {
            source_id,
            group_id,
        } = &self.identity;
        let decision = self
            .policy
            .decide(weight, state, now, || self.sink.latest(source_id, group_id));
        if let Decision::Reject(reason) = decision {
            tracing::trace!(weight, %reason, "stable weight not dispatched");
            return DispatchOutcome::Rejected { weight, reason };
        }
        match self.sink.record(weight, source_id, group_id) {
            Ok(()) => {
                state.mark_sent(weight, now);
                window.clear();
                tracing::info!(weight, source_id = %source_id, "weight recorded");
                DispatchOutcome::Recorded(weight)
            }
            Err(e) => {
                let err = map_sink_error(e.as_ref());
                tracing::error!(weight, error = %err, "failed to record weight");
                DispatchOutcome::SinkFailed {
                    weight,
                    error: err.to_string(),
                }
            }
        }
    }
}
