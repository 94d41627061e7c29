//! Seams between the acquisition core and the outside world.
//!
//! The core never touches a serial driver or a database directly: it talks to
//! a `ScalePort` handed out by a `PortEnumerator`, and commits readings to a
//! `WeightSink`. Errors cross these boundaries as boxed trait objects; the core
//! maps them to its own typed errors.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::sync::Arc;
use std::time::Duration;

/// Error type used at every trait boundary in this crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Line settings for opening a scale endpoint.
///
/// Framing is always 8 data bits, no parity, 1 stop bit; only the rate and the
/// read timeout vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_secs(2),
        }
    }
}

/// An open serial connection to a scale.
pub trait ScalePort: Send {
    /// Endpoint name (e.g. `COM3`, `/dev/ttyUSB0`).
    fn name(&self) -> &str;

    /// Bytes currently waiting in the driver's input queue.
    fn bytes_to_read(&mut self) -> Result<usize, BoxError>;

    /// Read whatever arrives within the current read timeout.
    /// `Ok(0)` means the timeout elapsed with nothing received.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BoxError>;

    /// Discard stale bytes sitting in the input queue.
    fn clear_input(&mut self) -> Result<(), BoxError>;

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), BoxError>;
}

impl<P: ScalePort + ?Sized> ScalePort for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn bytes_to_read(&mut self) -> Result<usize, BoxError> {
        (**self).bytes_to_read()
    }
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        (**self).read_chunk(buf)
    }
    fn clear_input(&mut self) -> Result<(), BoxError> {
        (**self).clear_input()
    }
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), BoxError> {
        (**self).set_read_timeout(timeout)
    }
}

/// Lists serial endpoints and opens them.
pub trait PortEnumerator: Send {
    fn list(&self) -> Result<Vec<String>, BoxError>;
    fn open(&self, name: &str, settings: &LinkSettings) -> Result<Box<dyn ScalePort>, BoxError>;
}

impl<E: PortEnumerator + ?Sized> PortEnumerator for Box<E> {
    fn list(&self) -> Result<Vec<String>, BoxError> {
        (**self).list()
    }
    fn open(&self, name: &str, settings: &LinkSettings) -> Result<Box<dyn ScalePort>, BoxError> {
        (**self).open(name, settings)
    }
}

/// The newest stored row as a sink reports it.
///
/// `id` and `recorded_at` are `None` when the backend does not keep them.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRecord {
    pub id: Option<u64>,
    pub weight: f64,
    pub source_id: String,
    pub group_id: String,
    /// RFC 3339 timestamp
    pub recorded_at: Option<String>,
}

/// Where accepted readings go: a local store or a remote API.
///
/// `latest` doubles as the "last known value" oracle consulted when the scale
/// settles on zero. `Ok(None)` means nothing has been recorded yet.
pub trait WeightSink: Send + Sync {
    fn record(&self, weight: i32, source_id: &str, group_id: &str) -> Result<(), BoxError>;

    fn latest(&self, source_id: &str, group_id: &str) -> Result<Option<f64>, BoxError>;

    /// Newest full row. An empty filter matches any value.
    fn latest_record(
        &self,
        source_id: &str,
        group_id: &str,
    ) -> Result<Option<LatestRecord>, BoxError> {
        Ok(self.latest(source_id, group_id)?.map(|weight| LatestRecord {
            id: None,
            weight,
            source_id: source_id.to_owned(),
            group_id: group_id.to_owned(),
            recorded_at: None,
        }))
    }

    /// Drop all but the newest `keep` records; returns how many were removed.
    /// Sinks without local retention have nothing to prune.
    fn prune(&self, _keep: usize) -> Result<usize, BoxError> {
        Ok(0)
    }
}

impl<S: WeightSink + ?Sized> WeightSink for Arc<S> {
    fn record(&self, weight: i32, source_id: &str, group_id: &str) -> Result<(), BoxError> {
        (**self).record(weight, source_id, group_id)
    }
    fn latest(&self, source_id: &str, group_id: &str) -> Result<Option<f64>, BoxError> {
        (**self).latest(source_id, group_id)
    }
    fn latest_record(
        &self,
        source_id: &str,
        group_id: &str,
    ) -> Result<Option<LatestRecord>, BoxError> {
        (**self).latest_record(source_id, group_id)
    }
    fn prune(&self, keep: usize) -> Result<usize, BoxError> {
        (**self).prune(keep)
    }
}
