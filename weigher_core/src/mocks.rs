//! Test and helper mocks for weigher_core
//!
//! `ScriptedPort` replays a fixed sequence of serial events, `ScriptedEnumerator`
//! hands scripted ports out by name, and `MemorySink` keeps records in memory
//! with switches for failing writes and overriding the last-known lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weigher_traits::clock::{Clock, MonotonicClock};
use weigher_traits::{BoxError, LatestRecord, LinkSettings, PortEnumerator, ScalePort, WeightSink};

/// One scripted event on a serial line.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes that arrive and can be read.
    Data(Vec<u8>),
    /// Bytes already sitting in the input queue; `clear_input` discards them.
    Stale(Vec<u8>),
    /// A read that times out with nothing received.
    Idle,
    /// A transport failure on the next read.
    Fail(String),
    /// A bug in the driver: the next read panics.
    Panic(String),
}

/// Counters shared between a `ScriptedPort` and the test that built it.
#[derive(Debug, Default)]
pub struct PortStats {
    pub reads: AtomicUsize,
    pub clears: AtomicUsize,
    pub bytes_read: AtomicUsize,
    pub dropped: AtomicUsize,
}

impl PortStats {
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }
    /// True once the port has been dropped (closed).
    pub fn is_closed(&self) -> bool {
        self.dropped.load(Ordering::SeqCst) > 0
    }
}

/// A serial port that replays `Step`s, then idles.
///
/// Idle reads sleep the configured read timeout on the port's clock, so a
/// `TestClock` makes timeouts instantaneous and deterministic.
pub struct ScriptedPort {
    name: String,
    steps: VecDeque<Step>,
    read_timeout: Duration,
    clock: Box<dyn Clock + Send>,
    stats: Arc<PortStats>,
}

impl ScriptedPort {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into(),
            read_timeout: Duration::from_millis(10),
            clock: Box::new(MonotonicClock::new()),
            stats: Arc::new(PortStats::default()),
        }
    }

    /// Port that streams `bytes` as one arrival.
    pub fn with_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(name, vec![Step::Data(bytes.to_vec())])
    }

    pub fn with_clock<C: Clock + Send + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn stats(&self) -> Arc<PortStats> {
        Arc::clone(&self.stats)
    }

    fn idle(&self) {
        self.clock.sleep(self.read_timeout);
    }
}

impl Drop for ScriptedPort {
    fn drop(&mut self) {
        self.stats.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScalePort for ScriptedPort {
    fn name(&self) -> &str {
        &self.name
    }

    /// Queue query. A leading `Idle`, `Fail` or `Panic` step is consumed here,
    /// so a poller that only reads what is waiting still sees every event.
    fn bytes_to_read(&mut self) -> Result<usize, BoxError> {
        match self.steps.front() {
            Some(Step::Data(b) | Step::Stale(b)) => Ok(b.len()),
            None => Ok(0),
            Some(Step::Idle) => {
                self.steps.pop_front();
                Ok(0)
            }
            Some(Step::Fail(_) | Step::Panic(_)) => self.read_chunk(&mut []),
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Data(mut b)) | Some(Step::Stale(mut b)) => {
                let n = b.len().min(buf.len());
                buf[..n].copy_from_slice(&b[..n]);
                if n < b.len() {
                    let rest = b.split_off(n);
                    self.steps.push_front(Step::Data(rest));
                }
                self.stats.bytes_read.fetch_add(n, Ordering::SeqCst);
                Ok(n)
            }
            Some(Step::Fail(msg)) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                msg,
            ))),
            Some(Step::Panic(msg)) => panic!("{msg}"),
            Some(Step::Idle) | None => {
                self.idle();
                Ok(0)
            }
        }
    }

    fn clear_input(&mut self) -> Result<(), BoxError> {
        self.stats.clears.fetch_add(1, Ordering::SeqCst);
        while matches!(self.steps.front(), Some(Step::Stale(_))) {
            self.steps.pop_front();
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), BoxError> {
        self.read_timeout = timeout;
        Ok(())
    }
}

/// Enumerator over scripted ports. Each `open` of a name takes the next port
/// queued for it; opening a name with nothing queued fails.
#[derive(Default)]
pub struct ScriptedEnumerator {
    names: Vec<String>,
    ports: Mutex<HashMap<String, VecDeque<ScriptedPort>>>,
    opened: Arc<Mutex<Vec<String>>>,
    list_error: Option<String>,
}

impl ScriptedEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `port` to be handed out on the next open of its name.
    pub fn push(mut self, port: ScriptedPort) -> Self {
        let name = port.name().to_owned();
        if !self.names.contains(&name) {
            self.names.push(name.clone());
        }
        if let Ok(mut ports) = self.ports.lock() {
            ports.entry(name).or_default().push_back(port);
        }
        self
    }

    /// List a name that cannot be opened.
    pub fn unopenable(mut self, name: &str) -> Self {
        self.names.push(name.to_owned());
        self
    }

    pub fn failing_list(mut self, msg: &str) -> Self {
        self.list_error = Some(msg.to_owned());
        self
    }

    /// Names opened so far, in order.
    pub fn opened(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.opened)
    }
}

impl PortEnumerator for ScriptedEnumerator {
    fn list(&self) -> Result<Vec<String>, BoxError> {
        match &self.list_error {
            Some(msg) => Err(msg.clone().into()),
            None => Ok(self.names.clone()),
        }
    }

    fn open(&self, name: &str, settings: &LinkSettings) -> Result<Box<dyn ScalePort>, BoxError> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(name.to_owned());
        }
        let next = self
            .ports
            .lock()
            .map_err(|_| "scripted enumerator poisoned")?
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        match next {
            Some(mut port) => {
                port.set_read_timeout(settings.read_timeout)?;
                Ok(Box::new(port))
            }
            None => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{name}: access denied"),
            ))),
        }
    }
}

/// One row held by `MemorySink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRecord {
    pub weight: i32,
    pub source_id: String,
    pub group_id: String,
}

#[derive(Debug, Default)]
struct SinkState {
    records: Vec<MemRecord>,
    fail_records: bool,
    fail_latest: bool,
    latest_override: Option<Option<f64>>,
    latest_queries: Vec<(String, String)>,
    prunes: Vec<usize>,
}

impl SinkState {
    // empty filters match anything
    fn newest(&self, source_id: &str, group_id: &str) -> Option<(usize, &MemRecord)> {
        self.records.iter().enumerate().rev().find(|(_, r)| {
            (source_id.is_empty() || r.source_id == source_id)
                && (group_id.is_empty() || r.group_id == group_id)
        })
    }
}

/// In-memory `WeightSink`. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut SinkState) -> R) -> R {
        let mut g = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut g)
    }

    pub fn fail_records(&self, on: bool) {
        self.with(|s| s.fail_records = on);
    }

    pub fn fail_latest(&self, on: bool) {
        self.with(|s| s.fail_latest = on);
    }

    /// Force what `latest` answers regardless of stored records.
    pub fn set_latest(&self, v: Option<f64>) {
        self.with(|s| s.latest_override = Some(v));
    }

    pub fn records(&self) -> Vec<MemRecord> {
        self.with(|s| s.records.clone())
    }

    pub fn weights(&self) -> Vec<i32> {
        self.with(|s| s.records.iter().map(|r| r.weight).collect())
    }

    pub fn latest_queries(&self) -> Vec<(String, String)> {
        self.with(|s| s.latest_queries.clone())
    }

    /// `keep` argument of every prune so far.
    pub fn prunes(&self) -> Vec<usize> {
        self.with(|s| s.prunes.clone())
    }
}

impl WeightSink for MemorySink {
    fn record(&self, weight: i32, source_id: &str, group_id: &str) -> Result<(), BoxError> {
        self.with(|s| {
            if s.fail_records {
                return Err("sink unavailable".into());
            }
            s.records.push(MemRecord {
                weight,
                source_id: source_id.to_owned(),
                group_id: group_id.to_owned(),
            });
            Ok(())
        })
    }

    fn latest(&self, source_id: &str, group_id: &str) -> Result<Option<f64>, BoxError> {
        self.with(|s| {
            s.latest_queries
                .push((source_id.to_owned(), group_id.to_owned()));
            if s.fail_latest {
                return Err("lookup unavailable".into());
            }
            if let Some(v) = s.latest_override {
                return Ok(v);
            }
            Ok(s.newest(source_id, group_id).map(|(_, r)| f64::from(r.weight)))
        })
    }

    fn latest_record(
        &self,
        source_id: &str,
        group_id: &str,
    ) -> Result<Option<LatestRecord>, BoxError> {
        self.with(|s| {
            if s.fail_latest {
                return Err("lookup unavailable".into());
            }
            Ok(s.newest(source_id, group_id).map(|(i, r)| LatestRecord {
                id: Some(i as u64 + 1),
                weight: f64::from(r.weight),
                source_id: r.source_id.clone(),
                group_id: r.group_id.clone(),
                recorded_at: None,
            }))
        })
    }

    fn prune(&self, keep: usize) -> Result<usize, BoxError> {
        self.with(|s| {
            s.prunes.push(keep);
            let excess = s.records.len().saturating_sub(keep);
            s.records.drain(..excess);
            Ok(excess)
        })
    }
}
