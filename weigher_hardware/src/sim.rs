//! A scale that exists only in memory, for demos and tests without hardware.
//!
//! The simulated device emits one frame per `period`, walking a profile of
//! `(weight, frames)` steps and starting over at the end. Time is real: a
//! port left unread accumulates frames the way a UART queue would.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use weigher_traits::{BoxError, LinkSettings, PortEnumerator, ScalePort};

/// Frames the simulated device keeps queued before dropping the oldest.
const QUEUE_FRAMES: usize = 256;
const FRAME_LEN: usize = 11;

/// What the simulated scale shows over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimProfile {
    /// `(weight, frames)`: hold `weight` for `frames` consecutive frames.
    pub steps: Vec<(i32, u32)>,
    pub period: Duration,
}

impl Default for SimProfile {
    /// Empty platform, a truck driving on, settling, then leaving.
    fn default() -> Self {
        Self {
            steps: vec![
                (0, 30),
                (420, 2),
                (980, 2),
                (1_247, 1),
                (1_250, 40),
                (1_251, 1),
                (1_250, 20),
                (610, 2),
                (0, 40),
            ],
            period: Duration::from_millis(100),
        }
    }
}

impl SimProfile {
    /// Hold one weight forever.
    pub fn constant(weight: i32) -> Self {
        Self {
            steps: vec![(weight, 1)],
            ..Self::default()
        }
    }

    fn weight_at(&self, frame_index: u64) -> i32 {
        let cycle: u64 = self.steps.iter().map(|(_, n)| u64::from((*n).max(1))).sum();
        if cycle == 0 {
            return 0;
        }
        let mut i = frame_index % cycle;
        for (w, n) in &self.steps {
            let n = u64::from((*n).max(1));
            if i < n {
                return *w;
            }
            i -= n;
        }
        0
    }
}

/// 11-byte scale frame for `weight`, right-aligned, with the `n` marker on negatives.
pub fn sim_frame(weight: i32) -> [u8; FRAME_LEN] {
    let mut out = *b"ww       kg";
    if weight < 0 {
        out[1] = b'n';
    }
    let digits = format!("{weight:>7}");
    let digits = digits.as_bytes();
    // out-of-range values keep their lowest seven characters
    let src = &digits[digits.len().saturating_sub(7)..];
    out[9 - src.len()..9].copy_from_slice(src);
    out
}

pub struct SimulatedScale {
    name: String,
    profile: SimProfile,
    started: Instant,
    emitted: u64,
    queue: VecDeque<u8>,
    read_timeout: Duration,
}

impl SimulatedScale {
    pub fn new(name: impl Into<String>, profile: SimProfile) -> Self {
        Self {
            name: name.into(),
            profile,
            started: Instant::now(),
            emitted: 0,
            queue: VecDeque::new(),
            read_timeout: Duration::from_secs(2),
        }
    }

    /// Append every frame that is due by now.
    fn refill(&mut self) {
        let period = self.profile.period.max(Duration::from_millis(1));
        let due = (self.started.elapsed().as_nanos() / period.as_nanos()) as u64 + 1;
        while self.emitted < due {
            let frame = sim_frame(self.profile.weight_at(self.emitted));
            self.queue.extend(frame);
            self.emitted += 1;
        }
        while self.queue.len() > QUEUE_FRAMES * FRAME_LEN {
            self.queue.drain(..FRAME_LEN);
        }
    }

    fn until_next_frame(&self) -> Duration {
        let period = self.profile.period.max(Duration::from_millis(1));
        let next = period.saturating_mul(self.emitted.min(u64::from(u32::MAX)) as u32);
        next.saturating_sub(self.started.elapsed())
    }
}

impl ScalePort for SimulatedScale {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> Result<usize, BoxError> {
        self.refill();
        Ok(self.queue.len())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        self.refill();
        if self.queue.is_empty() {
            std::thread::sleep(self.until_next_frame().min(self.read_timeout));
            self.refill();
        }
        let n = buf.len().min(self.queue.len());
        for (dst, src) in buf.iter_mut().zip(self.queue.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<(), BoxError> {
        self.refill();
        self.queue.clear();
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), BoxError> {
        self.read_timeout = timeout;
        Ok(())
    }
}

/// Enumerator exposing a single simulated scale.
#[derive(Debug, Clone)]
pub struct SimulatedEnumerator {
    name: String,
    profile: SimProfile,
}

impl SimulatedEnumerator {
    pub fn new(name: impl Into<String>, profile: SimProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }
}

impl Default for SimulatedEnumerator {
    fn default() -> Self {
        Self::new("SIM0", SimProfile::default())
    }
}

impl PortEnumerator for SimulatedEnumerator {
    fn list(&self) -> Result<Vec<String>, BoxError> {
        Ok(vec![self.name.clone()])
    }

    fn open(&self, name: &str, settings: &LinkSettings) -> Result<Box<dyn ScalePort>, BoxError> {
        if name != self.name {
            return Err(format!("no simulated port named {name}").into());
        }
        let mut port = SimulatedScale::new(name, self.profile.clone());
        port.set_read_timeout(settings.read_timeout)?;
        tracing::debug!(port = %name, "simulated scale opened");
        Ok(Box::new(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1250, b"ww   1250kg")]
    #[case(0, b"ww      0kg")]
    #[case(-40, b"wn    -40kg")]
    #[case(9_999_999, b"ww9999999kg")]
    fn frames_are_right_aligned(#[case] w: i32, #[case] expected: &[u8; 11]) {
        assert_eq!(&sim_frame(w), expected);
    }

    #[test]
    fn profile_cycles() {
        let p = SimProfile {
            steps: vec![(1, 2), (5, 1)],
            period: Duration::from_millis(100),
        };
        let seq: Vec<i32> = (0..6).map(|i| p.weight_at(i)).collect();
        assert_eq!(seq, vec![1, 1, 5, 1, 1, 5]);
    }

    #[test]
    fn first_frame_is_available_immediately() {
        let mut s = SimulatedScale::new("SIM0", SimProfile::constant(777));
        assert_eq!(s.bytes_to_read().unwrap(), 11);
        let mut buf = [0u8; 11];
        assert_eq!(s.read_chunk(&mut buf).unwrap(), 11);
        assert_eq!(&buf, b"ww    777kg");
    }

    #[test]
    fn read_waits_for_the_next_frame() {
        let profile = SimProfile {
            period: Duration::from_millis(5),
            ..SimProfile::constant(3)
        };
        let mut s = SimulatedScale::new("SIM0", profile);
        s.clear_input().unwrap();
        let mut buf = [0u8; 66];
        let n = s.read_chunk(&mut buf).unwrap();
        assert!(n >= 11);
        assert_eq!(n % 11, 0);
    }

    #[test]
    fn enumerator_opens_only_its_port() {
        let e = SimulatedEnumerator::default();
        assert_eq!(e.list().unwrap(), vec!["SIM0".to_string()]);
        assert!(e.open("SIM0", &LinkSettings::default()).is_ok());
        assert!(e.open("COM1", &LinkSettings::default()).is_err());
    }
}
