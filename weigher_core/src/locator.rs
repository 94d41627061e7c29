//! Finds the serial endpoint a scale is talking on.
//!
//! Each candidate is opened, given time to settle, and read once; an endpoint
//! whose output contains a frame start byte is taken to be the scale. The scan
//! is blocking and must not run while another reader holds an open port.

use weigher_traits::clock::Clock;
use weigher_traits::{PortEnumerator, ScalePort};

use crate::config::ProbeCfg;
use crate::error::ScaleError;
use crate::fault::map_port_error;
use crate::frame::{FRAME_LEN, FRAME_START};

pub struct PortLocator<E: PortEnumerator, C: Clock> {
    enumerator: E,
    clock: C,
    cfg: ProbeCfg,
}

impl<E: PortEnumerator, C: Clock> PortLocator<E, C> {
    pub fn new(enumerator: E, clock: C, cfg: ProbeCfg) -> Self {
        Self {
            enumerator,
            clock,
            cfg,
        }
    }

    /// Endpoints that will be probed, after the allow-list is applied.
    pub fn candidates(&self) -> Result<Vec<String>, ScaleError> {
        let names = self
            .enumerator
            .list()
            .map_err(|e| ScaleError::Transport(format!("listing serial ports: {e}")))?;
        if self.cfg.allow.is_empty() {
            return Ok(names);
        }
        Ok(names
            .into_iter()
            .filter(|n| self.cfg.allow.iter().any(|a| a == n))
            .collect())
    }

    /// Probe every candidate in order and return the first that looks like a scale.
    ///
    /// `Ok(None)` means nothing answered. Errors on individual endpoints are
    /// logged and skipped; only a failure to list endpoints is returned.
    pub fn locate(&self) -> Result<Option<Box<dyn ScalePort>>, ScaleError> {
        let names = self.candidates()?;
        tracing::debug!(ports = ?names, "probing serial ports");
        for name in names {
            match self.probe(&name) {
                Ok(Some(port)) => {
                    tracing::info!(port = %name, "scale found");
                    return Ok(Some(port));
                }
                Ok(None) => tracing::debug!(port = %name, "no frame start seen"),
                Err(e) => tracing::warn!(port = %name, error = %e, "probe failed"),
            }
        }
        Ok(None)
    }

    /// Open `name`, wait for the firmware to settle and look for a frame start.
    ///
    /// On a match the stale probe bytes are discarded and the open port is
    /// returned; otherwise the port is closed.
    pub fn probe(&self, name: &str) -> Result<Option<Box<dyn ScalePort>>, ScaleError> {
        let mut port = self
            .enumerator
            .open(name, &self.cfg.link)
            .map_err(|e| map_port_error(e.as_ref()))?;
        self.clock.sleep(self.cfg.settle);

        let waiting = port
            .bytes_to_read()
            .map_err(|e| map_port_error(e.as_ref()))?;
        let want = if waiting > 0 { waiting } else { FRAME_LEN };
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = port
                .read_chunk(&mut buf[filled..])
                .map_err(|e| map_port_error(e.as_ref()))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        tracing::trace!(port = %name, bytes = filled, "probe read");

        if buf[..filled].contains(&FRAME_START) {
            port.clear_input()
                .map_err(|e| map_port_error(e.as_ref()))?;
            Ok(Some(port))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ScriptedEnumerator, ScriptedPort, Step};
    use std::time::Duration;
    use weigher_traits::clock::test_clock::TestClock;

    fn locator(e: ScriptedEnumerator, clock: TestClock) -> PortLocator<ScriptedEnumerator, TestClock> {
        PortLocator::new(e, clock, ProbeCfg::default())
    }

    #[test]
    fn picks_first_port_that_shows_a_frame_start() {
        let clock = TestClock::new();
        let quiet = ScriptedPort::new("COM1", vec![Step::Idle]).with_clock(clock.clone());
        let modem = ScriptedPort::with_bytes("COM2", b"ATZ\r\nOK\r\n").with_clock(clock.clone());
        let scale = ScriptedPort::new("COM3", vec![Step::Stale(b"ww   1250kgww  ".to_vec())])
            .with_clock(clock.clone());
        let scale_stats = scale.stats();
        let e = ScriptedEnumerator::new().push(quiet).push(modem).push(scale);
        let opened = e.opened();

        let port = locator(e, clock.clone()).locate().unwrap().expect("scale");
        assert_eq!(port.name(), "COM3");
        assert_eq!(scale_stats.clears(), 1);
        assert!(!scale_stats.is_closed());
        assert_eq!(*opened.lock().unwrap(), vec!["COM1", "COM2", "COM3"]);
        // one settle per probe, plus the idle read timeout on COM1
        assert!(clock.offset() >= Duration::from_secs(3));
    }

    #[test]
    fn failing_open_is_skipped() {
        let clock = TestClock::new();
        let scale = ScriptedPort::with_bytes("COM4", b"wn    -40kg").with_clock(clock.clone());
        let e = ScriptedEnumerator::new().unopenable("COM1").push(scale);
        let port = locator(e, clock).locate().unwrap().expect("scale");
        assert_eq!(port.name(), "COM4");
    }

    #[test]
    fn read_error_is_skipped_and_port_closed() {
        let clock = TestClock::new();
        let broken = ScriptedPort::new("COM1", vec![Step::Fail("gone".into())])
            .with_clock(clock.clone());
        let broken_stats = broken.stats();
        let e = ScriptedEnumerator::new().push(broken);
        assert!(locator(e, clock).locate().unwrap().is_none());
        assert!(broken_stats.is_closed());
    }

    #[test]
    fn nothing_found_is_none() {
        let clock = TestClock::new();
        let e = ScriptedEnumerator::new()
            .push(ScriptedPort::with_bytes("COM1", b"hello").with_clock(clock.clone()));
        assert!(locator(e, clock).locate().unwrap().is_none());
    }

    #[test]
    fn allow_list_restricts_candidates() {
        let clock = TestClock::new();
        let e = ScriptedEnumerator::new()
            .push(ScriptedPort::with_bytes("COM1", b"ww   0001kg").with_clock(clock.clone()))
            .push(ScriptedPort::with_bytes("COM2", b"ww   0002kg").with_clock(clock.clone()));
        let cfg = ProbeCfg {
            allow: vec!["COM2".into()],
            ..ProbeCfg::default()
        };
        let port = PortLocator::new(e, clock, cfg).locate().unwrap().expect("scale");
        assert_eq!(port.name(), "COM2");
    }

    #[test]
    fn list_failure_is_an_error() {
        let e = ScriptedEnumerator::new().failing_list("no permission");
        let err = locator(e, TestClock::new()).locate().err().unwrap();
        assert!(err.is_transport());
    }
}
