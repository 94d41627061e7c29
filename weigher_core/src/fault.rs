//! Maps `Box<dyn Error>` from trait boundaries to typed `ScaleError`.
//!
//! The traits in `weigher_traits` use `Box<dyn Error + Send + Sync>`; this
//! module classifies those errors so the acquisition loop can tell a read
//! timeout (keep polling) from a transport fault (drop the session).

use crate::error::ScaleError;

/// Map a port error to a typed `ScaleError`.
///
/// Attempts to downcast known hardware error types first, then `std::io::Error`,
/// then falls back to string-based heuristics.
pub fn map_port_error(e: &(dyn std::error::Error + 'static)) -> ScaleError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<weigher_hardware::error::HwError>() {
            return match hw {
                weigher_hardware::error::HwError::Timeout => ScaleError::Timeout,
                other => ScaleError::Transport(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return match io.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ScaleError::Timeout,
            _ => ScaleError::Transport(io.to_string()),
        };
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timed out") {
        ScaleError::Timeout
    } else {
        ScaleError::Transport(s)
    }
}

/// Sink failures are never transport faults; keep the message for the log.
pub fn map_sink_error(e: &(dyn std::error::Error + 'static)) -> ScaleError {
    ScaleError::Sink(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_is_not_a_transport_fault() {
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "read");
        assert_eq!(map_port_error(&e), ScaleError::Timeout);
    }

    #[test]
    fn broken_pipe_is_a_transport_fault() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        assert!(map_port_error(&e).is_transport());
    }

    #[test]
    fn unknown_errors_fall_back_to_transport() {
        let e: Box<dyn std::error::Error + Send + Sync> = "device vanished".into();
        assert_eq!(
            map_port_error(e.as_ref()),
            ScaleError::Transport("device vanished".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_timeout_downcasts() {
        let e = weigher_hardware::error::HwError::Timeout;
        assert_eq!(map_port_error(&e), ScaleError::Timeout);
    }
}
