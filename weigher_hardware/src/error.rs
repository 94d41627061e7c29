use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial error: {0}")]
    Serial(String),
    #[error("serial read timed out")]
    Timeout,
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for HwError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => HwError::Disconnected(e.to_string()),
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => HwError::Timeout,
            serialport::ErrorKind::Io(kind) => HwError::Io(std::io::Error::new(kind, e.to_string())),
            _ => HwError::Serial(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;

#[cfg(all(test, feature = "serial"))]
mod tests {
    use super::*;

    #[test]
    fn serialport_kinds_map_to_hw_errors() {
        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "COM3 vanished");
        assert!(matches!(HwError::from(e), HwError::Disconnected(_)));
        let e = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut),
            "read",
        );
        assert!(matches!(HwError::from(e), HwError::Timeout));
        let e = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(HwError::from(e), HwError::Serial(_)));
    }
}
