use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScaleError {
    #[error("scale not connected")]
    NotConnected,
    #[error("serial transport error: {0}")]
    Transport(String),
    #[error("serial read timed out")]
    Timeout,
    #[error("sink error: {0}")]
    Sink(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScaleError {
    /// Faults that end the current port session and trigger a rescan.
    pub fn is_transport(&self) -> bool {
        matches!(self, ScaleError::Transport(_))
    }
}

/// Why an 11-byte frame carried no usable number.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not ascii")]
    NotAscii,
    #[error("numeric field is empty")]
    EmptyField,
    #[error("numeric field {0:?} is not an integer")]
    BadDigits(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
