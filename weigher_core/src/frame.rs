//! Wire frames from the scale and the receive buffer that resynchronizes on them.
//!
//! A frame is 11 ASCII bytes: `w`, then `w` or `n`, a 7-character numeric
//! field, then `kg`. The numeric field may contain spaces and a `-` marker.
//! The sign comes only from the `-`; the `n` marker is accepted but does not
//! make a reading negative on its own.

use crate::error::FrameError;

/// Length of one frame on the wire.
pub const FRAME_LEN: usize = 11;
/// Byte that starts every frame.
pub const FRAME_START: u8 = b'w';
const SUFFIX: &[u8; 2] = b"kg";
const FIELD: std::ops::Range<usize> = 2..9;

/// Frame validity predicate: prefix, marker byte and unit suffix.
#[inline]
pub fn is_valid_frame(candidate: &[u8]) -> bool {
    candidate.len() == FRAME_LEN
        && candidate[0] == FRAME_START
        && matches!(candidate[1], b'w' | b'n')
        && &candidate[9..11] == SUFFIX
}

/// Decode the numeric field of a frame that already passed `is_valid_frame`.
///
/// Spaces are stripped; if a `-` appears anywhere it is removed and the
/// magnitude negated.
pub fn parse_weight(frame: &[u8]) -> Result<i32, FrameError> {
    if !frame.is_ascii() {
        return Err(FrameError::NotAscii);
    }
    let field = &frame[FIELD];
    let negative = field.contains(&b'-');
    let digits: String = field
        .iter()
        .filter(|b| **b != b' ' && **b != b'-')
        .map(|b| char::from(*b))
        .collect();
    if digits.is_empty() {
        return Err(FrameError::EmptyField);
    }
    let magnitude: i32 = digits
        .parse()
        .map_err(|_| FrameError::BadDigits(String::from_utf8_lossy(field).into_owned()))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Build a frame carrying `weight`, right-aligned in the numeric field.
///
/// Negative values put the `-` in front of the digits and use the `n` marker.
/// Returns `None` when the value does not fit in seven characters.
pub fn encode_frame(weight: i32) -> Option<[u8; FRAME_LEN]> {
    let field = format!("{weight:>7}");
    if field.len() != 7 {
        return None;
    }
    let mut out = [0u8; FRAME_LEN];
    out[0] = FRAME_START;
    out[1] = if weight < 0 { b'n' } else { b'w' };
    out[FIELD].copy_from_slice(field.as_bytes());
    out[9..11].copy_from_slice(SUFFIX);
    Some(out)
}

/// Result of scanning a buffer for the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// A valid frame ending at `consumed` decoded to `weight`.
    Sample { weight: i32, consumed: usize },
    /// A frame-shaped slice ending at `consumed` had a malformed numeric field.
    Malformed { error: FrameError, consumed: usize },
    /// No complete valid frame yet.
    Incomplete,
}

/// Find the first valid frame in `buf`.
///
/// Every position holding a `w` with a full frame behind it is tried; a
/// candidate that fails the validity predicate is skipped and the scan moves
/// on, so garbage containing stray `w` bytes cannot stall the stream.
pub fn scan(buf: &[u8]) -> Scan {
    if buf.len() < FRAME_LEN {
        return Scan::Incomplete;
    }
    for i in 0..=buf.len() - FRAME_LEN {
        if buf[i] != FRAME_START {
            continue;
        }
        let candidate = &buf[i..i + FRAME_LEN];
        if !is_valid_frame(candidate) {
            continue;
        }
        let consumed = i + FRAME_LEN;
        return match parse_weight(candidate) {
            Ok(weight) => Scan::Sample { weight, consumed },
            Err(error) => Scan::Malformed { error, consumed },
        };
    }
    Scan::Incomplete
}

/// Unconsumed serial input for one port session.
///
/// Consumed frames (and whatever preceded them) are removed from the front.
/// When no frame can be found and the buffer has outgrown
/// `max_unframed_bytes`, everything is dropped so garbage input cannot grow it
/// without bound.
#[derive(Debug, Clone)]
pub struct RawBuffer {
    bytes: Vec<u8>,
    max_unframed_bytes: usize,
}

impl RawBuffer {
    pub fn new(max_unframed_bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(max_unframed_bytes.max(FRAME_LEN) * 2),
            max_unframed_bytes,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Pull the next decoded sample out of the buffer, if a complete one is there.
    pub fn next_sample(&mut self) -> Option<i32> {
        loop {
            match scan(&self.bytes) {
                Scan::Sample { weight, consumed } => {
                    self.bytes.drain(..consumed);
                    tracing::trace!(weight, "frame decoded");
                    return Some(weight);
                }
                Scan::Malformed { error, consumed } => {
                    tracing::warn!(
                        error = %error,
                        frame = %String::from_utf8_lossy(&self.bytes[consumed - FRAME_LEN..consumed]),
                        "discarding malformed frame"
                    );
                    self.bytes.drain(..consumed);
                }
                Scan::Incomplete => {
                    if self.bytes.len() > self.max_unframed_bytes {
                        tracing::debug!(
                            len = self.bytes.len(),
                            "no valid frame in receive buffer, discarding"
                        );
                        self.bytes.clear();
                    }
                    return None;
                }
            }
        }
    }
}
