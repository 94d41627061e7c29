//! Serial port backends for the weigher.
//!
//! `SerialEnumerator` talks to real ports through `serialport` (feature
//! `serial`, on by default). `SimulatedEnumerator` produces a scripted scale
//! in memory for demos and tests.
pub mod error;
#[cfg(feature = "serial")]
pub mod serial;
pub mod sim;

#[cfg(feature = "serial")]
pub use serial::{SerialEnumerator, SerialScalePort};
pub use sim::{SimProfile, SimulatedEnumerator, SimulatedScale, sim_frame};
