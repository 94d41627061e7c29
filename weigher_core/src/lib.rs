#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::must_use_candidate
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Scale acquisition core (hardware-agnostic).
//!
//! All serial access goes through `weigher_traits::PortEnumerator` and
//! `ScalePort`; accepted readings leave through `WeightSink`.
//!
//! ## Pipeline
//!
//! - **Frames** (`frame`): 11-byte `w?.......kg` frames, resynchronizing buffer
//! - **Locator** (`locator`): probe serial endpoints for one that emits frames
//! - **Window** (`window`): last N samples, stable when their spread is small
//! - **Policy** (`policy`): negative / duplicate / interval / zero rules, then record
//! - **Acquisition** (`acquisition`): reconnecting read loop with cooperative shutdown
//! - **On demand** (`on_demand`): bounded one-shot capture on the shared port
//! - **Service** (`service`): threads for acquisition and storage maintenance

pub mod acquisition;
pub mod config;
pub mod conversions;
pub mod error;
pub mod fault;
pub mod frame;
pub mod locator;
pub mod mocks;
pub mod on_demand;
pub mod policy;
pub mod service;
pub mod shutdown;
pub mod slot;
pub mod window;

pub use acquisition::{AcquisitionLoop, Session};
pub use config::{
    AcquisitionCfg, Identity, LoopCfg, MaintenanceCfg, OnDemandCfg, PolicyCfg, ProbeCfg,
    StabilityCfg,
};
pub use error::{FrameError, Report, Result, ScaleError};
pub use frame::{RawBuffer, Scan, encode_frame, is_valid_frame, parse_weight, scan};
pub use locator::PortLocator;
pub use on_demand::{Capture, CaptureCfg, OnDemandReader, capture_stable};
pub use policy::{Decision, DispatchOutcome, DispatchPolicy, DispatchState, Dispatcher, RejectReason};
pub use service::{Service, ServiceHandle, SharedSink, run_maintenance};
pub use shutdown::Shutdown;
pub use slot::PortSlot;
pub use window::StabilizationWindow;
