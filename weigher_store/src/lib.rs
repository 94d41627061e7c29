#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `WeightSink` implementations.
//!
//! - `JsonlStore`: local append-only file with pruning
//! - `RemoteApiSink`: central HTTP API

pub mod atomic;
pub mod error;
pub mod jsonl;
pub mod remote;

pub use error::{Result, StoreError};
pub use jsonl::{JsonlStore, StoredRecord};
pub use remote::RemoteApiSink;
