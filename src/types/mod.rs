//! Core types shared across the crate.
//!
//! - [`id`]: Identifier types (`InstanceId`, `TaskId`, `WaitKey`, `Time`)

pub mod id;

pub use id::{InstanceId, TaskId, Time, WaitKey};
