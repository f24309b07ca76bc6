//! Cross-instance calls: the remote invoker wrapper, the function
//! registry, and the two-phase desynchronization protocol.
//!
//! - `registry`: string-keyed function dispatch for the host primitive
//! - `desync`: immediate-acknowledgement / later-delivery calls built on
//!   the scheduler's wait machinery

pub(crate) mod desync;
pub(crate) mod registry;

pub use desync::DELIVER_FN;
