//! Error types and error handling strategy.
//!
//! Error handling follows these principles:
//!
//! - A fault inside a task is fatal *to that task only*: it is logged and
//!   the task is dropped. It never propagates to the scheduler or to
//!   sibling tasks, and there is no restart policy.
//! - Every cross-instance result is a tagged success/failure pair on the
//!   wire. Only the calling side of the desynchronization layer converts a
//!   failure tag back into a raised error ([`Error::Remote`]), keeping the
//!   failure boundary explicit at exactly one point.
//! - A wait that times out is *not* an error; it is the `None` arm of
//!   [`crate::sched::Wait`]. Callers must check the flag.

use crate::types::{InstanceId, TaskId};
use crate::value::Value;

/// The crate-wide error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A task's body panicked or returned an error while being driven.
    /// Fatal to that task; the scheduler drops it.
    #[error("{task} failed: {message}")]
    TaskFault {
        /// The task that faulted.
        task: TaskId,
        /// Rendering of the panic payload or returned error.
        message: String,
    },

    /// A function name was dispatched that no registration covers.
    #[error("no function `{name}` registered on {instance}")]
    UnknownFunction {
        /// The instance whose registry was consulted.
        instance: InstanceId,
        /// The requested function name.
        name: String,
    },

    /// An operation was applied to operands that do not support it.
    #[error("unsupported operation `{op}` on {operands}")]
    Unsupported {
        /// The operation name.
        op: String,
        /// Rendering of the offending operand types.
        operands: String,
    },

    /// A failure delivered by a remote desynchronized body, re-raised in
    /// the caller's context.
    #[error("remote call failed: {0}")]
    Remote(Value),

    /// The owning instance of a reference can no longer be found by the
    /// host. Fatal to the operation; never retried.
    #[error("no route to {0}")]
    Unreachable(InstanceId),

    /// The instance has no host attached, so no cross-instance call can be
    /// made.
    #[error("{0} has no host attached")]
    Detached(InstanceId),

    /// A wire payload did not have the expected shape.
    #[error("malformed {context}: {detail}")]
    Malformed {
        /// What was being decoded.
        context: &'static str,
        /// What was wrong with it.
        detail: String,
    },
}

impl Error {
    pub(crate) fn malformed(context: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            context,
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(op: impl Into<String>, operands: impl Into<String>) -> Self {
        Self::Unsupported {
            op: op.into(),
            operands: operands.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
