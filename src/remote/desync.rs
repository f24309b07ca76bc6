//! The desynchronization protocol: one logical remote call split into an
//! immediate acknowledgement plus a later asynchronous delivery.
//!
//! Serving side: a handler wrapped by [`wrap`] cannot be called as an
//! ordinary function. It expects the caller's instance identity prepended
//! to the arguments, spawns the real body in a task, and returns only a
//! fresh correlation key — produced by yielding, which also inserts the
//! one extra scheduler tick that guarantees the caller is parked on the
//! key before any delivery can occur. When the body finishes, success or
//! failure is pushed back to the caller's instance under that key through
//! the reserved [`DELIVER_FN`] function.
//!
//! Calling side: [`call`] performs the synchronous host call, receives the
//! key, and awaits it with no timeout — the callee is trusted to
//! eventually respond, or the caller task is leaked by design. A delivered
//! failure is re-raised here, and only here, as [`Error::Remote`].

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::sched::Drive;
use crate::types::{InstanceId, WaitKey};
use crate::value::Value;
use std::future::Future;
use std::rc::Rc;
use tracing::debug;

/// Reserved function name for result deliveries.
pub const DELIVER_FN: &str = "weft.deliver";

pub(crate) fn identity_value(id: InstanceId) -> Result<Value> {
    i64::try_from(id.raw())
        .map(Value::Int)
        .map_err(|_| Error::malformed("instance identity", format!("{id} does not fit the wire")))
}

pub(crate) fn identity_from(value: &Value) -> Result<InstanceId> {
    match value {
        Value::Int(raw) => u64::try_from(*raw)
            .map(InstanceId::new)
            .map_err(|_| Error::malformed("instance identity", format!("negative id {raw}"))),
        other => Err(Error::malformed(
            "instance identity",
            format!("expected an int, got {}", other.type_name()),
        )),
    }
}

fn key_from(value: Value) -> Result<WaitKey> {
    match value {
        Value::Str(s) => Ok(WaitKey::from(s)),
        other => Err(Error::malformed(
            "correlation key",
            format!("expected a string, got {}", other.type_name()),
        )),
    }
}

/// The reserved delivery handler: resolves a correlation key through the
/// local scheduler. Returns how many waiters fired; a second delivery
/// under a consumed key fires nothing and is a no-op.
pub(crate) fn deliver(inst: &Instance, mut args: Vec<Value>) -> Result<Value> {
    if args.is_empty() {
        return Err(Error::malformed("delivery", "missing correlation key"));
    }
    let key = key_from(args.remove(0))?;
    let fired = inst.scheduler().resume(&key, args);
    Ok(Value::Int(i64::try_from(fired).unwrap_or(i64::MAX)))
}

/// Wraps `body` into a two-phase handler suitable for the function
/// registry. See the module docs for the protocol.
pub(crate) fn wrap<F, Fut>(name: String, body: F) -> impl Fn(&Instance, Vec<Value>) -> Result<Value>
where
    F: Fn(Cx, Vec<Value>) -> Fut + 'static,
    Fut: Future<Output = Result<Value>> + 'static,
{
    let body = Rc::new(body);
    move |inst: &Instance, mut args: Vec<Value>| {
        if args.is_empty() {
            return Err(Error::malformed(
                "desynchronized call",
                "missing caller identity",
            ));
        }
        let caller = identity_from(&args.remove(0))?;
        let key = inst.mint_key();
        debug!(%caller, function = %name, %key, "desynchronized call accepted");

        let body = Rc::clone(&body);
        let task_key = key.clone();
        let (_, drive) = inst.spawn(Some(name.as_str()), move |cx| async move {
            // Phase 1: acknowledge with the key before doing anything.
            cx.yield_values(vec![Value::from(task_key.as_str())]).await;

            // Phase 2: the protected body run. An error is captured and
            // delivered, not raised here.
            let outcome = (*body)(cx.clone(), args).await;
            let mut reply = vec![Value::from(task_key.as_str())];
            match outcome {
                Ok(value) => {
                    reply.push(Value::Bool(true));
                    reply.push(value);
                }
                Err(error) => {
                    debug!(%error, %task_key, "desynchronized body failed; delivering failure");
                    reply.push(Value::Bool(false));
                    reply.push(Value::from(error.to_string()));
                }
            }
            cx.instance().host_call(caller, DELIVER_FN, reply)?;
            Ok(vec![])
        });

        match drive {
            Drive::Yielded(mut values) if !values.is_empty() => Ok(values.remove(0)),
            Drive::Faulted(error) => Err(error),
            _ => Err(Error::malformed(
                "desynchronized call",
                "serving task produced no acknowledgement",
            )),
        }
    }
}

/// The calling side of the protocol; see the module docs.
pub(crate) async fn call(
    cx: &Cx,
    target: InstanceId,
    function: &str,
    args: Vec<Value>,
) -> Result<Vec<Value>> {
    let mut wire = Vec::with_capacity(args.len() + 1);
    wire.push(identity_value(cx.instance_id())?);
    wire.extend(args);

    let ack = cx.instance().host_call(target, function, wire)?;
    let key = key_from(ack)?;
    debug!(%target, function, %key, "awaiting desynchronized result");

    let Some(mut delivered) = cx.wait(key, None).await else {
        return Err(Error::malformed("delivery", "unbounded wait timed out"));
    };
    if delivered.is_empty() {
        return Err(Error::malformed("delivery", "missing success flag"));
    }
    match delivered.remove(0) {
        Value::Bool(true) => Ok(delivered),
        Value::Bool(false) => Err(Error::Remote(
            delivered.into_iter().next().unwrap_or(Value::Null),
        )),
        other => Err(Error::malformed(
            "delivery",
            format!("success flag must be a bool, got {}", other.type_name()),
        )),
    }
}
