//! Owner-side application of forwarded proxy operations.
//!
//! Runs inside a desynchronized task on the instance that owns the handle.
//! Handle operands are materialized first: the owner's own handles resolve
//! locally with zero round trips, third-party handles cost one nested
//! round trip to *their* owner.

use super::{Op, APPLY_FN};
use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::value::ops;
use crate::value::{ProxyHandle, Value};

/// The desynchronized body registered under [`APPLY_FN`] on every
/// instance.
pub(crate) async fn handler(cx: Cx, mut args: Vec<Value>) -> Result<Value> {
    if args.len() < 2 {
        return Err(Error::malformed(
            "proxy operation",
            "missing operation or handle",
        ));
    }
    let op = Op::from_wire(&args.remove(0))?;
    let handle = match args.remove(0) {
        Value::Handle(handle) => handle,
        other => {
            return Err(Error::malformed(
                "proxy operation",
                format!("expected a handle, got {}", other.type_name()),
            ))
        }
    };
    apply_op(&cx, op, handle, args).await
}

/// Resolves a value to something concrete: own handles collapse locally,
/// foreign handles cost one remote load.
async fn materialize(cx: &Cx, value: Value) -> Result<Value> {
    match value {
        Value::Handle(handle) if handle.owner == cx.instance_id() => {
            Ok(cx.instance().resolve_handle(&handle))
        }
        Value::Handle(handle) => {
            let owner = handle.owner;
            let args = vec![Op::Load.wire_value(), Value::Handle(handle)];
            let mut results = cx.desync_call(owner, APPLY_FN, args).await?;
            Ok(if results.is_empty() {
                Value::Null
            } else {
                results.remove(0)
            })
        }
        other => Ok(other),
    }
}

fn take_operand(operands: &mut Vec<Value>, op: Op) -> Result<Value> {
    if operands.is_empty() {
        Err(Error::malformed(
            "proxy operation",
            format!("`{}` needs an operand", op.name()),
        ))
    } else {
        Ok(operands.remove(0))
    }
}

/// Applies `op` to a handle the current instance owns.
pub(crate) async fn apply_op(
    cx: &Cx,
    op: Op,
    handle: ProxyHandle,
    mut operands: Vec<Value>,
) -> Result<Value> {
    let inst = cx.instance().clone();
    if handle.owner != inst.id() {
        return Err(Error::malformed(
            "proxy operation",
            format!("handle {handle} routed to {}", inst.id()),
        ));
    }

    match op {
        Op::Load => Ok(inst.resolve_handle(&handle)),
        Op::Store => {
            let value = materialize(cx, take_operand(&mut operands, op)?).await?;
            inst.set_global(&handle.key, value);
            Ok(Value::Null)
        }
        Op::Get => {
            let field = materialize(cx, take_operand(&mut operands, op)?).await?;
            let current = inst.resolve_handle(&handle);
            Ok(current.index(&field).cloned().unwrap_or(Value::Null))
        }
        Op::Set => {
            let field = materialize(cx, take_operand(&mut operands, op)?).await?;
            let value = materialize(cx, take_operand(&mut operands, op)?).await?;
            inst.set_field(&handle.key, &field, value)?;
            Ok(Value::Null)
        }
        Op::Call => match inst.resolve_handle(&handle) {
            Value::Func(func) if func.owner == inst.id() => {
                // Two-phase functions expect a caller identity and reply
                // through a correlation key; nesting them under a proxy
                // call is not supported.
                if inst.is_desync_fn(&func.name) {
                    return Err(Error::unsupported(op.name(), "desynchronized function"));
                }
                let mut args = Vec::with_capacity(operands.len());
                for operand in operands {
                    args.push(materialize(cx, operand).await?);
                }
                inst.invoke(&func.name, args)
            }
            other => Err(Error::unsupported(op.name(), other.type_name())),
        },
        Op::Repr => {
            let value = materialize(cx, inst.resolve_handle(&handle)).await?;
            Ok(Value::from(value.to_string()))
        }
        Op::Neg | Op::Len => {
            let value = materialize(cx, inst.resolve_handle(&handle)).await?;
            let un = op
                .as_un()
                .ok_or_else(|| Error::malformed("proxy operation", "not a unary op"))?;
            ops::apply_un(un, &value)
        }
        Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Rem
        | Op::Pow
        | Op::Concat
        | Op::Eq
        | Op::Lt
        | Op::Le => {
            let lhs = materialize(cx, inst.resolve_handle(&handle)).await?;
            let rhs = materialize(cx, take_operand(&mut operands, op)?).await?;
            let bin = op
                .as_bin()
                .ok_or_else(|| Error::malformed("proxy operation", "not a binary op"))?;
            ops::apply_bin(bin, &lhs, &rhs)
        }
    }
}
