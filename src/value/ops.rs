//! Application of the closed operation set to resolved values.
//!
//! These functions only ever see concrete values; resolving proxy handles
//! to concrete values happens in the proxy layer before the operation is
//! applied. Integer pairs stay integral where the operation allows it and
//! promote to float otherwise; mixed numeric pairs compute in float.

use super::Value;
use crate::error::{Error, Result};

/// A binary operation forwarded through the proxy layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division (always computes in float).
    Div,
    /// Remainder.
    Rem,
    /// Exponentiation (always computes in float).
    Pow,
    /// String concatenation of scalar operands.
    Concat,
    /// Structural equality, with numeric cross-type comparison.
    Eq,
    /// Strict ordering on numbers or strings.
    Lt,
    /// Non-strict ordering on numbers or strings.
    Le,
}

impl BinOp {
    /// Returns the operation's wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Pow => "pow",
            Self::Concat => "concat",
            Self::Eq => "eq",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }
}

/// A unary operation forwarded through the proxy layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Length of a string, list, or map.
    Len,
}

impl UnOp {
    /// Returns the operation's wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Len => "len",
        }
    }
}

fn mismatch(op: impl Into<String>, lhs: &Value, rhs: &Value) -> Error {
    Error::unsupported(op, format!("{} and {}", lhs.type_name(), rhs.type_name()))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(v: &Value) -> Option<f64> {
    v.as_float()
}

#[allow(clippy::cast_precision_loss)]
fn numeric(op: BinOp, lhs: &Value, rhs: &Value, int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            // Stay integral when possible; promote on overflow.
            int(*a, *b).map_or_else(|| Ok(Value::Float(float(*a as f64, *b as f64))), |n| Ok(Value::Int(n)))
        }
        _ => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => Ok(Value::Float(float(a, b))),
            _ => Err(mismatch(op.name(), lhs, rhs)),
        },
    }
}

fn numeric_eq(lhs: &Value, rhs: &Value) -> bool {
    match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn concat_part(op: BinOp, v: &Value, other: &Value) -> Result<String> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(v.to_string()),
        _ => Err(mismatch(op.name(), v, other)),
    }
}

/// Applies a binary operation to two resolved values.
pub fn apply_bin(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match op {
        BinOp::Add => numeric(op, lhs, rhs, i64::checked_add, |a, b| a + b),
        BinOp::Sub => numeric(op, lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinOp::Mul => numeric(op, lhs, rhs, i64::checked_mul, |a, b| a * b),
        BinOp::Div => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => Ok(Value::Float(a / b)),
            _ => Err(mismatch(op.name(), lhs, rhs)),
        },
        BinOp::Rem => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(Error::unsupported(op.name(), "division by zero")),
            _ => numeric(op, lhs, rhs, i64::checked_rem, |a, b| a % b),
        },
        BinOp::Pow => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => Ok(Value::Float(a.powf(b))),
            _ => Err(mismatch(op.name(), lhs, rhs)),
        },
        BinOp::Concat => {
            let mut out = concat_part(op, lhs, rhs)?;
            out.push_str(&concat_part(op, rhs, lhs)?);
            Ok(Value::Str(out))
        }
        BinOp::Eq => Ok(Value::Bool(numeric_eq(lhs, rhs))),
        BinOp::Lt | BinOp::Le => {
            let ordering_holds = match (lhs, rhs) {
                (Value::Str(a), Value::Str(b)) => {
                    if op == BinOp::Lt {
                        a < b
                    } else {
                        a <= b
                    }
                }
                _ => match (as_f64(lhs), as_f64(rhs)) {
                    (Some(a), Some(b)) => {
                        if op == BinOp::Lt {
                            a < b
                        } else {
                            a <= b
                        }
                    }
                    _ => return Err(mismatch(op.name(), lhs, rhs)),
                },
            };
            Ok(Value::Bool(ordering_holds))
        }
    }
}

/// Applies a unary operation to a resolved value.
pub fn apply_un(op: UnOp, v: &Value) -> Result<Value> {
    match op {
        UnOp::Neg => match v {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Error::unsupported(op.name(), "integer overflow")),
            Value::Float(x) => Ok(Value::Float(-x)),
            _ => Err(Error::unsupported(op.name(), v.type_name())),
        },
        UnOp::Len => {
            let len = match v {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                _ => return Err(Error::unsupported(op.name(), v.type_name())),
            };
            i64::try_from(len)
                .map(Value::Int)
                .map_err(|_| Error::unsupported(op.name(), "length overflow"))
        }
    }
}
