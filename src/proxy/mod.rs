//! The proxy/mock layer: operate on another instance's variables as if
//! they were local.
//!
//! A [`ProxyHandle`] names a variable on its owning instance. Binding a
//! handle to a task context yields a [`RemoteRef`], whose named operations
//! each forward one desynchronized round trip to the owner; the owner
//! resolves the handle against its own globals, applies the operation, and
//! returns the real result by value. Operations on a handle whose owner
//! *is* the current instance never leave it — the handle collapses to the
//! local value instead of round-tripping to itself.
//!
//! The operation set is the closed [`Op`] enum; there is no reflection on
//! the wire.

pub(crate) mod apply;

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::types::InstanceId;
use crate::value::ops::{BinOp, UnOp};
use crate::value::{ProxyHandle, Value};

/// Reserved function name for proxy operation forwarding.
pub const APPLY_FN: &str = "weft.apply";

/// Creates a handle for variable `key` owned by `owner`.
#[must_use]
pub fn proxy(owner: InstanceId, key: impl Into<String>) -> ProxyHandle {
    ProxyHandle::new(owner, key)
}

/// The closed set of operations a proxy forwards to the owning instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Read the whole variable.
    Load,
    /// Replace the whole variable.
    Store,
    /// Index-read a field or element.
    Get,
    /// Index-write a field or element.
    Set,
    /// Call the variable as a function.
    Call,
    /// Render the variable to a string.
    Repr,
    /// Arithmetic negation.
    Neg,
    /// Length of a string, list, or map.
    Len,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Exponentiation.
    Pow,
    /// Concatenation.
    Concat,
    /// Equality.
    Eq,
    /// Strict ordering.
    Lt,
    /// Non-strict ordering.
    Le,
}

impl Op {
    /// Returns the operation's wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Store => "store",
            Self::Get => "get",
            Self::Set => "set",
            Self::Call => "call",
            Self::Repr => "repr",
            Self::Neg => "neg",
            Self::Len => "len",
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

    /// Parses a wire name back into an operation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [
            Self::Load,
            Self::Store,
            Self::Get,
            Self::Set,
            Self::Call,
            Self::Repr,
            Self::Neg,
            Self::Len,
            Self::Add,
            Self::Sub,
            Self::Mul,
            Self::Div,
            Self::Rem,
            Self::Pow,
            Self::Concat,
            Self::Eq,
            Self::Lt,
            Self::Le,
        ]
        .into_iter()
        .find(|op| op.name() == name)
    }

    pub(crate) fn wire_value(self) -> Value {
        Value::from(self.name())
    }

    pub(crate) fn from_wire(value: &Value) -> Result<Self> {
        value
            .as_str()
            .and_then(Self::parse)
            .ok_or_else(|| Error::malformed("proxy operation", format!("unknown op {value}")))
    }

    pub(crate) const fn as_bin(self) -> Option<BinOp> {
        match self {
            Self::Add => Some(BinOp::Add),
            Self::Sub => Some(BinOp::Sub),
            Self::Mul => Some(BinOp::Mul),
            Self::Div => Some(BinOp::Div),
            Self::Rem => Some(BinOp::Rem),
            Self::Pow => Some(BinOp::Pow),
            Self::Concat => Some(BinOp::Concat),
            Self::Eq => Some(BinOp::Eq),
            Self::Lt => Some(BinOp::Lt),
            Self::Le => Some(BinOp::Le),
            _ => None,
        }
    }

    pub(crate) const fn as_un(self) -> Option<UnOp> {
        match self {
            Self::Neg => Some(UnOp::Neg),
            Self::Len => Some(UnOp::Len),
            _ => None,
        }
    }
}

/// A proxy handle bound to a task context, ready to have operations
/// applied.
///
/// Every method on a foreign handle costs exactly one desynchronized round
/// trip; on a handle the current instance owns, everything is computed
/// locally.
#[derive(Clone)]
pub struct RemoteRef {
    cx: Cx,
    handle: ProxyHandle,
}

#[allow(clippy::should_implement_trait)]
impl RemoteRef {
    pub(crate) const fn new(cx: Cx, handle: ProxyHandle) -> Self {
        Self { cx, handle }
    }

    /// Returns the underlying handle.
    #[must_use]
    pub const fn handle(&self) -> &ProxyHandle {
        &self.handle
    }

    async fn apply(&self, op: Op, operands: Vec<Value>) -> Result<Value> {
        if self.handle.owner == self.cx.instance_id() {
            // Home instance: no round trip.
            return apply::apply_op(&self.cx, op, self.handle.clone(), operands).await;
        }
        let mut args = vec![op.wire_value(), Value::Handle(self.handle.clone())];
        args.extend(operands);
        let mut results = self
            .cx
            .desync_call(self.handle.owner, APPLY_FN, args)
            .await?;
        Ok(if results.is_empty() {
            Value::Null
        } else {
            results.remove(0)
        })
    }

    /// Reads the whole variable.
    pub async fn load(&self) -> Result<Value> {
        self.apply(Op::Load, vec![]).await
    }

    /// Replaces the whole variable.
    pub async fn store(&self, value: Value) -> Result<()> {
        self.apply(Op::Store, vec![value]).await.map(|_| ())
    }

    /// Index-reads a field (string key) or element (integer index).
    pub async fn get(&self, field: impl Into<Value>) -> Result<Value> {
        self.apply(Op::Get, vec![field.into()]).await
    }

    /// Index-writes a field or element in place.
    pub async fn set(&self, field: impl Into<Value>, value: Value) -> Result<()> {
        self.apply(Op::Set, vec![field.into(), value]).await.map(|_| ())
    }

    /// Calls the variable as a function with `args`.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.apply(Op::Call, args).await
    }

    /// Renders the variable to a string on its owner.
    pub async fn repr(&self) -> Result<String> {
        match self.apply(Op::Repr, vec![]).await? {
            Value::Str(s) => Ok(s),
            other => Err(Error::malformed(
                "proxy operation",
                format!("repr returned {}", other.type_name()),
            )),
        }
    }

    /// Negates the variable.
    pub async fn neg(&self) -> Result<Value> {
        self.apply(Op::Neg, vec![]).await
    }

    /// Returns the variable's length.
    pub async fn len(&self) -> Result<Value> {
        self.apply(Op::Len, vec![]).await
    }

    /// Adds `rhs` to the variable.
    pub async fn add(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Add, vec![rhs]).await
    }

    /// Subtracts `rhs` from the variable.
    pub async fn sub(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Sub, vec![rhs]).await
    }

    /// Multiplies the variable by `rhs`.
    pub async fn mul(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Mul, vec![rhs]).await
    }

    /// Divides the variable by `rhs`.
    pub async fn div(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Div, vec![rhs]).await
    }

    /// Remainder of the variable by `rhs`.
    pub async fn rem(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Rem, vec![rhs]).await
    }

    /// Raises the variable to `rhs`.
    pub async fn pow(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Pow, vec![rhs]).await
    }

    /// Concatenates the variable with `rhs`.
    pub async fn concat(&self, rhs: Value) -> Result<Value> {
        self.apply(Op::Concat, vec![rhs]).await
    }

    /// Compares the variable with `rhs` for equality.
    pub async fn eq(&self, rhs: Value) -> Result<bool> {
        Ok(self.apply(Op::Eq, vec![rhs]).await?.is_truthy())
    }

    /// Tests whether the variable is strictly less than `rhs`.
    pub async fn lt(&self, rhs: Value) -> Result<bool> {
        Ok(self.apply(Op::Lt, vec![rhs]).await?.is_truthy())
    }

    /// Tests whether the variable is at most `rhs`.
    pub async fn le(&self, rhs: Value) -> Result<bool> {
        Ok(self.apply(Op::Le, vec![rhs]).await?.is_truthy())
    }
}

impl core::fmt::Debug for RemoteRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RemoteRef({})", self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_names_round_trip() {
        for op in [
            Op::Load,
            Op::Store,
            Op::Get,
            Op::Set,
            Op::Call,
            Op::Repr,
            Op::Neg,
            Op::Len,
            Op::Add,
            Op::Sub,
            Op::Mul,
            Op::Div,
            Op::Rem,
            Op::Pow,
            Op::Concat,
            Op::Eq,
            Op::Lt,
            Op::Le,
        ] {
            assert_eq!(Op::parse(op.name()), Some(op));
        }
        assert_eq!(Op::parse("frobnicate"), None);
    }
}
