//! # RPC Argument Values
//!
//! Tagged-union argument type carried by entity RPC calls and replicated
//! property state. Every value that crosses the wire boundary is an
//! [`ArgValue`], with explicit encode/decode per supported primitive instead
//! of dynamically typed argument arrays.
//!
//! Conversions in are provided by [`IntoArg`] (plus the [`args!`](crate::args!)
//! macro for building argument lists), conversions out by [`FromArg`].

use crate::types::Mailbox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single RPC argument or replicated property value.
///
/// The encoding is self-describing (`{"t": "Str", "v": "hello"}`) so a peer can
/// decode arguments without out-of-band schema knowledge. Nested containers are
/// allowed to arbitrary depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ArgValue {
    /// Boolean primitive
    Bool(bool),
    /// Signed integer primitive
    Int(i64),
    /// Floating point primitive
    Float(f64),
    /// UTF-8 string primitive
    Str(String),
    /// Entity address, passed by value so peers can call back
    Mailbox(Mailbox),
    /// Ordered container of nested values
    List(Vec<ArgValue>),
    /// String-keyed container of nested values
    Dict(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    /// Returns a short name for the variant, used in decode errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Str(_) => "string",
            ArgValue::Mailbox(_) => "mailbox",
            ArgValue::List(_) => "list",
            ArgValue::Dict(_) => "dict",
        }
    }

    /// Convenience constructor for an empty list value.
    pub fn empty_list() -> Self {
        ArgValue::List(Vec::new())
    }

    /// Convenience constructor for an empty dict value.
    pub fn empty_dict() -> Self {
        ArgValue::Dict(BTreeMap::new())
    }

    /// Decodes this value into a concrete Rust type.
    pub fn decode<T: FromArg>(self) -> Result<T, ArgDecodeError> {
        T::from_arg(self)
    }
}

/// Error produced when an [`ArgValue`] cannot be decoded into the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct ArgDecodeError {
    /// Type the caller asked for
    pub expected: &'static str,
    /// Variant actually carried by the value
    pub found: &'static str,
}

// ============================================================================
// Conversions In
// ============================================================================

/// Conversion of a Rust value into an [`ArgValue`].
pub trait IntoArg {
    /// Converts `self` into the wire-level argument representation.
    fn into_arg(self) -> ArgValue;
}

impl IntoArg for ArgValue {
    fn into_arg(self) -> ArgValue {
        self
    }
}

impl IntoArg for bool {
    fn into_arg(self) -> ArgValue {
        ArgValue::Bool(self)
    }
}

impl IntoArg for i64 {
    fn into_arg(self) -> ArgValue {
        ArgValue::Int(self)
    }
}

impl IntoArg for i32 {
    fn into_arg(self) -> ArgValue {
        ArgValue::Int(self as i64)
    }
}

impl IntoArg for u32 {
    fn into_arg(self) -> ArgValue {
        ArgValue::Int(self as i64)
    }
}

impl IntoArg for f64 {
    fn into_arg(self) -> ArgValue {
        ArgValue::Float(self)
    }
}

impl IntoArg for f32 {
    fn into_arg(self) -> ArgValue {
        ArgValue::Float(self as f64)
    }
}

impl IntoArg for String {
    fn into_arg(self) -> ArgValue {
        ArgValue::Str(self)
    }
}

impl IntoArg for &str {
    fn into_arg(self) -> ArgValue {
        ArgValue::Str(self.to_string())
    }
}

impl IntoArg for Mailbox {
    fn into_arg(self) -> ArgValue {
        ArgValue::Mailbox(self)
    }
}

impl IntoArg for Vec<ArgValue> {
    fn into_arg(self) -> ArgValue {
        ArgValue::List(self)
    }
}

impl IntoArg for BTreeMap<String, ArgValue> {
    fn into_arg(self) -> ArgValue {
        ArgValue::Dict(self)
    }
}

// ============================================================================
// Conversions Out
// ============================================================================

/// Conversion of an [`ArgValue`] back into a concrete Rust type.
///
/// Decoding is strict: no implicit numeric widening or string parsing is
/// performed, so a mismatch always surfaces as an [`ArgDecodeError`] instead of
/// silently coercing.
pub trait FromArg: Sized {
    /// Name of the target type, used in error reporting.
    fn expected() -> &'static str;

    /// Attempts the conversion.
    fn from_arg(value: ArgValue) -> Result<Self, ArgDecodeError>;
}

macro_rules! from_arg_impl {
    ($ty:ty, $expected:literal, $variant:ident) => {
        impl FromArg for $ty {
            fn expected() -> &'static str {
                $expected
            }

            fn from_arg(value: ArgValue) -> Result<Self, ArgDecodeError> {
                match value {
                    ArgValue::$variant(inner) => Ok(inner),
                    other => Err(ArgDecodeError {
                        expected: $expected,
                        found: other.kind_name(),
                    }),
                }
            }
        }
    };
}

from_arg_impl!(bool, "bool", Bool);
from_arg_impl!(i64, "int", Int);
from_arg_impl!(f64, "float", Float);
from_arg_impl!(String, "string", Str);
from_arg_impl!(Mailbox, "mailbox", Mailbox);
from_arg_impl!(Vec<ArgValue>, "list", List);
from_arg_impl!(BTreeMap<String, ArgValue>, "dict", Dict);

impl FromArg for ArgValue {
    fn expected() -> &'static str {
        "value"
    }

    fn from_arg(value: ArgValue) -> Result<Self, ArgDecodeError> {
        Ok(value)
    }
}

/// Builds a `Vec<ArgValue>` argument list from a mixed set of Rust values.
///
/// ```rust
/// use meridian_entity_system::args;
///
/// let argv = args!["hi", 3i64, true];
/// assert_eq!(argv.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::args::ArgValue>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::args::IntoArg::into_arg($arg)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;

    #[test]
    fn round_trips_through_json() {
        let value = ArgValue::Dict(BTreeMap::from([
            ("name".to_string(), "pilot".into_arg()),
            ("hp".to_string(), 42i64.into_arg()),
            (
                "home".to_string(),
                Mailbox::new("gate-1", 7100, 0, EntityId::new("P1")).into_arg(),
            ),
        ]));
        let encoded = serde_json::to_string(&value).unwrap();
        let decoded: ArgValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn strict_decode_rejects_mismatch() {
        let err = String::from_arg(ArgValue::Int(5)).unwrap_err();
        assert_eq!(err.expected, "string");
        assert_eq!(err.found, "int");
    }

    #[test]
    fn args_macro_builds_mixed_lists() {
        let argv = args!["echo", 1i64, 2.5f64, false];
        assert_eq!(argv[0], ArgValue::Str("echo".to_string()));
        assert_eq!(argv[3], ArgValue::Bool(false));
        assert!(args![].is_empty());
    }
}
