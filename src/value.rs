//! Bound argument values and path-segment coercion.
//!
//! A path segment always arrives as a string. Each declared parameter names a
//! coercion that turns that string into a [`Value`]; the endpoint receives the
//! results as [`Args`], in declaration order.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// A single bound argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// An explicit "no value" default.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::Str(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::Str(s) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self { Self::Int(n.into()) }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self { Self::Int(n.into()) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Self::Float(n) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ── Coercion ──────────────────────────────────────────────────────────────────

/// A path segment could not be converted to the declared type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot read `{segment}` as {expected}")]
pub struct CoercionError {
    pub segment: String,
    pub expected: &'static str,
}

impl CoercionError {
    pub fn new(segment: &str, expected: &'static str) -> Self {
        Self { segment: segment.to_owned(), expected }
    }
}

/// Types a raw path segment can be coerced into.
///
/// Implement this on your own marker types to plug a custom conversion into
/// [`Param::new`](crate::Param::new).
pub trait Coerce: 'static {
    /// Human-readable type name, used in diagnostics and parameter equality.
    const TYPE_NAME: &'static str;

    fn coerce(segment: &str) -> Result<Value, CoercionError>;
}

impl Coerce for String {
    const TYPE_NAME: &'static str = "str";

    fn coerce(segment: &str) -> Result<Value, CoercionError> {
        Ok(Value::Str(segment.to_owned()))
    }
}

impl Coerce for bool {
    const TYPE_NAME: &'static str = "bool";

    fn coerce(segment: &str) -> Result<Value, CoercionError> {
        segment
            .parse()
            .map(Value::Bool)
            .map_err(|_| CoercionError::new(segment, Self::TYPE_NAME))
    }
}

impl Coerce for f64 {
    const TYPE_NAME: &'static str = "float";

    fn coerce(segment: &str) -> Result<Value, CoercionError> {
        segment
            .parse()
            .map(Value::Float)
            .map_err(|_| CoercionError::new(segment, Self::TYPE_NAME))
    }
}

macro_rules! coerce_int {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Coerce for $ty {
            const TYPE_NAME: &'static str = $name;

            fn coerce(segment: &str) -> Result<Value, CoercionError> {
                segment
                    .parse::<$ty>()
                    .ok()
                    .and_then(|n| i64::try_from(n).ok())
                    .map(Value::Int)
                    .ok_or_else(|| CoercionError::new(segment, Self::TYPE_NAME))
            }
        }
    )*};
}

coerce_int! {
    i64 => "int",
    i32 => "i32",
    u32 => "u32",
    u64 => "u64",
}

// ── Args ──────────────────────────────────────────────────────────────────────

/// Arguments bound from the leftover path segments, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    entries: Vec<(Arc<str>, Value)>,
}

impl Args {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self { entries: Vec::with_capacity(n) }
    }

    pub(crate) fn push(&mut self, name: Arc<str>, value: Value) {
        self.entries.push((name, value));
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Looks an argument up by its declared name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

/// Positional access: `args[0]` is the first declared parameter.
impl Index<usize> for Args {
    type Output = Value;

    fn index(&self, i: usize) -> &Value {
        &self.entries[i].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_coercion() {
        assert_eq!(i64::coerce("42"), Ok(Value::Int(42)));
        assert_eq!(i64::coerce("-7"), Ok(Value::Int(-7)));
        assert!(i64::coerce("abc").is_err());
        assert!(i64::coerce("4.2").is_err());
    }

    #[test]
    fn u64_must_fit_i64() {
        assert_eq!(u64::coerce("9"), Ok(Value::Int(9)));
        assert!(u64::coerce("18446744073709551615").is_err());
        assert!(u32::coerce("-1").is_err());
    }

    #[test]
    fn string_is_identity() {
        assert_eq!(String::coerce("Ann"), Ok(Value::Str("Ann".into())));
    }

    #[test]
    fn bool_and_float() {
        assert_eq!(bool::coerce("true"), Ok(Value::Bool(true)));
        assert!(bool::coerce("yes").is_err());
        assert_eq!(f64::coerce("1.5"), Ok(Value::Float(1.5)));
    }

    #[test]
    fn coercion_error_message() {
        let err = i64::coerce("abc").unwrap_err();
        assert_eq!(err.to_string(), "cannot read `abc` as int");
    }

    #[test]
    fn args_lookup() {
        let mut args = Args::default();
        args.push("id".into(), Value::Int(3));
        args.push("name".into(), Value::from("x"));
        assert_eq!(args.int("id"), Some(3));
        assert_eq!(args.str("name"), Some("x"));
        assert_eq!(args[1], Value::Str("x".into()));
        assert_eq!(args.str("id"), None);
        assert_eq!(args.get("missing"), None);
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(5i64)), Value::Int(5));
    }
}
