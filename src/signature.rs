//! Declared endpoint parameters.
//!
//! The request is always the implicit first argument of an endpoint and is
//! never listed here. Everything after it is described by an ordered list of
//! [`Param`]s: a name, an optional default (its absence makes the parameter
//! mandatory) and the [`Coercion`] applied to the raw path segment.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::endpoint::Action;
use crate::error::ConfigError;
use crate::value::{Coerce, CoercionError, Value};

/// Conversion from a raw path segment into a [`Value`].
#[derive(Clone, Copy)]
pub struct Coercion {
    type_name: &'static str,
    apply: fn(&str) -> Result<Value, CoercionError>,
}

impl Coercion {
    /// Coercion backed by a [`Coerce`] implementation.
    pub fn of<T: Coerce>() -> Self {
        Self { type_name: T::TYPE_NAME, apply: T::coerce }
    }

    /// Passes the segment through unconverted.
    pub fn raw() -> Self {
        Self { type_name: "raw", apply: passthrough }
    }

    /// A custom named conversion.
    pub fn custom(type_name: &'static str, apply: fn(&str) -> Result<Value, CoercionError>) -> Self {
        Self { type_name, apply }
    }

    pub fn type_name(&self) -> &'static str { self.type_name }

    pub fn apply(&self, segment: &str) -> Result<Value, CoercionError> {
        (self.apply)(segment)
    }
}

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Two coercions are equal when they name the same type.
impl PartialEq for Coercion {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

fn passthrough(segment: &str) -> Result<Value, CoercionError> {
    Ok(Value::Str(segment.to_owned()))
}

/// One declared parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    name: Arc<str>,
    default: Option<Value>,
    coercion: Coercion,
}

impl Param {
    /// A mandatory parameter coerced to `T`.
    pub fn new<T: Coerce>(name: &str) -> Self {
        Self::with(name, Coercion::of::<T>())
    }

    /// A mandatory, unannotated parameter: receives the raw segment as a string.
    pub fn raw(name: &str) -> Self {
        Self::with(name, Coercion::raw())
    }

    pub fn with(name: &str, coercion: Coercion) -> Self {
        Self { name: name.into(), default: None, coercion }
    }

    /// Makes the parameter optional; `default` is bound when no segment is left.
    pub fn or(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn is_mandatory(&self) -> bool { self.default.is_none() }
    pub fn default_value(&self) -> Option<&Value> { self.default.as_ref() }
    pub fn coercion(&self) -> Coercion { self.coercion }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

/// The validated, ordered parameter list of one endpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    params: Arc<[Param]>,
}

impl Signature {
    /// Extracts and validates the parameters declared on `action`.
    ///
    /// Fails on an empty or duplicated name, or on a mandatory parameter
    /// declared after an optional one: positional binding could never leave
    /// the optional one out.
    pub fn extract(action: &Action) -> Result<Self, ConfigError> {
        Self::validate(action.params())
    }

    pub(crate) fn validate(params: &[Param]) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(params.len());
        let mut optional_seen: Option<&str> = None;

        for param in params {
            if param.name.is_empty() {
                return Err(ConfigError::EmptyParameterName);
            }
            if !seen.insert(&*param.name) {
                return Err(ConfigError::DuplicateParameter(param.name.to_string()));
            }
            match (param.is_mandatory(), optional_seen) {
                (true, Some(optional)) => {
                    return Err(ConfigError::MandatoryAfterOptional {
                        mandatory: param.name.to_string(),
                        optional: optional.to_owned(),
                    });
                }
                (false, None) => optional_seen = Some(param.name()),
                _ => {}
            }
        }

        Ok(Self { params: params.into() })
    }

    pub fn params(&self) -> &[Param] { &self.params }
    pub fn len(&self) -> usize { self.params.len() }
    pub fn is_empty(&self) -> bool { self.params.is_empty() }
}
