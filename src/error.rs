//! Unified error types.
//!
//! Per-request failures (no route, bad segment, missing parameter) are never
//! surfaced as `Error`s: the dispatcher recovers them into the not-found
//! response, see [`DispatchError`](crate::DispatchError). What remains here is
//! configuration that cannot be compiled into a route table, and transport
//! failures: binding a port or accepting a connection.

/// The error type returned by kvist's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A controller tree or endpoint declaration that cannot be routed.
///
/// Raised at compile time, never per request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid child name `{0}`: names must be non-empty, contain no `/` and not start with `_`")]
    InvalidName(String),

    #[error("parameter names must not be empty")]
    EmptyParameterName,

    #[error("parameter `{0}` is declared twice")]
    DuplicateParameter(String),

    #[error("mandatory parameter `{mandatory}` follows optional parameter `{optional}`")]
    MandatoryAfterOptional { mandatory: String, optional: String },

    #[error("controller at `/{0}` is its own ancestor")]
    Cycle(String),
}
