//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Every
//! variant maps to an [`ErrorKind`], which is what callers see on the wire as
//! a short `CODE: message` pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Caller-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UnknownTool,
    Validation,
    Connectivity,
    NotFound,
    Forbidden,
    InvalidSpec,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "UNKNOWN_TOOL",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Connectivity => "CONNECTIVITY",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::InvalidSpec => "INVALID_SPEC",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Main error enum for tool dispatch.
#[derive(Error, Debug)]
pub enum Error {
    /// No tool registered under the requested name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A single argument failed validation.
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// Request-level validation errors not tied to one argument.
    #[error("validation error: {0}")]
    Validation(String),

    /// Cluster unreachable or credentials rejected.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Denied by the cluster or by the local access policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The cluster rejected the submitted object.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// The call did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// One step of a multi-step tool failed; earlier steps stay applied.
    #[error("step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<Error>,
    },

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Category of this error. `Step` reports the kind of the step's failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownTool(_) => ErrorKind::UnknownTool,
            Error::InvalidArgument { .. } | Error::Validation(_) => ErrorKind::Validation,
            Error::Connectivity(_) => ErrorKind::Connectivity,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::InvalidSpec(_) => ErrorKind::InvalidSpec,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => ErrorKind::Internal,
            Error::Step { source, .. } => source.kind(),
        }
    }

    /// Wire error code, e.g. `NOT_FOUND`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Name of the failing step for multi-step tools.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Error::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Argument name for single-argument validation failures.
    pub fn invalid_field(&self) -> Option<&str> {
        match self {
            Error::InvalidArgument { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Short user-facing form: `CODE: message`.
    pub fn to_user_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

// Convenience constructors
impl Error {
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool(name.into())
    }

    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn step(step: impl Into<String>, source: Error) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }
}

/// Attach a step name to the error of a multi-step operation.
pub trait StepContext<T> {
    fn step(self, step: impl Into<String>) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn step(self, step: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::step(step, e))
    }
}
