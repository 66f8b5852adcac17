use std::fmt;

/// Errors returned by dispatcher-side operations.
#[derive(Debug)]
pub enum CageError {
    /// A classified operation was refused by policy; carries the message
    /// that should be surfaced to the agent verbatim.
    Policy(String),
    /// A subprocess (git/gh/hook) exceeded its enforced timeout.
    Timeout(String),
    /// The git or gh binary could not be found on PATH.
    BinaryMissing(String),
    /// Workspace bootstrap failed; carries the underlying binary's stderr.
    Bootstrap(String),
    /// Pod runtime (container/cluster) operation failed.
    PodRuntime(String),
    /// Invalid input or configuration.
    Validation(String),
    /// Requested resource not found.
    NotFound(String),
    /// Unexpected I/O or internal failure.
    Internal(String),
}

impl fmt::Display for CageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CageError::Policy(msg) => write!(f, "policy denial: {msg}"),
            CageError::Timeout(msg) => write!(f, "timeout: {msg}"),
            CageError::BinaryMissing(msg) => write!(f, "binary missing: {msg}"),
            CageError::Bootstrap(msg) => write!(f, "bootstrap error: {msg}"),
            CageError::PodRuntime(msg) => write!(f, "pod runtime error: {msg}"),
            CageError::Validation(msg) => write!(f, "validation error: {msg}"),
            CageError::NotFound(msg) => write!(f, "not found: {msg}"),
            CageError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CageError {}

impl From<CageError> for String {
    fn from(err: CageError) -> Self {
        err.to_string()
    }
}

pub type Result<T> = std::result::Result<T, CageError>;
