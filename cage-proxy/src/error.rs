use std::fmt;

/// Errors returned by proxy-side operations.
#[derive(Debug)]
pub enum ProxyError {
    /// TLS handshake or certificate generation failed.
    Tls(String),
    /// Upstream connection or request forwarding failed.
    Upstream(String),
    /// The secret scanner could not be reached or returned malformed output.
    Scanner(String),
    /// Writing the decision log failed.
    Logging(String),
    /// Invalid input (malformed URL, unparseable CONNECT target, ...).
    Validation(String),
    /// Unexpected I/O or internal failure.
    Internal(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Tls(msg) => write!(f, "tls error: {msg}"),
            ProxyError::Upstream(msg) => write!(f, "upstream error: {msg}"),
            ProxyError::Scanner(msg) => write!(f, "scanner error: {msg}"),
            ProxyError::Logging(msg) => write!(f, "logging error: {msg}"),
            ProxyError::Validation(msg) => write!(f, "validation error: {msg}"),
            ProxyError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<ProxyError> for String {
    fn from(err: ProxyError) -> Self {
        err.to_string()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
