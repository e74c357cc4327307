//! Unified error type for the sessionlight-lib crate.
//!
//! [`SessionlightError`] wraps module-specific errors (`DeviceError`) and
//! domain-specific error kinds (`Config`, `Color`, `State`). `From` impls allow
//! `?` to propagate across module boundaries seamlessly.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for sessionlight-lib operations.
#[derive(Debug)]
pub enum SessionlightError {
    /// Device communication error (open, write, external tool).
    Device(DeviceError),
    /// Standard I/O error (state file, lock file, config persistence).
    Io(std::io::Error),
    /// Configuration loading or validation error. Fatal at start-up.
    Config(String),
    /// Color parsing error.
    Color(String),
    /// Session state serialization error.
    State(String),
}

impl fmt::Display for SessionlightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionlightError::Device(e) => write!(f, "{e}"),
            SessionlightError::Io(e) => write!(f, "I/O error: {e}"),
            SessionlightError::Config(e) => write!(f, "Config error: {e}"),
            SessionlightError::Color(e) => write!(f, "Color error: {e}"),
            SessionlightError::State(e) => write!(f, "State error: {e}"),
        }
    }
}

impl std::error::Error for SessionlightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionlightError::Device(e) => Some(e),
            SessionlightError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for SessionlightError {
    fn from(e: DeviceError) -> Self {
        SessionlightError::Device(e)
    }
}

impl From<std::io::Error> for SessionlightError {
    fn from(e: std::io::Error) -> Self {
        SessionlightError::Io(e)
    }
}

/// Crate-level Result alias using [`SessionlightError`].
pub type Result<T> = std::result::Result<T, SessionlightError>;
