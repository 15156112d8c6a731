//! Unified error type for the mqttvold-lib crate.
//!
//! [`MqttvoldError`] is what the CLI commands return: host command failures,
//! file I/O and configuration problems. Transport and payload errors never
//! reach it; they are logged and retried or dropped where they occur.
//! `From` impls allow `?` to propagate across module boundaries.

use std::fmt;

use crate::host::HostError;

/// Unified error type for mqttvold-lib operations.
#[derive(Debug)]
pub enum MqttvoldError {
    /// Host audio command or query error.
    Host(HostError),
    /// Standard I/O error (config persistence, log file).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for MqttvoldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttvoldError::Host(e) => write!(f, "{e}"),
            MqttvoldError::Io(e) => write!(f, "I/O error: {e}"),
            MqttvoldError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for MqttvoldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MqttvoldError::Host(e) => Some(e),
            MqttvoldError::Io(e) => Some(e),
            MqttvoldError::Config(_) => None,
        }
    }
}

impl From<HostError> for MqttvoldError {
    fn from(e: HostError) -> Self {
        MqttvoldError::Host(e)
    }
}

impl From<std::io::Error> for MqttvoldError {
    fn from(e: std::io::Error) -> Self {
        MqttvoldError::Io(e)
    }
}

/// Crate-level Result alias using [`MqttvoldError`].
pub type Result<T> = std::result::Result<T, MqttvoldError>;
