//! Error taxonomy for the fetch pipeline.
//!
//! Every failure the crate surfaces belongs to one of four variants, each
//! carrying a human-readable message and a machine-readable short code.
//! Callers match exhaustively; there is no open hierarchy to downcast.

use thiserror::Error;

/// Short codes attached to every error for programmatic handling.
pub mod code {
    pub const AUTH_ERROR: &str = "AUTH_ERROR";
    pub const AUTH_RETRY_EXHAUSTED: &str = "AUTH_RETRY_EXHAUSTED";
    pub const FETCH_ERROR: &str = "FETCH_ERROR";
    pub const FETCH_TODAY_ERROR: &str = "FETCH_TODAY_ERROR";
    pub const FETCH_MONTH_ERROR: &str = "FETCH_MONTH_ERROR";
    pub const IFRAME_NOT_FOUND: &str = "IFRAME_NOT_FOUND";
    pub const IFRAME_ERROR: &str = "IFRAME_ERROR";
    pub const INVALID_PERIOD: &str = "INVALID_PERIOD";
    pub const PERIOD_SELECT_ERROR: &str = "PERIOD_SELECT_ERROR";
    pub const RETRY_EXHAUSTED: &str = "RETRY_EXHAUSTED";
    pub const EXPORT_ERROR: &str = "EXPORT_ERROR";

    // Transient codes produced by session drivers.
    pub const DRIVER_ERROR: &str = "DRIVER_ERROR";
    pub const NAV_TIMEOUT: &str = "NAV_TIMEOUT";
    pub const BROWSER_ERROR: &str = "BROWSER_ERROR";
}

/// Crate-wide error type.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid credentials, missing login form, or post-login verification
    /// failure. Never retried.
    #[error("[{code}] {message}")]
    Authentication { message: String, code: &'static str },

    /// Network/timeout-class failure presumed recoverable by retrying.
    #[error("[{code}] {message}")]
    Transient { message: String, code: &'static str },

    /// Structural page problem: missing frame, unknown period, selector
    /// failure.
    #[error("[{code}] {message}")]
    Extraction { message: String, code: &'static str },

    /// I/O or serialization failure while writing results. Always fatal.
    #[error("[{code}] {message}")]
    Export { message: String, code: &'static str },
}

impl Error {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            code: code::AUTH_ERROR,
        }
    }

    pub fn authentication_coded(message: impl Into<String>, code: &'static str) -> Self {
        Self::Authentication {
            message: message.into(),
            code,
        }
    }

    pub fn transient(message: impl Into<String>, code: &'static str) -> Self {
        Self::Transient {
            message: message.into(),
            code,
        }
    }

    pub fn extraction(message: impl Into<String>, code: &'static str) -> Self {
        Self::Extraction {
            message: message.into(),
            code,
        }
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
            code: code::EXPORT_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Authentication { message, .. }
            | Self::Transient { message, .. }
            | Self::Extraction { message, .. }
            | Self::Export { message, .. } => message,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { code, .. }
            | Self::Transient { code, .. }
            | Self::Extraction { code, .. }
            | Self::Export { code, .. } => code,
        }
    }

    /// Process exit code for the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Authentication { .. } => 1,
            Self::Transient { .. } | Self::Extraction { .. } => 2,
            Self::Export { .. } => 3,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = Error::authentication("bad credentials");
        assert_eq!(err.to_string(), "[AUTH_ERROR] bad credentials");
    }

    #[test]
    fn test_accessors() {
        let err = Error::extraction("frame missing", code::IFRAME_NOT_FOUND);
        assert_eq!(err.code(), "IFRAME_NOT_FOUND");
        assert_eq!(err.message(), "frame missing");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::authentication("x").exit_code(), 1);
        assert_eq!(Error::transient("x", code::DRIVER_ERROR).exit_code(), 2);
        assert_eq!(Error::extraction("x", code::FETCH_ERROR).exit_code(), 2);
        assert_eq!(Error::export("x").exit_code(), 3);
    }
}
