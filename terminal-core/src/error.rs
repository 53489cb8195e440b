//! Error types for the terminal

use thiserror::Error;

/// Terminal-wide error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminalError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No data available")]
    NoData,

    #[error("Ticker resolution failed for '{company}': {reason}")]
    Resolution { company: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl TerminalError {
    pub fn network(msg: impl Into<String>) -> Self {
        TerminalError::Network(msg.into())
    }

    pub fn http(status: u16) -> Self {
        TerminalError::Http { status }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        TerminalError::Parse(msg.into())
    }

    pub fn resolution(company: impl Into<String>, reason: impl Into<String>) -> Self {
        TerminalError::Resolution {
            company: company.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        TerminalError::Config(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        TerminalError::Channel(msg.into())
    }

    /// True when the failure happened before any domain request was sent
    pub fn is_resolution(&self) -> bool {
        matches!(self, TerminalError::Resolution { .. })
    }
}

/// Result type alias for terminal operations
pub type TerminalResult<T> = Result<T, TerminalError>;
