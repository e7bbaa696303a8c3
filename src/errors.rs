//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Network or transport failure on a REST call.
    Http(String),
    /// Missing, expired, or rejected bearer token.
    Unauthorized(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Lifecycle action attempted from a state that does not permit it.
    InvalidStateTransition(String),
    /// Real-time messaging channel failure.
    Channel(String),
    /// Geolocation failure, including permission denial.
    Location(String),
    /// Credential storage lookup or write failure.
    Credentials(String),
    /// Response body did not match the expected shape.
    Malformed(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidStateTransition(msg) => write!(f, "invalid state transition: {msg}"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::Location(msg) => write!(f, "location: {msg}"),
            Self::Credentials(msg) => write!(f, "credentials: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
