//! Error hierarchy shared by the Tenki crates.
//!
//! Library code returns the narrow enums below; the binary collects them
//! into [`AppError`] and shows `user_message()` to the user while the full
//! `Display` text goes to the log.

use thiserror::Error;

/// Everything the CLI can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Forecast history error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Forecast failures without a transport or storage cause
    #[error("{message}")]
    Service {
        message: String,
        user_message: &'static str,
    },

    /// Startup failures (logging setup)
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Service { user_message, .. } => user_message,
            AppError::Other(_) => "Tenki could not start.",
        }
    }
}

/// Failures talking to the JMA endpoints.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty response body from {0}")]
    EmptyBody(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Could not reach the JMA server.",
            NetworkError::Timeout => "The forecast server did not answer in time.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The forecast server is having trouble. Try again later."
            }
            NetworkError::ServerError { .. } => "The forecast request was rejected.",
            NetworkError::InvalidResponse(_) => "The forecast server sent data Tenki cannot read.",
            NetworkError::EmptyBody(_) => "No forecast is published for this region.",
        }
    }
}

/// Failures of the local SQLite history.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot open database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Corrupt data: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "Forecast history is unavailable.",
            DatabaseError::QueryFailed(_) => "Reading or writing forecast history failed.",
            DatabaseError::Corruption(_) => {
                "Forecast history looks corrupted. Deleting weather.db resets it."
            }
        }
    }
}

/// Failures loading `config.toml` and the `TENKI_*` overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Loaded, but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Could not be read, written or deserialized
    #[error("Cannot load configuration: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Tenki's configuration has invalid values.",
            ConfigError::ParseError(_) => "Tenki's configuration file could not be read.",
        }
    }
}

/// Classify reqwest failures.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        match self.status() {
            _ if self.is_timeout() => NetworkError::Timeout,
            _ if self.is_connect() => NetworkError::ConnectionFailed(self.to_string()),
            Some(status) => NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            },
            None if self.is_decode() || self.is_body() => {
                NetworkError::InvalidResponse(self.to_string())
            }
            None => NetworkError::ConnectionFailed(self.to_string()),
        }
    }
}

/// Classify rusqlite failures.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        let code = self.sqlite_error_code();
        let message = self.to_string();
        match code {
            Some(rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase) => {
                DatabaseError::Corruption(message)
            }
            Some(rusqlite::ErrorCode::CannotOpen) => DatabaseError::ConnectionFailed(message),
            _ => DatabaseError::QueryFailed(message),
        }
    }
}
