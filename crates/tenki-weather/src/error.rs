//! Forecast pipeline error types.

use tenki_core::{AppError, DatabaseError, NetworkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    /// Region hierarchy could not be fetched or parsed; no region list can be shown
    #[error("Region catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Upstream answered but has nothing for this region
    #[error("No forecast data for region {region_code}")]
    NoForecastData { region_code: String },

    #[error("Forecast request timed out")]
    Timeout,

    #[error("Forecast request failed: {0}")]
    Transport(NetworkError),

    #[error("Forecast store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),

    /// Neither a live fetch nor the store could provide data
    #[error("No live or cached forecast for {region_name}: {reason}")]
    Unavailable { region_name: String, reason: String },
}

impl From<NetworkError> for ForecastError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Timeout => Self::Timeout,
            other => Self::Transport(other),
        }
    }
}

impl ForecastError {
    /// Whether a stored snapshot may be served instead.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }

    /// User-friendly error message for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::CatalogUnavailable(_) => "Failed to load the region list.",
            Self::NoForecastData { .. } => "No forecast is provided for this region.",
            Self::Timeout => "The forecast request timed out.",
            Self::Transport(e) => e.user_message(),
            Self::StoreUnavailable(e) => e.user_message(),
            Self::Unavailable { .. } => "No live or cached data for this region.",
        }
    }
}

impl From<ForecastError> for AppError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::Transport(e) => AppError::Network(e),
            ForecastError::Timeout => AppError::Network(NetworkError::Timeout),
            ForecastError::StoreUnavailable(e) => AppError::Database(e),
            other => AppError::Service {
                user_message: other.user_message(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_network_error_becomes_timeout() {
        let err: ForecastError = NetworkError::Timeout.into();
        assert!(matches!(err, ForecastError::Timeout));
        assert!(err.is_transient());
    }

    #[test]
    fn test_no_data_is_not_transient() {
        let err = ForecastError::NoForecastData {
            region_code: "014030".into(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("014030"));
    }

    #[test]
    fn test_store_error_is_not_transient() {
        let err: ForecastError = DatabaseError::QueryFailed("locked".into()).into();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_conversion_into_app_error() {
        let app: AppError = ForecastError::Transport(NetworkError::ServerError {
            status: 404,
            message: "not found".into(),
        })
        .into();
        assert!(matches!(app, AppError::Network(NetworkError::ServerError { status: 404, .. })));

        let app: AppError = ForecastError::Unavailable {
            region_name: "十勝地方".into(),
            reason: "timeout".into(),
        }
        .into();
        assert_eq!(app.user_message(), "No live or cached data for this region.");
    }

    #[test]
    fn test_store_error_keeps_its_message_in_app_error() {
        let err: ForecastError = DatabaseError::ConnectionFailed("read-only fs".into()).into();
        let expected = err.user_message();

        let app: AppError = err.into();
        assert!(matches!(app, AppError::Database(DatabaseError::ConnectionFailed(_))));
        assert_eq!(app.user_message(), expected);
        assert_eq!(expected, "Forecast history is unavailable.");
    }
}
