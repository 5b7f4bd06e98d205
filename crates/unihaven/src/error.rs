use crate::config::ConfigError;
use crate::housing::{
    ApiError, CatalogError, RatingError, RegistrationError, ReservationError, StoreError,
};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Registration(RegistrationError),
    Catalog(CatalogError),
    Reservation(ReservationError),
    Rating(RatingError),
    Store(StoreError),
    /// Demo data that cannot be loaded as written.
    Seed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Registration(err) => write!(f, "registration error: {}", err),
            AppError::Catalog(err) => write!(f, "catalog error: {}", err),
            AppError::Reservation(err) => write!(f, "reservation error: {}", err),
            AppError::Rating(err) => write!(f, "rating error: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Seed(reason) => write!(f, "demo seed error: {}", reason),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Registration(err) => Some(err),
            AppError::Catalog(err) => Some(err),
            AppError::Reservation(err) => Some(err),
            AppError::Rating(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Seed(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Registration(err) => ApiError::from(err).into_response(),
            AppError::Catalog(err) => ApiError::from(err).into_response(),
            AppError::Reservation(err) => ApiError::from(err).into_response(),
            AppError::Rating(err) => ApiError::from(err).into_response(),
            AppError::Store(err) => ApiError::from(err).into_response(),
            other => {
                let body = Json(json!({ "error": other.to_string(), "code": "internal" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<RegistrationError> for AppError {
    fn from(value: RegistrationError) -> Self {
        Self::Registration(value)
    }
}

impl From<CatalogError> for AppError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

impl From<ReservationError> for AppError {
    fn from(value: ReservationError) -> Self {
        Self::Reservation(value)
    }
}

impl From<RatingError> for AppError {
    fn from(value: RatingError) -> Self {
        Self::Rating(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
