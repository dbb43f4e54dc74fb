use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::distribution::{
    DistributionError, OfferResponseError, QuotaError, RepositoryError,
};
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
    Distribution(DistributionError),
    Offer(OfferResponseError),
    Quota(QuotaError),
    Storage(RepositoryError),
    Output(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Distribution(err) => write!(f, "distribution error: {}", err),
            AppError::Offer(err) => write!(f, "offer response error: {}", err),
            AppError::Quota(err) => write!(f, "quota error: {}", err),
            AppError::Storage(err) => write!(f, "storage error: {}", err),
            AppError::Output(err) => write!(f, "output error: {}", err),
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
            AppError::Distribution(err) => Some(err),
            AppError::Offer(err) => Some(err),
            AppError::Quota(err) => Some(err),
            AppError::Storage(err) => Some(err),
            AppError::Output(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Distribution(DistributionError::CaseNotFound(_))
            | AppError::Distribution(DistributionError::LawyerNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Distribution(DistributionError::InvalidState { .. }) => StatusCode::CONFLICT,
            AppError::Offer(OfferResponseError::OfferNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Offer(OfferResponseError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Distribution(DistributionError::Repository(_))
            | AppError::Offer(OfferResponseError::Distribution(_))
            | AppError::Offer(OfferResponseError::Repository(_))
            | AppError::Quota(_)
            | AppError::Storage(_)
            | AppError::Output(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
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

impl From<DistributionError> for AppError {
    fn from(value: DistributionError) -> Self {
        Self::Distribution(value)
    }
}

impl From<OfferResponseError> for AppError {
    fn from(value: OfferResponseError) -> Self {
        Self::Offer(value)
    }
}

impl From<QuotaError> for AppError {
    fn from(value: QuotaError) -> Self {
        Self::Quota(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Storage(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}
