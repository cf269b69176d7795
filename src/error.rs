// Error types shared by the HTTP layer and the domain modules

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::admin::DraftError;
use crate::backend::BackendError;
use crate::checkout::CheckoutError;

// Application error returned by every handler
#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Unavailable(String), // A required external capability is not configured
}

// Implement conversion from anyhow::Error for easier error propagation
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<BackendError> for AppError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NotConfigured(what) => AppError::Unavailable(what),
            other => AppError::InternalServerError(anyhow::Error::new(other)),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(error: CheckoutError) -> Self {
        match error {
            CheckoutError::Validation(message) => AppError::BadRequest(message),
            CheckoutError::InvalidTransition { .. } => AppError::BadRequest(error.to_string()),
            CheckoutError::Configuration(message) => AppError::Unavailable(message),
            CheckoutError::ExternalFailure(e) => AppError::InternalServerError(e),
        }
    }
}

// Inventory form problems are shown to the administrator as-is
impl From<DraftError> for AppError {
    fn from(error: DraftError) -> Self {
        AppError::BadRequest(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(e) => {
                // Log the detailed error here, don't expose internal details to the client
                tracing::error!("Internal server error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Unauthorized(message) => {
                tracing::warn!("Unauthorized access attempt: {}", message);
                (StatusCode::UNAUTHORIZED, message)
            }
            AppError::Forbidden(message) => {
                tracing::warn!("Forbidden: {}", message);
                (StatusCode::FORBIDDEN, message)
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Unavailable(message) => {
                tracing::error!("Capability unavailable: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
        };

        (status, Json(json!({ "success": false, "error": error_message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let response = AppError::from(CheckoutError::Validation("Name is required".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_configuration_maps_to_service_unavailable() {
        let response = AppError::from(BackendError::NotConfigured("backend url".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = AppError::InternalServerError(anyhow::anyhow!("db password leaked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
