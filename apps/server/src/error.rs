use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use doc_translator_core::ServiceError;

/// Wire shape of every error response. `stack` is populated only outside
/// production.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn from_service(err: ServiceError, expose_detail: bool) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let stack = expose_detail.then(|| format!("{:?}", err));
        Self {
            status,
            body: ErrorBody {
                message: err.to_string(),
                stack,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.body.message, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
