use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use servernet::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),

    #[error("server network error: {0}")]
    ServerNetwork(#[from] servernet::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody(rejection) => rejection.status(),
            ApiError::ServerNetwork(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::ServerNetwork(e) => match e.kind() {
                ErrorKind::InvalidIdentifier | ErrorKind::ResourceGone => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Fatal => match e {
                    servernet::Error::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    servernet::Error::ActionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    servernet::Error::MissingEnv(_) | servernet::Error::InvalidEnv { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    _ => StatusCode::BAD_GATEWAY,
                },
            },
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
