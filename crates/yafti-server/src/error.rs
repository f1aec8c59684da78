use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use yafti_core::error::YaftiError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(YaftiError::InvalidRequest(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if let Some(e) = self.0.downcast_ref::<YaftiError>() {
            match e {
                YaftiError::ActionNotFound(_) | YaftiError::ScreenNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                YaftiError::MalformedSelection(_) | YaftiError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                YaftiError::ConfigNotFound { .. }
                | YaftiError::ConfigUnavailable { .. }
                | YaftiError::InvalidConfig(_)
                | YaftiError::Io(_)
                | YaftiError::Yaml(_)
                | YaftiError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
