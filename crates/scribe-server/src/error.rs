//! Domain-error to HTTP response conversion

use axum::Json;
use axum::response::{IntoResponse, Response};
use scribe_core::HttpError;

/// Render a domain error as a JSON error response
pub fn error_response<E: HttpError>(error: &E) -> Response {
    let status = error.status_code();
    let body = serde_json::json!({
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    });

    (status, Json(body)).into_response()
}
