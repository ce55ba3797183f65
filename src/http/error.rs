//! Maps [`CoreError`] onto HTTP status codes and the `{"detail": "<code>"}`
//! body every handler in this module returns on failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::CoreError;

/// Newtype so [`CoreError`] (defined in the core crate, outside `http`) can
/// implement axum's `IntoResponse` via the orphan-rule-friendly wrapper.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::AllocationQuantityMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::MarketDataMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::StatusMismatch { .. }
            | CoreError::LifecycleNotActive
            | CoreError::ConcurrentUpdate
            | CoreError::DealBlockNotActive
            | CoreError::InvariantBreach(_) => StatusCode::CONFLICT,
            CoreError::WorkflowStartFailed(_) => StatusCode::BAD_GATEWAY,
            CoreError::Store(_) | CoreError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = self.0.machine_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(detail, "request failed");
        } else {
            tracing::debug!(detail, %status, "request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Handler return type: a JSON success body or a mapped [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;
