//! HTTP handlers for the send and health-check endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_core::{DeviceId, HubError};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::server::AppState;

/// Body of `POST /api/v1/send`. A missing or null `device_id` means
/// broadcast to every connected device.
#[derive(Debug, Deserialize)]
pub struct SendBody {
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    pub text: String,
}

/// `POST /api/v1/send` — deliver a message to one device or to all.
///
/// Each call runs under its own cancellation token with the configured send
/// timeout, so a slow or stalled device cannot pin the request forever.
pub async fn send(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let body: SendBody =
        serde_json::from_value(body).map_err(|err| ApiError::bad_request(err.to_string()))?;
    if body.text.is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }

    let cancel = CancellationToken::new();
    let timer = {
        let cancel = cancel.clone();
        let timeout = state.send_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let result = match body.device_id {
        Some(id) => state.registry.send_to(id, &body.text, &cancel).await,
        None => state.registry.send_to_all(&body.text, &cancel).await,
    };
    timer.abort();

    result?;
    Ok(StatusCode::OK)
}

/// `GET /api/v1/health-check`.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connected": state.registry.len(),
    }))
}

pub async fn fallback() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Error envelope returned by the HTTP layer as `{"error": "..."}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        let status = match err {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::AllFailed { .. } => StatusCode::BAD_GATEWAY,
            HubError::InvalidDeviceId(_) | HubError::AlreadyRegistered(_) => {
                StatusCode::BAD_REQUEST
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "request rejected");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
