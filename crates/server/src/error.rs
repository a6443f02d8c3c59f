use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cabkv_replica::ReplicaError;
use serde_json::json;

/// Maps the core's error taxonomy onto HTTP status codes (§10.1). A genuine broken invariant
/// (§7) never reaches this mapping: the core logs it at `error!` and aborts the process at the
/// point of detection, in the background loop that found it, rather than surfacing as an HTTP
/// response. The one call site that does construct `Invariant` for this layer — a `/metrics`
/// Prometheus-encode failure — is an ordinary internal failure, not a broken invariant; it is
/// reported as `500` like `Queue` and `AwaitTimeout` are reported as `503`/`504`.
pub struct ApiError(pub ReplicaError);

impl From<ReplicaError> for ApiError {
	fn from(err: ReplicaError) -> Self {
		Self(err)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			ReplicaError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
			ReplicaError::AwaitTimeout => StatusCode::GATEWAY_TIMEOUT,
			ReplicaError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let body = Json(json!({ "msg": self.0.to_string() }));
		(status, body).into_response()
	}
}
