use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;
use factstack_service::{Error, QueryOptions, QueryOutcome};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
	pub question: String,
	#[serde(flatten)]
	pub options: QueryOptions,
}

pub fn router(state: AppState) -> Router {
	Router::new().route("/health", get(health)).route("/v1/ask", post(ask)).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

/// Refusals are successful responses; callers must check `bundle.usable`.
async fn ask(
	State(state): State<AppState>,
	Json(payload): Json<AskRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
	let outcome = state.engine.run_query(&payload.question, payload.options).await?;

	Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				Self::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			Error::RetrievalUnavailable { message } =>
				Self::new(StatusCode::SERVICE_UNAVAILABLE, "retrieval_unavailable", message),
			Error::Storage { message } => {
				warn!(error = %message, "Request failed with a storage error.");

				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
