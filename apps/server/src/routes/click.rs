//! Click callback endpoints.
//!
//! Click posts form-urlencoded bodies and expects HTTP 200 with a JSON
//! body in every case; the `error` field carries the protocol code. All
//! fields are extracted as defaulted strings so a malformed callback still
//! reaches the signature check instead of a transport-level rejection.

use axum::extract::State;
use axum::{Form, Json};

use tezshop_payments::services::click::{ClickRequest, ClickResponse};

use crate::state::AppState;

pub async fn prepare(
    State(state): State<AppState>,
    Form(request): Form<ClickRequest>,
) -> Json<ClickResponse> {
    Json(state.click.prepare(&request).await)
}

pub async fn complete(
    State(state): State<AppState>,
    Form(request): Form<ClickRequest>,
) -> Json<ClickResponse> {
    Json(state.click.complete(&request).await)
}
