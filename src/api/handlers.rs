//! Axum route handlers.

use axum::{Json, extract::State, http::HeaderMap};
use serde_json::{Value, json};

use crate::AppState;
use crate::api::models::{PredictRequest, PredictResponse};
use crate::errors::Result;
use crate::gate::Decision;
use crate::storage::AccountStore;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "tollgate inference gateway is live" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Gate the request through the ledger, then run inference.
///
/// The credit is spent before the processor runs and is not refunded if the
/// processor fails; the reported balance comes from the debit itself, not a
/// re-read.
pub async fn predict<S: AccountStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(payload): Json<PredictRequest>,
) -> Result<Json<PredictResponse>> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let remaining_credits = match state.gate.authorize_and_debit(api_key).await {
        Decision::Admitted { remaining_credits } => remaining_credits,
        Decision::Rejected(rejection) => return Err(rejection.into()),
    };

    let result = state.processor.process(&payload.text).await?;

    Ok(Json(PredictResponse {
        result,
        remaining_credits,
    }))
}
