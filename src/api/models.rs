//! Request/response payloads for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body for `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Text handed to the downstream processor.
    pub text: String,
}

/// Successful response for `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Raw processor output, relayed verbatim.
    pub result: Value,
    /// Balance after the debit for this request.
    pub remaining_credits: i64,
}
