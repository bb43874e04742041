use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Single turn in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender ("system", "user" or "assistant")
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Build a user-role message from a query string
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of a POST /chat/products request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatProductsRequest {
    /// The user's query
    pub query: String,
    /// When true, switches verbose telemetry on for the rest of the run
    #[serde(rename = "enable-telemetry", default)]
    pub enable_telemetry: bool,
}

/// Wrapped model output returned to the caller
///
/// `message` holds the reply text JSON-quoted (serialized with
/// `serde_json::to_string`), matching the wire shape downstream
/// consumers already parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// JSON-quoted reply text
    pub message: String,
}

/// One pending query/response pair, serialized as a single queue-file line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    /// Original user query
    pub query: String,
    /// The chat response produced for it
    pub response: ChatResponse,
}

/// Judge scores for a single record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRow {
    /// Original user query
    pub query: String,
    /// Reply text that was scored
    pub response: String,
    /// Score per category (1.0 to 5.0)
    pub scores: HashMap<String, f64>,
}

/// Complete result of an evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    /// Per-record scores
    pub rows: Vec<EvalRow>,
    /// Mean score per category across all rows
    pub metrics: HashMap<String, f64>,
    /// Link to the run in the hosted studio
    pub studio_url: String,
}
