// src/score/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input to one scoring call: the post plus the query it was observed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub source_link: String,
    pub query: String,
    pub post_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
}

/// One scored role from a backend. A single post can advertise several roles,
/// so backends return a list of these.
///
/// `match_percentage` and `experience_gap` stay raw JSON: model output is not
/// trusted to be numeric, and the decision engine owns the coercion (with a
/// typed error on garbage) so the failure surfaces at the contract boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoredResult {
    #[serde(default)]
    pub match_percentage: Value,
    #[serde(default)]
    pub experience_gap: Value,
    #[serde(default)]
    pub contact_email: Vec<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub should_apply: bool,
    #[serde(default)]
    pub message_content: Option<MessageContent>,
    #[serde(default)]
    pub additional_data: Value,
    /// Stamped by the failover invoker with the backend that produced this.
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub scored_at: Option<DateTime<Utc>>,
}

impl ScoredResult {
    /// Synthetic degraded result: every backend in the pool failed.
    pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            match_percentage: Value::Null,
            experience_gap: Value::Null,
            contact_email: Vec::new(),
            company_name: None,
            should_apply: false,
            message_content: None,
            additional_data: Value::Null,
            model_name: None,
            error: Some(error.into()),
            status: Status::Failed,
            scored_at: Some(at),
        }
    }
}
