// src/decide/mod.rs
//! # Decision Engine
//! Turns scored results into notifications. Eligibility is a short-circuit
//! chain (recipients, match cutoff, gap cutoff, employment type); eligible
//! results are checked against the notified ledger, dispatched per recipient
//! plus one operator confirmation, and only then appended to the ledger —
//! a crash mid-dispatch re-sends rather than silently drops.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Thresholds;
use crate::notify::{NotificationTransport, OutboundMessage};
use crate::score::types::{ScoredResult, Status};
use crate::store::{PostStore, StoreError};

static RE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("address regex")
});

#[derive(Debug, Error)]
pub enum DecisionError {
    /// Model emitted something non-coercible where a number was required.
    #[error("field '{field}' is not numeric: {value}")]
    NonNumeric { field: &'static str, value: Value },
    #[error("eligible result has no message content")]
    MissingMessageContent,
    #[error("additional_data is not an object: {0}")]
    MalformedAdditionalData(Value),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("notification transport failed: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Why a result did not lead to a dispatch. Stable strings, used as both
/// log fields and summary keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent { recipients: Vec<String> },
    AlreadyNotified,
    Skipped { reason: &'static str },
}

/// Coerce a model-emitted value to f64. Null means "not stated" and coerces
/// to 0.0; strings are parsed; anything else is a contract violation.
fn coerce_number(field: &'static str, value: &Value) -> Result<f64, DecisionError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n.as_f64().ok_or_else(|| DecisionError::NonNumeric {
            field,
            value: value.clone(),
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| DecisionError::NonNumeric {
            field,
            value: value.clone(),
        }),
        _ => Err(DecisionError::NonNumeric {
            field,
            value: value.clone(),
        }),
    }
}

fn valid_recipients(result: &ScoredResult) -> Vec<String> {
    result
        .contact_email
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| RE_ADDRESS.is_match(e))
        .collect()
}

/// `additional_data` must be an object (or absent). Anything else is an
/// upstream contract violation, not a skippable condition.
fn employment_type(result: &ScoredResult) -> Result<Option<String>, DecisionError> {
    match &result.additional_data {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(map
            .get("employment_type")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase())),
        other => Err(DecisionError::MalformedAdditionalData(other.clone())),
    }
}

/// Pure eligibility check, in fixed order. Returns the validated recipient
/// list on success, or the first failing gate's reason.
pub fn evaluate(
    result: &ScoredResult,
    thresholds: &Thresholds,
) -> Result<Result<Vec<String>, &'static str>, DecisionError> {
    let recipients = valid_recipients(result);
    if recipients.is_empty() {
        return Ok(Err("no valid contact email"));
    }
    let pct = coerce_number("match_percentage", &result.match_percentage)?;
    if pct <= thresholds.match_percentage_cutoff {
        return Ok(Err("match percentage at or below cutoff"));
    }
    let gap = coerce_number("experience_gap", &result.experience_gap)?;
    if gap >= thresholds.experience_gap_cutoff {
        return Ok(Err("experience gap at or above cutoff"));
    }
    if employment_type(result)?.as_deref() == Some("internship") {
        return Ok(Err("internship posting"));
    }
    Ok(Ok(recipients))
}

pub struct DecisionEngine {
    thresholds: Thresholds,
    operator_email: String,
    store: Arc<dyn PostStore>,
    transport: Arc<dyn NotificationTransport>,
}

impl DecisionEngine {
    pub fn new(
        thresholds: Thresholds,
        operator_email: String,
        store: Arc<dyn PostStore>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            thresholds,
            operator_email,
            store,
            transport,
        }
    }

    /// Run one scored result through the gates and dispatch if eligible.
    ///
    /// Ordering contract: ledger check before any send, ledger append after
    /// ALL sends. Transport errors propagate before the append so the link
    /// stays unmarked and a later run retries it (at-least-once).
    pub async fn process(
        &self,
        source_link: &str,
        result: &ScoredResult,
    ) -> Result<Outcome, DecisionError> {
        if result.status == Status::Failed {
            debug!(source_link, "skipping degraded result");
            return Ok(Outcome::Skipped {
                reason: "scoring degraded",
            });
        }

        let recipients = match evaluate(result, &self.thresholds)? {
            Ok(recipients) => recipients,
            Err(reason) => {
                debug!(source_link, reason, "result not eligible");
                return Ok(Outcome::Skipped { reason });
            }
        };

        if self.store.already_notified(source_link).await? {
            debug!(source_link, "ledger hit, not re-sending");
            return Ok(Outcome::AlreadyNotified);
        }

        let content = result
            .message_content
            .as_ref()
            .ok_or(DecisionError::MissingMessageContent)?;

        for to in &recipients {
            self.transport
                .send(&OutboundMessage {
                    to: to.clone(),
                    subject: content.subject.clone(),
                    body: content.body.clone(),
                })
                .await
                .map_err(DecisionError::Transport)?;
            info!(source_link, to = %to, "application email dispatched");
        }
        self.transport
            .send(&self.confirmation(source_link, result, &recipients))
            .await
            .map_err(DecisionError::Transport)?;

        if !self.store.mark_notified(source_link).await? {
            // Another writer marked it between our check and append.
            warn!(source_link, "ledger already contained link after dispatch");
        }

        Ok(Outcome::Sent { recipients })
    }

    /// Operator copy: what went out, to whom, and which model scored it.
    fn confirmation(
        &self,
        source_link: &str,
        result: &ScoredResult,
        recipients: &[String],
    ) -> OutboundMessage {
        let company = result.company_name.as_deref().unwrap_or("unknown company");
        let model = result.model_name.as_deref().unwrap_or("unknown model");
        OutboundMessage {
            to: self.operator_email.clone(),
            subject: format!("jobscout: applied to {company}"),
            body: format!(
                "Sent to: {}\nPost: {}\nMatch: {} | Gap: {}\nScored by: {}\n",
                recipients.join(", "),
                source_link,
                result.match_percentage,
                result.experience_gap,
                model,
            ),
        }
    }
}
