// src/crawl/session.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use super::types::PostRecord;

/// Seam for the browser/session collaborator. One implementation drives a real
/// Chromium instance (`crawl::chromium`); tests substitute scripted fakes.
///
/// The session is exclusive and stateful: exactly one crawl drives it at a
/// time, and `teardown` must run on completion or any fatal error.
#[async_trait::async_trait]
pub trait SessionDriver: Send {
    /// Authenticate once per crawl invocation. Reuses a persisted credential
    /// token when valid, otherwise performs interactive credential submission.
    /// Failure here is session-fatal.
    async fn authenticate(&mut self) -> Result<()>;

    /// Submit the query text and wait for result fragments to be present.
    async fn submit_query(&mut self, text: &str) -> Result<()>;

    /// Apply the "most recent first" filter to the current results.
    async fn apply_latest_sort(&mut self) -> Result<()>;

    /// Trigger one append-at-bottom pagination step (infinite scroll).
    async fn trigger_pagination_step(&mut self) -> Result<()>;

    /// All currently visible result fragments, in page order. Fragments are
    /// opaque to the engine; extraction turns them into records.
    async fn enumerate_visible_records(&mut self) -> Result<Vec<String>>;

    /// Guaranteed cleanup; idempotent.
    async fn teardown(&mut self) -> Result<()>;
}

/// Pure, stateless extraction of one page fragment into a post record.
/// `None` means the fragment is not a usable post (missing text container).
pub trait FragmentExtractor: Send + Sync {
    fn extract(&self, fragment: &str, now: DateTime<Utc>) -> Option<PostRecord>;
}
