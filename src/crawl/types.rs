// src/crawl/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One accepted feed post. `source_link` is the natural key used for dedup
/// everywhere (cache, store, notification ledger). Immutable once yielded by
/// the crawl engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub source_link: String,
    pub author_name: Option<String>,
    pub profile_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub hashtags: BTreeSet<String>,
    pub reaction_count: Option<u32>,
    pub comment_count: Option<u32>,
    /// The compiled query this record was observed under; tagged by the
    /// crawl engine, empty until then.
    #[serde(default)]
    pub query: String,
}
