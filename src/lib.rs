// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod crawl;
pub mod decide;
pub mod dedup;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod score;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, SearchDocument};
pub use crate::pipeline::{Pipeline, RunSummary};
pub use crate::query::{compile, SearchQuery};
