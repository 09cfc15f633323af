// src/pipeline.rs
//! End-to-end orchestration: compile queries, authenticate one session, crawl
//! each query lazily, score accepted records with failover, and hand every
//! scored role to the decision engine. Per-query and per-record failures are
//! contained; only authentication is run-fatal. Session teardown is
//! unconditional.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{AppConfig, SearchDocument};
use crate::crawl::session::{FragmentExtractor, SessionDriver};
use crate::crawl::types::PostRecord;
use crate::crawl::CrawlEngine;
use crate::decide::{DecisionEngine, Outcome};
use crate::notify::NotificationTransport;
use crate::query::{self, SearchQuery};
use crate::score::pool::ModelPool;
use crate::score::providers::ScoreBackend;
use crate::score::score_with_failover;
use crate::score::types::ScoringRequest;
use crate::store::{PostStore, StoreError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub queries: usize,
    pub accepted: u64,
    pub sent: u64,
    pub already_notified: u64,
    /// Skip counts keyed by the decision engine's stable reason strings.
    pub skipped: BTreeMap<String, u64>,
    pub errors: u64,
}

pub struct Pipeline {
    config: AppConfig,
    engine: CrawlEngine,
    pool: ModelPool,
    backend: Arc<dyn ScoreBackend>,
    store: Arc<dyn PostStore>,
    decider: DecisionEngine,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        extractor: Arc<dyn FragmentExtractor>,
        store: Arc<dyn PostStore>,
        backend: Arc<dyn ScoreBackend>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        let engine = CrawlEngine::new(
            config.crawl.clone(),
            config.max_post_age(),
            extractor,
            Arc::clone(&store),
        );
        let pool = ModelPool::new(config.models.clone());
        let decider = DecisionEngine::new(
            config.thresholds.clone(),
            config.notify.operator_email.clone(),
            Arc::clone(&store),
            transport,
        );
        Self {
            config,
            engine,
            pool,
            backend,
            store,
            decider,
        }
    }

    /// Run the whole pipeline over one authenticated session. The driver is
    /// torn down whatever happens inside.
    pub async fn run(
        &self,
        driver: &mut dyn SessionDriver,
        doc: &SearchDocument,
    ) -> Result<RunSummary> {
        let outcome = self.run_session(driver, doc).await;
        if let Err(e) = driver.teardown().await {
            warn!(error = ?e, "session teardown failed");
        }
        outcome
    }

    async fn run_session(
        &self,
        driver: &mut dyn SessionDriver,
        doc: &SearchDocument,
    ) -> Result<RunSummary> {
        let queries = query::compile(doc).context("compiling search queries")?;
        let mut summary = RunSummary {
            queries: queries.len(),
            ..Default::default()
        };
        if queries.is_empty() {
            warn!("no enabled searches, nothing to crawl");
            return Ok(summary);
        }

        driver.authenticate().await.context("session authentication")?;

        for query in queries {
            if let Err(e) = self.run_query(driver, &query, &mut summary).await {
                // Contained: one broken query page must not sink the rest.
                error!(query = %query.text, error = ?e, "query crawl aborted");
                summary.errors += 1;
            }
        }

        info!(
            queries = summary.queries,
            accepted = summary.accepted,
            sent = summary.sent,
            errors = summary.errors,
            "pipeline run finished"
        );
        Ok(summary)
    }

    async fn run_query(
        &self,
        driver: &mut dyn SessionDriver,
        query: &SearchQuery,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut crawl = self.engine.start_query(driver, query.clone());
        while let Some(record) = crawl.next().await? {
            summary.accepted += 1;
            self.handle_record(&record, summary).await;
            if self.config.crawl.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.crawl.rate_limit_ms)).await;
            }
        }
        Ok(())
    }

    async fn handle_record(&self, record: &PostRecord, summary: &mut RunSummary) {
        let post_id = match self.store.insert_post(record).await {
            Ok(id) => id,
            Err(StoreError::Duplicate(link)) => {
                // The crawl already filters known links; a race can still
                // surface one here.
                warn!(source_link = %link, "record raced into the store, skipping");
                return;
            }
            Err(e) => {
                error!(source_link = %record.source_link, error = ?e, "persisting record failed");
                summary.errors += 1;
                return;
            }
        };

        let request = ScoringRequest {
            source_link: record.source_link.clone(),
            query: record.query.clone(),
            post_text: record.text.clone(),
        };
        let results = score_with_failover(&self.pool, self.backend.as_ref(), &request).await;

        if let Err(e) = self.store.insert_scores(post_id, &results).await {
            // Scores are audit data; notification still proceeds.
            error!(source_link = %record.source_link, error = ?e, "persisting scores failed");
            summary.errors += 1;
        }

        for result in &results {
            match self.decider.process(&record.source_link, result).await {
                Ok(Outcome::Sent { recipients }) => {
                    info!(
                        source_link = %record.source_link,
                        recipients = recipients.len(),
                        "notification batch dispatched"
                    );
                    summary.sent += 1;
                }
                Ok(Outcome::AlreadyNotified) => summary.already_notified += 1,
                Ok(Outcome::Skipped { reason }) => {
                    *summary.skipped.entry(reason.to_string()).or_insert(0) += 1;
                }
                Err(e) => {
                    error!(source_link = %record.source_link, error = ?e, "decision failed");
                    summary.errors += 1;
                }
            }
        }
    }
}
