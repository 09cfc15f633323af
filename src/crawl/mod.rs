// src/crawl/mod.rs
//! # Crawl Engine
//! Drives one browser session through compiled queries and yields accepted
//! post records lazily: nothing is paginated until the consumer pulls. Each
//! query runs a four-phase machine (searching, sorting, loading, done) with
//! three independent stop conditions — result budget, post-age cutoff, and
//! pagination stagnation.

pub mod chromium;
pub mod extract;
pub mod session;
pub mod types;
pub mod wait;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::dedup::RecentLinkCache;
use crate::query::SearchQuery;
use crate::store::PostStore;
use session::{FragmentExtractor, SessionDriver};
use types::PostRecord;
use wait::{wait_for_with, WaitPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Searching,
    Sorting,
    Loading,
    Done,
}

/// Why a query crawl stopped loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Accepted-record budget reached.
    Budget,
    /// A record older than the configured cutoff appeared; under latest-first
    /// ordering everything after it is older still.
    AgeCutoff,
    /// Too many consecutive pagination steps yielded no new fragments.
    Stagnation,
}

pub struct CrawlEngine {
    config: CrawlConfig,
    max_post_age: chrono::Duration,
    extractor: Arc<dyn FragmentExtractor>,
    store: Arc<dyn PostStore>,
}

impl CrawlEngine {
    pub fn new(
        config: CrawlConfig,
        max_post_age: chrono::Duration,
        extractor: Arc<dyn FragmentExtractor>,
        store: Arc<dyn PostStore>,
    ) -> Self {
        Self {
            config,
            max_post_age,
            extractor,
            store,
        }
    }

    /// Begin a crawl for one compiled query. Lazy: no page interaction happens
    /// until the first `next()` call on the returned crawl.
    pub fn start_query<'d>(
        &self,
        driver: &'d mut dyn SessionDriver,
        query: SearchQuery,
    ) -> QueryCrawl<'d> {
        QueryCrawl {
            driver,
            extractor: Arc::clone(&self.extractor),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            max_post_age: self.max_post_age,
            cache: RecentLinkCache::new(self.config.cache_capacity),
            query,
            phase: Phase::Searching,
            pending: VecDeque::new(),
            fragments_seen: 0,
            accepted: 0,
            stagnant_steps: 0,
            stop_reason: None,
        }
    }
}

/// In-flight crawl of a single query. Pull `next()` until it returns
/// `Ok(None)`; `stop_reason()` then says which condition ended it.
pub struct QueryCrawl<'d> {
    driver: &'d mut dyn SessionDriver,
    extractor: Arc<dyn FragmentExtractor>,
    store: Arc<dyn PostStore>,
    config: CrawlConfig,
    max_post_age: chrono::Duration,
    cache: RecentLinkCache,
    query: SearchQuery,
    phase: Phase,
    pending: VecDeque<PostRecord>,
    /// Fragments already processed; new ones are everything past this index.
    fragments_seen: usize,
    accepted: usize,
    stagnant_steps: u32,
    stop_reason: Option<StopReason>,
}

impl QueryCrawl<'_> {
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Yield the next accepted record, loading more of the page only when the
    /// buffered ones run out. `Ok(None)` is terminal.
    pub async fn next(&mut self) -> Result<Option<PostRecord>> {
        loop {
            if self.phase != Phase::Done && self.accepted >= self.query.max_results {
                self.finish(StopReason::Budget);
                return Ok(None);
            }
            if let Some(record) = self.pending.pop_front() {
                self.accepted += 1;
                counter!("crawl_records_accepted_total").increment(1);
                return Ok(Some(record));
            }
            match self.phase {
                Phase::Searching => self.run_search().await?,
                Phase::Sorting => self.apply_sort().await?,
                Phase::Loading => self.load_more().await?,
                Phase::Done => return Ok(None),
            }
        }
    }

    async fn run_search(&mut self) -> Result<()> {
        self.driver
            .submit_query(&self.query.text)
            .await
            .with_context(|| format!("submitting query '{}'", self.query.text))?;

        // Results render asynchronously; bound the wait instead of trusting
        // navigation completion.
        let policy = WaitPolicy::new(Duration::from_secs(self.config.search_timeout_secs));
        let first = wait_for_with(policy, &mut *self.driver, |driver| {
            Box::pin(async move {
                match driver.enumerate_visible_records().await {
                    Ok(fragments) if !fragments.is_empty() => Some(()),
                    _ => None,
                }
            })
        })
        .await;

        match first {
            Ok(()) => {
                debug!(query = %self.query.text, "search results present");
                self.phase = if self.query.sort_by_latest {
                    Phase::Sorting
                } else {
                    Phase::Loading
                };
            }
            Err(timeout) => {
                // Abandons only this query; the session moves on to the next.
                warn!(query = %self.query.text, %timeout, "no results within wait budget");
                self.phase = Phase::Done;
            }
        }
        Ok(())
    }

    async fn apply_sort(&mut self) -> Result<()> {
        self.driver
            .apply_latest_sort()
            .await
            .context("applying latest-first sort")?;
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        self.phase = Phase::Loading;
        Ok(())
    }

    /// One load step: paginate (except on the very first fill), let the page
    /// settle, then ingest every fragment not yet seen.
    async fn load_more(&mut self) -> Result<()> {
        if self.fragments_seen > 0 || self.stagnant_steps > 0 {
            self.driver
                .trigger_pagination_step()
                .await
                .context("triggering pagination")?;
            counter!("crawl_pagination_steps_total").increment(1);
            tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        }

        let fragments = self
            .driver
            .enumerate_visible_records()
            .await
            .context("enumerating result fragments")?;

        if fragments.len() <= self.fragments_seen {
            self.stagnant_steps += 1;
            debug!(
                query = %self.query.text,
                stagnant = self.stagnant_steps,
                "pagination step yielded nothing new"
            );
            if self.stagnant_steps >= self.config.max_scroll_attempts {
                self.finish(StopReason::Stagnation);
            }
            return Ok(());
        }
        self.stagnant_steps = 0;

        let now = Utc::now();
        let new_fragments = fragments[self.fragments_seen..].to_vec();
        self.fragments_seen = fragments.len();

        for fragment in &new_fragments {
            if self.phase == Phase::Done {
                break;
            }
            self.consider(fragment, now).await?;
        }
        Ok(())
    }

    /// Rejection gates in fixed order: parse, usable text, contact email,
    /// age, session cache, persistent store.
    async fn consider(&mut self, fragment: &str, now: chrono::DateTime<Utc>) -> Result<()> {
        let Some(mut record) = self.extractor.extract(fragment, now) else {
            self.reject("unparsed");
            return Ok(());
        };
        if record.text.trim().is_empty() {
            self.reject("empty_text");
            return Ok(());
        }
        if !extract::contains_email(&record.text) {
            self.reject("no_email");
            return Ok(());
        }
        if now.signed_duration_since(record.published_at) > self.max_post_age {
            self.reject("stale");
            self.finish(StopReason::AgeCutoff);
            return Ok(());
        }
        if self.cache.contains(&record.source_link) {
            self.reject("cache_duplicate");
            return Ok(());
        }
        if self.store.exists(&record.source_link).await? {
            self.reject("store_duplicate");
            return Ok(());
        }
        // Only accepted records enter the cache.
        self.cache.insert(record.source_link.clone());

        record.query = self.query.text.clone();
        self.pending.push_back(record);
        Ok(())
    }

    fn reject(&self, reason: &'static str) {
        counter!("crawl_records_rejected_total", "reason" => reason).increment(1);
        debug!(query = %self.query.text, reason, "fragment rejected");
    }

    fn finish(&mut self, reason: StopReason) {
        if self.phase != Phase::Done {
            info!(
                query = %self.query.text,
                accepted = self.accepted,
                reason = ?reason,
                "query crawl finished"
            );
            self.phase = Phase::Done;
            self.stop_reason = Some(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::{DateTime, Duration as ChronoDuration};

    /// Scripted driver: each pagination step reveals the next batch of
    /// fragments, cumulatively, the way an infinite-scroll page does.
    struct ScriptedDriver {
        batches: Vec<Vec<String>>,
        revealed: usize,
        pagination_calls: u32,
        sort_calls: u32,
    }

    impl ScriptedDriver {
        fn new(batches: Vec<Vec<String>>) -> Self {
            let revealed = batches.len().min(1);
            Self {
                batches,
                revealed,
                pagination_calls: 0,
                sort_calls: 0,
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionDriver for ScriptedDriver {
        async fn authenticate(&mut self) -> Result<()> {
            Ok(())
        }
        async fn submit_query(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn apply_latest_sort(&mut self) -> Result<()> {
            self.sort_calls += 1;
            Ok(())
        }
        async fn trigger_pagination_step(&mut self) -> Result<()> {
            self.pagination_calls += 1;
            if self.revealed < self.batches.len() {
                self.revealed += 1;
            }
            Ok(())
        }
        async fn enumerate_visible_records(&mut self) -> Result<Vec<String>> {
            Ok(self.batches[..self.revealed].concat())
        }
        async fn teardown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Fragments are "link|age_hours|text" triples; no HTML involved.
    struct PlainExtractor;

    impl FragmentExtractor for PlainExtractor {
        fn extract(&self, fragment: &str, now: DateTime<Utc>) -> Option<PostRecord> {
            let mut parts = fragment.splitn(3, '|');
            let link = parts.next()?.to_string();
            let age_hours: i64 = parts.next()?.parse().ok()?;
            let text = parts.next()?.to_string();
            Some(PostRecord {
                source_link: link,
                author_name: None,
                profile_url: None,
                published_at: now - ChronoDuration::hours(age_hours),
                text,
                hashtags: Default::default(),
                reaction_count: None,
                comment_count: None,
                query: String::new(),
            })
        }
    }

    fn fragment(link: &str, age_hours: i64) -> String {
        format!("{link}|{age_hours}|hiring, write to hr@acme.io")
    }

    fn fast_config() -> CrawlConfig {
        CrawlConfig {
            max_post_age_weeks: 10,
            cache_capacity: 10,
            max_scroll_attempts: 3,
            settle_ms: 0,
            search_timeout_secs: 1,
            rate_limit_ms: 0,
            browser_profile_dir: "unused".into(),
            login_timeout_secs: 1,
        }
    }

    async fn engine() -> CrawlEngine {
        let store = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
        CrawlEngine::new(
            fast_config(),
            ChronoDuration::weeks(10),
            Arc::new(PlainExtractor),
            store,
        )
    }

    fn query(max_results: usize, sort_by_latest: bool) -> SearchQuery {
        SearchQuery {
            text: "rust AND hiring".into(),
            max_results,
            sort_by_latest,
        }
    }

    async fn drain(crawl: &mut QueryCrawl<'_>) -> Vec<PostRecord> {
        let mut out = Vec::new();
        while let Some(record) = crawl.next().await.unwrap() {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn budget_stops_the_crawl() {
        let eng = engine().await;
        let mut driver = ScriptedDriver::new(vec![
            vec![fragment("https://x/1", 1), fragment("https://x/2", 1)],
            vec![fragment("https://x/3", 1), fragment("https://x/4", 1)],
        ]);
        let mut crawl = eng.start_query(&mut driver, query(3, false));
        let records = drain(&mut crawl).await;
        assert_eq!(records.len(), 3);
        assert_eq!(crawl.stop_reason(), Some(StopReason::Budget));
    }

    #[tokio::test]
    async fn stale_record_is_discarded_and_ends_the_query() {
        let eng = engine().await;
        // Third record is ~11 weeks old.
        let mut driver = ScriptedDriver::new(vec![vec![
            fragment("https://x/1", 1),
            fragment("https://x/2", 2),
            fragment("https://x/3", 24 * 7 * 11),
            fragment("https://x/4", 1),
        ]]);
        let mut crawl = eng.start_query(&mut driver, query(50, false));
        let records = drain(&mut crawl).await;
        let links: Vec<_> = records.iter().map(|r| r.source_link.as_str()).collect();
        assert_eq!(links, vec!["https://x/1", "https://x/2"]);
        assert_eq!(crawl.stop_reason(), Some(StopReason::AgeCutoff));
    }

    #[tokio::test]
    async fn stagnation_ends_the_query_after_max_attempts() {
        let eng = engine().await;
        let mut driver = ScriptedDriver::new(vec![vec![fragment("https://x/1", 1)]]);
        let mut crawl = eng.start_query(&mut driver, query(50, false));
        let records = drain(&mut crawl).await;
        assert_eq!(records.len(), 1);
        assert_eq!(crawl.stop_reason(), Some(StopReason::Stagnation));
        // Page never grew, so every attempt after the first fill stagnated.
        assert_eq!(driver.pagination_calls, 3);
    }

    #[tokio::test]
    async fn duplicate_links_within_a_session_yield_once() {
        let eng = engine().await;
        let mut driver = ScriptedDriver::new(vec![
            vec![fragment("https://x/1", 1)],
            vec![fragment("https://x/1", 1), fragment("https://x/2", 1)],
        ]);
        let mut crawl = eng.start_query(&mut driver, query(50, false));
        let records = drain(&mut crawl).await;
        let links: Vec<_> = records.iter().map(|r| r.source_link.as_str()).collect();
        assert_eq!(links, vec!["https://x/1", "https://x/2"]);
    }

    #[tokio::test]
    async fn records_known_to_the_store_are_skipped() {
        let store = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
        let known = PlainExtractor
            .extract(&fragment("https://x/old", 1), Utc::now())
            .unwrap();
        store.insert_post(&known).await.unwrap();

        let eng = CrawlEngine::new(
            fast_config(),
            ChronoDuration::weeks(10),
            Arc::new(PlainExtractor),
            store,
        );
        let mut driver = ScriptedDriver::new(vec![vec![
            fragment("https://x/old", 1),
            fragment("https://x/new", 1),
        ]]);
        let mut crawl = eng.start_query(&mut driver, query(50, false));
        let records = drain(&mut crawl).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_link, "https://x/new");
    }

    /// Store that records which links were asked about.
    struct SpyStore {
        known: std::collections::HashSet<String>,
        exists_queries: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PostStore for SpyStore {
        async fn exists(&self, source_link: &str) -> Result<bool, crate::store::StoreError> {
            self.exists_queries
                .lock()
                .unwrap()
                .push(source_link.to_string());
            Ok(self.known.contains(source_link))
        }
        async fn insert_post(&self, _record: &PostRecord) -> Result<i64, crate::store::StoreError> {
            Ok(1)
        }
        async fn insert_scores(
            &self,
            _post_id: i64,
            _results: &[crate::score::types::ScoredResult],
        ) -> Result<(), crate::store::StoreError> {
            Ok(())
        }
        async fn already_notified(&self, _source_link: &str) -> Result<bool, crate::store::StoreError> {
            Ok(false)
        }
        async fn mark_notified(&self, _source_link: &str) -> Result<bool, crate::store::StoreError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn store_duplicates_stay_out_of_the_cache() {
        // A store-known link showing up again must hit the store again, not
        // the session cache: only accepted records are cached.
        let store = Arc::new(SpyStore {
            known: std::iter::once("https://x/old".to_string()).collect(),
            exists_queries: std::sync::Mutex::new(Vec::new()),
        });
        let eng = CrawlEngine::new(
            fast_config(),
            ChronoDuration::weeks(10),
            Arc::new(PlainExtractor),
            store.clone(),
        );
        let mut driver = ScriptedDriver::new(vec![
            vec![fragment("https://x/old", 1)],
            vec![fragment("https://x/old", 1), fragment("https://x/new", 1)],
        ]);
        let mut crawl = eng.start_query(&mut driver, query(50, false));
        let records = drain(&mut crawl).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_link, "https://x/new");

        let queried: Vec<String> = store.exists_queries.lock().unwrap().clone();
        let old_lookups = queried.iter().filter(|l| *l == "https://x/old").count();
        assert_eq!(old_lookups, 2);
    }

    #[tokio::test]
    async fn records_without_email_are_rejected() {
        let eng = engine().await;
        let mut driver = ScriptedDriver::new(vec![vec![
            "https://x/1|1|we are hiring, DM me".to_string(),
            fragment("https://x/2", 1),
        ]]);
        let mut crawl = eng.start_query(&mut driver, query(50, false));
        let records = drain(&mut crawl).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_link, "https://x/2");
    }

    #[tokio::test]
    async fn latest_sort_is_applied_exactly_once_when_flagged() {
        let eng = engine().await;
        let mut driver = ScriptedDriver::new(vec![vec![fragment("https://x/1", 1)]]);
        let mut crawl = eng.start_query(&mut driver, query(1, true));
        drain(&mut crawl).await;
        assert_eq!(driver.sort_calls, 1);

        let mut driver = ScriptedDriver::new(vec![vec![fragment("https://x/1", 1)]]);
        let mut crawl = eng.start_query(&mut driver, query(1, false));
        drain(&mut crawl).await;
        assert_eq!(driver.sort_calls, 0);
    }

    #[tokio::test]
    async fn records_are_tagged_with_their_query() {
        let eng = engine().await;
        let mut driver = ScriptedDriver::new(vec![vec![fragment("https://x/1", 1)]]);
        let mut crawl = eng.start_query(&mut driver, query(1, false));
        let records = drain(&mut crawl).await;
        assert_eq!(records[0].query, "rust AND hiring");
    }
}
