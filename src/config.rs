// src/config.rs
//! Runtime configuration: the search-configuration document (boolean-group
//! tree), model pool, thresholds and crawl knobs. Everything the core logic
//! consumes is supplied from here, nothing is hardcoded downstream.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::score::pool::ModelDescriptor;

const ENV_SEARCHES_PATH: &str = "JOBSCOUT_SEARCHES_PATH";
const ENV_CONFIG_PATH: &str = "JOBSCOUT_CONFIG_PATH";

// ---------------------------------------------------------------------------
// Search-configuration document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SearchDocument {
    pub searches: Vec<SearchSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSpec {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub parameters: Option<SearchParameters>,
    /// No `locations` list means one query per sort flag, unqualified.
    pub locations: Option<Vec<String>>,
    #[serde(default)]
    pub industries: Vec<String>,
    /// 0 → [false], 1 → [true], 2 → [false, true]; anything else → [false].
    #[serde(default)]
    pub sort_by_latest_option: u8,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParameters {
    #[serde(default)]
    pub includes: TermSet,
    #[serde(default)]
    pub excludes: TermSet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TermSet {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exact_phrases: Vec<String>,
    #[serde(default)]
    pub groups: Vec<BoolGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoolGroup {
    /// Joining operator, e.g. "OR" / "AND".
    pub operator: String,
    pub terms: Vec<GroupTerm>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GroupTerm {
    Word(String),
    Nested { group: BoolGroup },
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    10
}

impl SearchDocument {
    /// Fail-fast validation: every search needs a `name` and a `parameters`
    /// section. Runs before any query is compiled or executed.
    pub fn validate(&self) -> Result<()> {
        for (idx, search) in self.searches.iter().enumerate() {
            let name = search.name.as_deref().unwrap_or_default();
            if name.trim().is_empty() {
                bail!("search #{idx} is missing a 'name' field");
            }
            if search.parameters.is_none() {
                bail!("search '{name}' is missing its 'parameters' section");
            }
        }
        Ok(())
    }
}

/// Load the search document from an explicit path. Supports TOML or JSON.
pub fn load_searches_from(path: &Path) -> Result<SearchDocument> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading search config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let doc = parse_searches(&content, ext.as_str())?;
    doc.validate()?;
    Ok(doc)
}

/// Load the search document using env var + fallbacks:
/// 1) $JOBSCOUT_SEARCHES_PATH
/// 2) config/searches.toml
/// 3) config/searches.json
pub fn load_searches_default() -> Result<SearchDocument> {
    if let Ok(p) = std::env::var(ENV_SEARCHES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_searches_from(&pb);
        }
        return Err(anyhow!("JOBSCOUT_SEARCHES_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/searches.toml");
    if toml_p.exists() {
        return load_searches_from(&toml_p);
    }
    let json_p = PathBuf::from("config/searches.json");
    if json_p.exists() {
        return load_searches_from(&json_p);
    }
    bail!("no search configuration found (config/searches.toml or .json)")
}

fn parse_searches(s: &str, hint_ext: &str) -> Result<SearchDocument> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing JSON search config");
    }
    // TOML first, JSON as fallback for extensionless paths.
    match toml::from_str(s) {
        Ok(doc) => Ok(doc),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported search config format: {toml_err}")),
    }
}

// ---------------------------------------------------------------------------
// App-level settings (thresholds, crawl knobs, model pool)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub crawl: CrawlConfig,
    /// Ordered failover pool; rotation starts at the first entry.
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    #[serde(default)]
    pub profile: ProfileConfig,
    pub notify: NotifyConfig,
}

/// The fixed profile posts are scored against.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_resume_path")]
    pub resume_path: String,
    #[serde(default = "default_message_template_path")]
    pub message_template_path: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            resume_path: default_resume_path(),
            message_template_path: default_message_template_path(),
        }
    }
}

fn default_resume_path() -> String {
    "config/resume.txt".to_string()
}

fn default_message_template_path() -> String {
    "config/message.txt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Eligible strictly above this value.
    #[serde(default = "default_match_cutoff")]
    pub match_percentage_cutoff: f64,
    /// Eligible strictly below this value.
    #[serde(default = "default_gap_cutoff")]
    pub experience_gap_cutoff: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            match_percentage_cutoff: default_match_cutoff(),
            experience_gap_cutoff: default_gap_cutoff(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Posts older than this are discarded and stop their query.
    #[serde(default = "default_max_post_age_weeks")]
    pub max_post_age_weeks: i64,
    /// Capacity of the in-session FIFO dedup cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Stagnation limit: consecutive pagination steps with no new records.
    #[serde(default = "default_max_scroll_attempts")]
    pub max_scroll_attempts: u32,
    /// Fixed settle delay after each pagination trigger.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Bounded wait for search results to appear.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    /// Inter-record delay to avoid upstream throttling.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    /// Persistent browser profile; keeps the credential cookie across runs.
    #[serde(default = "default_browser_profile_dir")]
    pub browser_profile_dir: String,
    /// Bounded wait for the interactive login flow.
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_post_age_weeks: default_max_post_age_weeks(),
            cache_capacity: default_cache_capacity(),
            max_scroll_attempts: default_max_scroll_attempts(),
            settle_ms: default_settle_ms(),
            search_timeout_secs: default_search_timeout_secs(),
            rate_limit_ms: default_rate_limit_ms(),
            browser_profile_dir: default_browser_profile_dir(),
            login_timeout_secs: default_login_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Confirmation copies go here, one per dispatched batch.
    pub operator_email: String,
    pub from_email: String,
}

fn default_db_path() -> String {
    "data/jobscout.db".to_string()
}
fn default_match_cutoff() -> f64 {
    68.0
}
fn default_gap_cutoff() -> f64 {
    1.0
}
fn default_max_post_age_weeks() -> i64 {
    10
}
fn default_cache_capacity() -> usize {
    10
}
fn default_max_scroll_attempts() -> u32 {
    15
}
fn default_settle_ms() -> u64 {
    2_500
}
fn default_search_timeout_secs() -> u64 {
    20
}
fn default_rate_limit_ms() -> u64 {
    2_000
}
fn default_browser_profile_dir() -> String {
    "data/browser-profile".to_string()
}
fn default_login_timeout_secs() -> u64 {
    45
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content).context("parsing app config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// $JOBSCOUT_CONFIG_PATH, falling back to config/jobscout.toml.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/jobscout.toml"));
        Self::load_from(&path)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("model pool is empty; at least one backend is required");
        }
        if self.crawl.max_post_age_weeks <= 0 {
            bail!("crawl.max_post_age_weeks must be positive");
        }
        Ok(())
    }

    pub fn max_post_age(&self) -> chrono::Duration {
        chrono::Duration::weeks(self.crawl.max_post_age_weeks)
    }
}
