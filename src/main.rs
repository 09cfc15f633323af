//! jobscout — binary entrypoint.
//! Wires config, the SQLite store, the LLM scoring backend, SMTP notification
//! and a Chromium session into one pipeline run.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobscout::config::{self, AppConfig};
use jobscout::crawl::chromium::ChromiumSession;
use jobscout::crawl::extract::HtmlExtractor;
use jobscout::notify::email::EmailSender;
use jobscout::pipeline::Pipeline;
use jobscout::score::providers::{LlmBackend, ScoreProfile};
use jobscout::store::SqliteStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobscout=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the vars come from the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading app config")?;
    let searches = config::load_searches_default().context("loading search config")?;

    if let Some(parent) = Path::new(&cfg.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data dir {}", parent.display()))?;
    }
    let store = Arc::new(
        SqliteStore::connect(&cfg.db_path)
            .await
            .context("opening sqlite store")?,
    );

    let profile = ScoreProfile::load(&cfg.profile).context("loading scoring profile")?;
    let backend = Arc::new(LlmBackend::new(profile)?);
    let transport = Arc::new(EmailSender::from_env(&cfg.notify.from_email)?);

    let mut session = ChromiumSession::launch(
        &cfg.crawl.browser_profile_dir,
        Duration::from_secs(cfg.crawl.login_timeout_secs),
    )
    .await
    .context("launching browser session")?;

    let pipeline = Pipeline::new(cfg, Arc::new(HtmlExtractor), store, backend, transport);
    let summary = pipeline.run(&mut session, &searches).await?;

    tracing::info!(
        queries = summary.queries,
        accepted = summary.accepted,
        sent = summary.sent,
        already_notified = summary.already_notified,
        errors = summary.errors,
        "jobscout run complete"
    );
    Ok(())
}
