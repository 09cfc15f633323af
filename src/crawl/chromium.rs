// src/crawl/chromium.rs
//! Real browser session on top of chromiumoxide. The CDP event handler runs
//! on its own task for the session's lifetime; `teardown` closes the browser
//! and aborts it. A persistent user-data directory keeps the credential
//! cookie between runs, so most invocations skip the login form entirely.

use anyhow::{anyhow, bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::wait::{wait_for, WaitPolicy};

const FEED_URL: &str = "https://www.linkedin.com/feed/";
const LOGIN_URL: &str = "https://www.linkedin.com/login";
const SEARCH_URL: &str = "https://www.linkedin.com/search/results/content/";

/// Marker element that only renders for an authenticated session.
const FEED_READY_JS: &str =
    "!!document.querySelector('.scaffold-finite-scroll__content')";

/// Everything currently rendered as a feed/search result card, outer HTML,
/// in page order.
const ENUMERATE_JS: &str = r#"
Array.from(document.querySelectorAll("li.artdeco-card, div.feed-shared-update-v2"))
    .map((e) => e.outerHTML)
"#;

/// One infinite-scroll step: jump to the bottom and press the explicit
/// "show more" button when the page renders one instead of auto-loading.
const PAGINATE_JS: &str = r#"
(() => {
    window.scrollTo(0, document.body.scrollHeight);
    const btn = Array.from(document.querySelectorAll("button"))
        .find((b) => (b.innerText || "").trim().startsWith("Show more results"));
    if (btn) { btn.click(); }
    return document.body.scrollHeight;
})()
"#;

pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    username: String,
    password: String,
    /// Retained so the latest-first sort can re-issue the same search.
    last_query: Option<String>,
    login_timeout: Duration,
    closed: bool,
}

impl ChromiumSession {
    /// Launch a headful Chromium with a persistent profile. Credentials come
    /// from `LINKEDIN_USER` / `LINKEDIN_PASS` and are only used when the
    /// persisted session has expired.
    pub async fn launch(user_data_dir: &str, login_timeout: Duration) -> Result<Self> {
        let username = std::env::var("LINKEDIN_USER").context("LINKEDIN_USER missing")?;
        let password = std::env::var("LINKEDIN_PASS").context("LINKEDIN_PASS missing")?;

        let config = BrowserConfig::builder()
            .user_data_dir(user_data_dir)
            .window_size(1280, 1024)
            .with_head()
            .arg("--disable-blink-features=AutomationControlled")
            .build()
            .map_err(|e| anyhow!("browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launching chromium")?;

        // CDP messages must be pumped for the browser handle to work at all.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("opening initial page")?;

        info!(user_data_dir, "chromium session launched");
        Ok(Self {
            browser,
            handler_task,
            page,
            username,
            password,
            last_query: None,
            login_timeout,
            closed: false,
        })
    }

    async fn feed_is_ready(page: &Page) -> bool {
        matches!(
            page.evaluate(FEED_READY_JS).await.map(|v| v.into_value::<bool>()),
            Ok(Ok(true))
        )
    }

    /// Interactive credential submission on the login form.
    async fn login_with_credentials(&mut self) -> Result<()> {
        self.page
            .goto(LOGIN_URL)
            .await
            .context("navigating to login form")?;

        let policy = WaitPolicy::new(self.login_timeout);
        let page = self.page.clone();
        wait_for(policy, || {
            let page = page.clone();
            async move { page.find_element("#username").await.ok().map(|_| ()) }
        })
        .await
        .context("login form did not render")?;

        let user_field = self
            .page
            .find_element("#username")
            .await
            .context("username field missing")?;
        user_field.click().await?;
        user_field.type_str(&self.username).await?;

        let pass_field = self
            .page
            .find_element("#password")
            .await
            .context("password field missing")?;
        pass_field.click().await?;
        pass_field.type_str(&self.password).await?;

        self.page
            .find_element("button[type=submit]")
            .await
            .context("submit button missing")?
            .click()
            .await?;

        // A challenge page keeps the URL on login/checkpoint; that needs a
        // human and is session-fatal here.
        let page = self.page.clone();
        let landed = wait_for(WaitPolicy::new(self.login_timeout), || {
            let page = page.clone();
            async move {
                let url = page.url().await.ok().flatten()?;
                let blocked = url.contains("/login") || url.contains("checkpoint/challenge");
                (!blocked).then_some(url)
            }
        })
        .await;

        match landed {
            Ok(url) => {
                info!(%url, "credential login succeeded");
                Ok(())
            }
            Err(_) => bail!("login did not complete (possible security challenge)"),
        }
    }
}

#[async_trait::async_trait]
impl super::session::SessionDriver for ChromiumSession {
    async fn authenticate(&mut self) -> Result<()> {
        self.page
            .goto(FEED_URL)
            .await
            .context("navigating to feed")?;

        let policy = WaitPolicy::new(Duration::from_secs(8));
        let page = self.page.clone();
        let persisted = wait_for(policy, || {
            let page = page.clone();
            async move { Self::feed_is_ready(&page).await.then_some(()) }
        })
        .await
        .is_ok();

        if persisted {
            debug!("persisted session still valid, skipping login form");
            return Ok(());
        }
        warn!("persisted session expired, submitting credentials");
        self.login_with_credentials().await
    }

    async fn submit_query(&mut self, text: &str) -> Result<()> {
        let url = format!("{SEARCH_URL}?keywords={}", urlencoding::encode(text));
        self.page
            .goto(url.as_str())
            .await
            .with_context(|| format!("navigating to search for '{text}'"))?;
        self.last_query = Some(text.to_string());
        Ok(())
    }

    async fn apply_latest_sort(&mut self) -> Result<()> {
        let text = self
            .last_query
            .as_deref()
            .ok_or_else(|| anyhow!("latest sort requested before any query"))?;
        // Sort is a URL parameter on this surface, not a widget interaction.
        let url = format!(
            "{SEARCH_URL}?keywords={}&sortBy=%22date_posted%22",
            urlencoding::encode(text)
        );
        self.page
            .goto(url.as_str())
            .await
            .context("navigating to date-sorted results")?;
        Ok(())
    }

    async fn trigger_pagination_step(&mut self) -> Result<()> {
        self.page
            .evaluate(PAGINATE_JS)
            .await
            .context("running pagination script")?;
        Ok(())
    }

    async fn enumerate_visible_records(&mut self) -> Result<Vec<String>> {
        let fragments: Vec<String> = self
            .page
            .evaluate(ENUMERATE_JS)
            .await
            .context("enumerating result cards")?
            .into_value()
            .context("decoding result cards")?;
        Ok(fragments)
    }

    async fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.browser.close().await {
            warn!(error = ?e, "browser close failed, aborting handler anyway");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!("chromium session torn down");
        Ok(())
    }
}
