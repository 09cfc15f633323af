// src/crawl/extract.rs
//! Fragment → `PostRecord`. Pure parsing of one result fragment (outer HTML
//! of a feed card). Selector-based, tolerant: optional parts degrade to
//! `None`, but a fragment without a text container is not a post.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::debug;

use super::session::FragmentExtractor;
use super::types::PostRecord;

static SEL_AUTHOR_SECTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="update-components-actor"]"#).expect("selector"));
static SEL_AUTHOR_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"span[dir="ltr"] span[aria-hidden="true"]"#).expect("selector"));
static SEL_PROFILE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[class*="update-components-actor__meta-link"]"#).expect("selector"));
static SEL_DATE_HIDDEN: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"span[class*="update-components-actor__sub-description"] span.visually-hidden"#,
    )
    .expect("selector")
});
static SEL_LINK_WRAPPER: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div.update-components-update-v2__link-wrapper a[href]"#).expect("selector")
});
static SEL_URN_CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-urn]"#).expect("selector"));
static SEL_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="update-components-text"]"#).expect("selector"));
static SEL_HASHTAG: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="/hashtag/"]"#).expect("selector"));
static SEL_REACTIONS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"span[class*="social-details-social-counts__reactions-count"]"#)
        .expect("selector")
});
static SEL_COMMENTS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"button[aria-label*="comment"]"#).expect("selector")
});

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9!#$%&'*+/=?^_`{|}~.-]+@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}\b")
        .expect("email regex")
});

static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(years?|yrs?|y|months?|mo|weeks?|wks?|w|days?|d|hours?|hrs?|h|minutes?|mins?|m)\b")
        .expect("relative time regex")
});

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

static RE_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d,]+").expect("count regex"));

/// True if the text contains a plausible contact email address.
pub fn contains_email(text: &str) -> bool {
    RE_EMAIL.is_match(text)
}

/// All email-looking substrings in document order.
pub fn find_emails(text: &str) -> Vec<String> {
    RE_EMAIL
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Convert a relative timestamp ("3w", "2 hours ago") to an absolute instant.
/// Unparseable input resolves to `now`, matching the tolerant behavior of the
/// feed (a fresh-looking post is better than a dropped one).
pub fn parse_relative_timestamp(s: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(caps) = RE_RELATIVE.captures(s) else {
        debug!(input = s, "no relative time found, defaulting to now");
        return now;
    };
    let value: i64 = caps[1].parse().unwrap_or(0);
    let unit = caps[2].to_ascii_lowercase();
    let delta = if unit.starts_with('y') {
        Duration::days(value * 365)
    } else if unit.starts_with("mo") {
        Duration::days(value * 30)
    } else if unit.starts_with('w') {
        Duration::weeks(value)
    } else if unit.starts_with('d') {
        Duration::days(value)
    } else if unit.starts_with('h') {
        Duration::hours(value)
    } else {
        Duration::minutes(value)
    };
    now - delta
}

fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}

fn first_count(s: &str) -> Option<u32> {
    RE_COUNT
        .find(s)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Selector-based extractor for feed result fragments.
#[derive(Debug, Default)]
pub struct HtmlExtractor;

impl FragmentExtractor for HtmlExtractor {
    fn extract(&self, fragment: &str, now: DateTime<Utc>) -> Option<PostRecord> {
        let doc = Html::parse_fragment(fragment);

        // Text container is mandatory; everything else degrades gracefully.
        let text = doc
            .select(&SEL_TEXT)
            .next()
            .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))?;

        let author_section = doc.select(&SEL_AUTHOR_SECTION).next();

        let author_name = author_section
            .and_then(|sec| sec.select(&SEL_AUTHOR_NAME).next())
            .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|s| !s.is_empty());

        let profile_url = author_section
            .and_then(|sec| sec.select(&SEL_PROFILE_LINK).next())
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string);

        let published_at = author_section
            .and_then(|sec| sec.select(&SEL_DATE_HIDDEN).next())
            .map(|el| parse_relative_timestamp(&el.text().collect::<Vec<_>>().join(" "), now))
            .unwrap_or(now);

        // Post link: explicit wrapper first, data-urn fallback second.
        let source_link = doc
            .select(&SEL_LINK_WRAPPER)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string)
            .or_else(|| {
                doc.select(&SEL_URN_CONTAINER)
                    .next()
                    .and_then(|el| el.value().attr("data-urn"))
                    .map(|urn| format!("https://www.linkedin.com/feed/update/{urn}"))
            })?;

        let hashtags: BTreeSet<String> = doc
            .select(&SEL_HASHTAG)
            .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|s| !s.is_empty())
            .collect();

        let reaction_count = doc
            .select(&SEL_REACTIONS)
            .next()
            .and_then(|el| first_count(&el.text().collect::<Vec<_>>().join(" ")));
        let comment_count = doc
            .select(&SEL_COMMENTS)
            .next()
            .and_then(|el| el.value().attr("aria-label"))
            .and_then(first_count);

        Some(PostRecord {
            source_link,
            author_name,
            profile_url,
            published_at,
            text,
            hashtags,
            reaction_count,
            comment_count,
            query: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_timestamps_map_to_expected_deltas() {
        let n = now();
        assert_eq!(parse_relative_timestamp("5 minutes ago", n), n - Duration::minutes(5));
        assert_eq!(parse_relative_timestamp("3h", n), n - Duration::hours(3));
        assert_eq!(parse_relative_timestamp("2 weeks ago", n), n - Duration::weeks(2));
        assert_eq!(parse_relative_timestamp("1mo", n), n - Duration::days(30));
        assert_eq!(parse_relative_timestamp("1 year ago", n), n - Duration::days(365));
    }

    #[test]
    fn unparseable_timestamp_defaults_to_now() {
        let n = now();
        assert_eq!(parse_relative_timestamp("just now", n), n);
    }

    #[test]
    fn email_sniffing() {
        assert!(contains_email("reach us at jobs@example.co.uk today"));
        assert!(!contains_email("no contact here, sorry"));
        assert_eq!(
            find_emails("a@b.com and c.d+e@f-g.io"),
            vec!["a@b.com".to_string(), "c.d+e@f-g.io".to_string()]
        );
    }

    const FRAGMENT: &str = r#"
      <div class="feed-shared-update-v2" data-urn="urn:li:activity:42">
        <div class="update-components-actor">
          <a class="update-components-actor__meta-link" href="https://example.com/in/jane"></a>
          <span dir="ltr"><span aria-hidden="true">Jane Doe</span></span>
          <span class="update-components-actor__sub-description">
            <span class="visually-hidden">2 weeks ago</span>
          </span>
        </div>
        <div class="update-components-text">
          Hiring Rust engineers!  Contact  hr@example.com
        </div>
        <a href="/hashtag/rustlang">#rustlang</a>
        <span class="social-details-social-counts__reactions-count">1,204</span>
        <button aria-label="12 comments on this post"></button>
      </div>"#;

    #[test]
    fn full_fragment_extracts_all_fields() {
        let rec = HtmlExtractor.extract(FRAGMENT, now()).expect("record");
        assert_eq!(rec.source_link, "https://www.linkedin.com/feed/update/urn:li:activity:42");
        assert_eq!(rec.author_name.as_deref(), Some("Jane Doe"));
        assert_eq!(rec.profile_url.as_deref(), Some("https://example.com/in/jane"));
        assert_eq!(rec.published_at, now() - Duration::weeks(2));
        assert_eq!(rec.text, "Hiring Rust engineers! Contact hr@example.com");
        assert!(rec.hashtags.contains("#rustlang"));
        assert_eq!(rec.reaction_count, Some(1204));
        assert_eq!(rec.comment_count, Some(12));
        assert!(rec.query.is_empty());
    }

    #[test]
    fn fragment_without_text_container_is_rejected() {
        let html = r#"<div class="feed-shared-update-v2" data-urn="urn:li:activity:7"></div>"#;
        assert!(HtmlExtractor.extract(html, now()).is_none());
    }

    #[test]
    fn fragment_without_any_link_is_rejected() {
        let html = r#"<div><div class="update-components-text">text hr@x.io</div></div>"#;
        assert!(HtmlExtractor.extract(html, now()).is_none());
    }
}
