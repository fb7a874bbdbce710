//! Normalization of raw listing-page values.
//!
//! URLs become the deduplication key. The orchestrator runs every
//! fragment URL through [`normalize_url`] against its source's base URL,
//! whatever the adapter already did, and the writer refuses any URL that
//! is not in [`is_canonical_url`] form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use url::Url;

/// Longest summary kept before truncation, in characters.
pub const SUMMARY_MAX_CHARS: usize = 200;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"];

/// Resolve an href against the source's base URL and strip it down to the
/// identity key: absolute http(s), no query string, no fragment.
///
/// Protocol-relative hrefs (`//host/path`) are forced to https. Returns
/// `None` for empty input, unparseable URLs, non-http(s) schemes such as
/// `mailto:` or `javascript:`, and hrefs glued onto a second absolute URL
/// (`https://a.testhttps://a.test/post`).
pub fn normalize_url(raw: &str, base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let before_query = raw.split(['?', '#']).next().unwrap_or(raw);
    if before_query.matches("://").count() > 1 {
        return None;
    }

    let mut url = if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()?
    } else {
        base.join(raw).ok()?
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// True when `url` is already its own normalized form.
pub fn is_canonical_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => normalize_url(url, &parsed).as_deref() == Some(url),
        Err(_) => false,
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned text, or `None` when nothing but whitespace remains.
pub fn non_empty(raw: &str) -> Option<String> {
    let text = clean_text(raw);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Clean a summary and cut it to [`SUMMARY_MAX_CHARS`], appending `"..."`.
pub fn clean_summary(raw: &str) -> Option<String> {
    let text = non_empty(raw)?;
    if text.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
        Some(format!("{cut}..."))
    } else {
        Some(text)
    }
}

/// Parse a published marker into a UTC timestamp.
///
/// Accepts RFC 3339, ISO date-times without offset (taken as UTC), bare
/// ISO dates, and display dates such as `"May 6, 2025"` or `"Sep 3, 2024"`.
/// Display text like `"May 6, 2025 / Global"` is cut at `" / "` first.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.split(" / ").next().unwrap_or(raw).trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    tracing::debug!(raw = %raw, "Unparseable published date");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn base() -> Url {
        Url::parse("https://stripe.com/blog").unwrap()
    }

    #[test]
    fn test_url_strips_query_and_fragment() {
        assert_eq!(
            normalize_url("https://stripe.com/blog/post?utm_source=x#top", &base()).as_deref(),
            Some("https://stripe.com/blog/post")
        );
    }

    #[test]
    fn test_url_query_variants_collapse() {
        let a = normalize_url("https://example.com/a?ref=home", &base());
        let b = normalize_url("https://example.com/a?source=feed&x=1", &base());
        assert_eq!(a, b);
    }

    #[test]
    fn test_url_resolves_relative_paths() {
        assert_eq!(
            normalize_url("/blog/ledger", &base()).as_deref(),
            Some("https://stripe.com/blog/ledger")
        );
    }

    #[test]
    fn test_url_protocol_relative_forced_https() {
        assert_eq!(
            normalize_url("//cdn.example.com/post", &base()).as_deref(),
            Some("https://cdn.example.com/post")
        );
    }

    #[test]
    fn test_url_rejects_other_schemes() {
        assert!(normalize_url("mailto:press@stripe.com", &base()).is_none());
        assert!(normalize_url("javascript:void(0)", &base()).is_none());
        assert!(normalize_url("   ", &base()).is_none());
    }

    #[test]
    fn test_url_rejects_concatenated_urls() {
        assert!(normalize_url("https://stripe.comhttps://stripe.com/blog/a", &base()).is_none());
        // A second scheme inside the query is harmless: the query is dropped.
        assert_eq!(
            normalize_url("/blog/a?next=https://stripe.com/", &base()).as_deref(),
            Some("https://stripe.com/blog/a")
        );
    }

    #[test]
    fn test_canonical_url_check() {
        assert!(is_canonical_url("https://stripe.com/blog/a"));
        assert!(!is_canonical_url("https://stripe.com/blog/a?ref=x"));
        assert!(!is_canonical_url("/blog/a"));
        assert!(!is_canonical_url("ftp://stripe.com/a"));
        assert!(!is_canonical_url("https://stripe.comhttps://stripe.com/a"));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Scaling\n\t the   edge "), "Scaling the edge");
        assert!(non_empty(" \n ").is_none());
    }

    #[test]
    fn test_summary_truncation() {
        let long = "a".repeat(250);
        let summary = clean_summary(&long).unwrap();
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS + 3);
        assert!(summary.ends_with("..."));

        assert_eq!(clean_summary("short").as_deref(), Some("short"));
    }

    #[test]
    fn test_parse_rfc3339_and_iso() {
        let dt = parse_published("2024-03-05T10:20:30.000Z").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2024, 3, 5, 10));

        let dt = parse_published("2024-03-05T10:20:30+02:00").unwrap();
        assert_eq!(dt.hour(), 8);

        let dt = parse_published("2024-03-05 10:20:30").unwrap();
        assert_eq!(dt.minute(), 20);

        let dt = parse_published("2024-03-05").unwrap();
        assert_eq!(dt.day(), 5);
    }

    #[test]
    fn test_parse_display_dates() {
        let dt = parse_published("May 6, 2025 / Global").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 5, 6));

        let dt = parse_published("Sep 3, 2024").unwrap();
        assert_eq!((dt.month(), dt.day()), (9, 3));

        let dt = parse_published("November 12, 2023").unwrap();
        assert_eq!(dt.month(), 11);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_published("yesterday").is_none());
        assert!(parse_published("").is_none());
    }
}
