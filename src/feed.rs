use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a[^>]+href="([^"]+)"[^>]*>([^<]+)</a>"#).unwrap());
static ORIGIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://[^/]+").unwrap());

/// Keyword weights for deciding whether an announcement is about
/// cancellations at all. Scored against the lowercased link title.
const KEYWORDS: &[(&str, u32)] = &[
    ("zugausfall", 3),
    ("zugausfälle", 3),
    ("fällt aus", 3),
    ("fallen aus", 3),
    ("ausfall", 2),
    ("ersatzverkehr", 1),
    ("busnotverkehr", 1),
];

const RELEVANCE_THRESHOLD: u32 = 2;

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub score: u32,
}

/// Fetch the announcement listing and return detail-page links that look
/// like cancellation articles, in listing order.
pub async fn fetch_feed(client: &reqwest::Client, feed_url: &str) -> Result<Vec<FeedItem>> {
    info!("Fetching announcement feed: {}", feed_url);
    let html = client
        .get(feed_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch announcement feed")?;

    let items = extract_items(&html, feed_url);
    for item in &items {
        debug!("relevant (score {}): {}", item.score, item.title);
    }
    info!("Relevant announcements: {}", items.len());
    Ok(items)
}

pub fn relevance(title: &str) -> u32 {
    let lower = title.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(kw, _)| lower.contains(kw))
        .map(|(_, w)| w)
        .sum()
}

fn extract_items(html: &str, base_url: &str) -> Vec<FeedItem> {
    let origin = ORIGIN_RE
        .find(base_url)
        .map(|m| m.as_str())
        .unwrap_or_default();
    let mut seen = Vec::new();
    let mut items = Vec::new();
    for caps in LINK_RE.captures_iter(html) {
        let href = caps[1].trim();
        let title = caps[2].trim().to_string();
        let url = if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{origin}{href}")
        } else {
            continue;
        };
        if seen.contains(&url) {
            continue;
        }
        let score = relevance(&title);
        if score >= RELEVANCE_THRESHOLD {
            seen.push(url.clone());
            items.push(FeedItem { url, title, score });
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_cancellation_keywords() {
        assert!(relevance("S5: Zugausfälle wegen Personalmangel") >= RELEVANCE_THRESHOLD);
        assert!(relevance("Zug fällt aus am Sonntag") >= RELEVANCE_THRESHOLD);
        assert!(relevance("Neue Fahrplanauskunft online") < RELEVANCE_THRESHOLD);
    }

    #[test]
    fn extracts_and_filters_links() {
        let html = r#"
            <a href="/meldung/1">S4: Zugausfälle am Montag</a>
            <a href="/meldung/2">Neuer Fahrkartenautomat</a>
            <a href="https://example.org/meldung/3">S1 fällt aus zwischen A und B</a>
        "#;
        let items = extract_items(html, "https://example.org/meldungen");
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/meldung/1",
                "https://example.org/meldung/3"
            ]
        );
    }

    #[test]
    fn duplicate_links_kept_once() {
        let html = r#"
            <a href="/m/1">S4: Zugausfälle</a>
            <a href="/m/1">S4: Zugausfälle</a>
        "#;
        let items = extract_items(html, "https://example.org/");
        assert_eq!(items.len(), 1);
    }
}
