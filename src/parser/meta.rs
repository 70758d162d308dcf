use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

static LINE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bS\d{1,2}\b").unwrap());
static LINE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Linien?\s*:\s*([^\n]+)").unwrap());
static LINE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Leading line designator of a headline, e.g. "S5:", "S4 und S41", "S1/S11"
    Regex::new(r"^(S\d{1,2}(?:\s*(?:,|/|&|und|-)\s*S?\d{1,2})*)").unwrap()
});
static STAND_LABELED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Stand\s*:\s*(\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2})").unwrap());
static STAND_SHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}\.\d{2}\.\d{4}), (\d{1,2}:\d{2}) Uhr").unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bam (\d{2}\.\d{2}\.\d{4})").unwrap());

/// Everything the line resolver needs to know about an article besides its
/// trips. Built once from normalized text, read-only afterwards.
#[derive(Debug, Clone)]
pub struct ArticleMeta {
    pub declared_line: String,
    /// Distinct line identifiers named anywhere in the body, in first-mention order.
    pub mentioned_lines: Vec<String>,
    /// ISO timestamp of the "Stand" declaration, if the article carries one.
    pub stand: Option<String>,
    /// ISO day the cancellations apply to.
    pub date: Option<String>,
}

impl ArticleMeta {
    pub fn mention_count(&self) -> usize {
        self.mentioned_lines.len()
    }
}

pub fn extract(text: &str) -> ArticleMeta {
    let stand = stand(text);
    let date = date(text, stand.as_deref());
    ArticleMeta {
        declared_line: declared_line(text),
        mentioned_lines: mentioned_lines(text),
        stand,
        date,
    }
}

/// The single declared-line metadata field: a "Linie:" label wins, otherwise
/// the line designator opening the headline. May be ambiguous ("S4 und S41");
/// the resolver decides what to do with that.
fn declared_line(text: &str) -> String {
    if let Some(caps) = LINE_LABEL_RE.captures(text) {
        return caps[1].trim().to_string();
    }
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    LINE_PREFIX_RE
        .captures(first_line.trim())
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default()
}

fn mentioned_lines(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in LINE_TOKEN_RE.find_iter(text) {
        let token = m.as_str().to_string();
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

/// First match of either stand format, as ISO. The long format carries an
/// explicit "Stand:" label; the short one is bare "DD.MM.YYYY, HH:MM Uhr".
fn stand(text: &str) -> Option<String> {
    if let Some(caps) = STAND_LABELED_RE.captures(text) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&caps[1], "%d.%m.%Y %H:%M:%S") {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    if let Some(caps) = STAND_SHORT_RE.captures(text) {
        let raw = format!("{} {}", &caps[1], &caps[2]);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&raw, "%d.%m.%Y %H:%M") {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    None
}

/// Day the cancellations apply to: an explicit "am DD.MM.YYYY" beats the
/// stand's date portion.
fn date(text: &str, stand: Option<&str>) -> Option<String> {
    if let Some(caps) = DATE_RE.captures(text) {
        if let Ok(d) = NaiveDate::parse_from_str(&caps[1], "%d.%m.%Y") {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    stand.map(|s| s[..10].to_string())
}
