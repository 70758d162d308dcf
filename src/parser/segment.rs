use std::sync::LazyLock;

use regex::Regex;

use super::trip;

/// How many following lines a non-matching line may absorb before it is
/// given up on. A trip split across 3 physical lines is still recoverable.
const MERGE_LOOKAHEAD: usize = 3;

/// Phrases introducing the trip listing. Wording drifts between articles,
/// so several variants are recognized, each tolerant of arbitrary
/// whitespace (the source wraps these across rendered lines).
const START_MARKERS: &[&str] = &[
    "sind folgende Fahrten von Ausfällen betroffen:",
    "sind folgende Fahrten betroffen:",
    "Folgende Fahrten fallen aus:",
    "Betroffene Fahrten:",
];

const END_MARKER: &str = "Wir bitten um Entschuldigung";

const REROUTED_PHRASE: &str = "Zug wird umgeleitet";

static START_RES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| START_MARKERS.iter().copied().map(phrase_regex).collect());
static END_RE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(END_MARKER));

fn phrase_regex(phrase: &str) -> Regex {
    let pattern = phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&pattern).unwrap()
}

/// Locate the trip listing in normalized text and produce one grammar-valid
/// candidate string per trip, merging continuation lines within the
/// lookahead. Unmatched fragments are dropped; the listing is full of
/// boilerplate and lossy tolerance beats false positives here.
pub fn segment(text: &str) -> Vec<String> {
    let window = trip_window(text);
    let lines: Vec<String> = window
        .lines()
        .map(|l| l.replace('\u{a0}', " ").trim().to_string())
        .filter(|l| !l.is_empty() && !l.contains(REROUTED_PHRASE))
        .collect();

    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if trip::parse_line(&lines[i]).is_some() {
            out.push(lines[i].clone());
            i += 1;
            continue;
        }
        let mut merged = lines[i].clone();
        let mut consumed = None;
        for j in 1..=MERGE_LOOKAHEAD {
            let Some(next) = lines.get(i + j) else { break };
            merged.push(' ');
            merged.push_str(next);
            if trip::parse_line(&merged).is_some() {
                consumed = Some(j);
                break;
            }
        }
        match consumed {
            Some(j) => {
                out.push(merged);
                i += j + 1;
            }
            None => i += 1,
        }
    }
    out
}

/// Everything after the first start marker up to (excluding) the end marker.
/// No start marker: scan the whole text; older articles list trips without
/// any introduction.
fn trip_window(text: &str) -> &str {
    let start = START_RES
        .iter()
        .filter_map(|re| re.find(text))
        .min_by_key(|m| m.start())
        .map(|m| m.end())
        .unwrap_or(0);
    let window = &text[start..];
    match END_RE.find(window) {
        Some(m) => &window[..m.start()],
        None => window,
    }
}
