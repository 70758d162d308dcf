use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::error::FallbackMatch;
use crate::lines::{Knowledge, LineRepository};
use crate::model::Observation;
use crate::parser::meta::ArticleMeta;

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"S\d{1,2}\s*-\s*S\d{1,2}").unwrap());

/// Outcome of resolving one trip's line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChoice {
    Resolved {
        line: String,
        /// Present only for single-mention articles, the "self-teaching"
        /// signal merged into definitions after the article completes.
        observation: Option<Observation>,
        /// Present when the line was found via digit truncation. The
        /// mapping is already persisted; the caller must still surface it.
        fallback: Option<FallbackMatch>,
    },
    /// Multi-line article, unknown number, no fallback match, nothing
    /// declared to fall back on.
    Unresolved,
}

/// Assign the canonical line for one trip. Explicit, unambiguous textual
/// evidence outranks inferred mappings; inferred mappings outrank the
/// truncation fallback; the fallback is never trusted silently.
pub fn resolve_line(
    train_number: &str,
    meta: &ArticleMeta,
    repo: &mut LineRepository,
) -> Result<LineChoice> {
    let declared = meta.declared_line.trim().to_string();
    let ambiguous = is_ambiguous(&declared);

    // A single-line article is ground truth: take the declared line and
    // remember the pairing.
    if meta.mention_count() == 1 && !ambiguous {
        return Ok(LineChoice::Resolved {
            observation: Some(Observation {
                line: declared.clone(),
                train_number: train_number.to_string(),
            }),
            line: declared,
            fallback: None,
        });
    }

    if meta.mention_count() >= 1 {
        let knowledge = repo.knowledge();

        if let Some(known) = knowledge.lookup(train_number) {
            let line = prefer(&known.lines, &known.primary, meta, knowledge);
            return Ok(LineChoice::Resolved {
                line,
                observation: None,
                fallback: None,
            });
        }

        if let Some((line, matched_number)) = fallback_match(train_number, meta, knowledge) {
            repo.record_fallback(&line, train_number)?;
            return Ok(LineChoice::Resolved {
                line: line.clone(),
                observation: None,
                fallback: Some(FallbackMatch {
                    train_number: train_number.to_string(),
                    matched_number,
                    line,
                }),
            });
        }
    }

    // No knowledge either way: the declared line as-is is all we have.
    if declared.is_empty() {
        Ok(LineChoice::Unresolved)
    } else {
        Ok(LineChoice::Resolved {
            line: declared,
            observation: None,
            fallback: None,
        })
    }
}

/// A declared line is ambiguous when it is empty or names more than one
/// line: connector words, list punctuation, or an `S1-S11`-style range.
fn is_ambiguous(declared: &str) -> bool {
    declared.is_empty()
        || declared == "-"
        || declared.contains(',')
        || declared.contains('/')
        || declared.contains('&')
        || declared
            .split_whitespace()
            .any(|w| w.eq_ignore_ascii_case("und"))
        || RANGE_RE.is_match(declared)
}

/// Strip the last digit and look for any known number sharing the prefix.
/// Returns the preferred line and the number that matched.
fn fallback_match(
    train_number: &str,
    meta: &ArticleMeta,
    knowledge: &Knowledge,
) -> Option<(String, String)> {
    if train_number.len() < 2 {
        return None;
    }
    let prefix = &train_number[..train_number.len() - 1];
    let matches = knowledge.prefix_matches(prefix);
    if matches.is_empty() {
        return None;
    }

    let mut candidates: Vec<String> = Vec::new();
    for (_, known) in &matches {
        for line in &known.lines {
            if !candidates.contains(line) {
                candidates.push(line.clone());
            }
        }
    }
    let primary = matches[0].1.primary.clone();
    let line = prefer(&candidates, &primary, meta, knowledge);
    let matched_number = matches
        .iter()
        .find(|(_, k)| k.lines.iter().any(|l| l == &line))
        .map(|(n, _)| (*n).to_string())
        .unwrap_or_else(|| matches[0].0.to_string());
    Some((line, matched_number))
}

/// Among a number's candidate lines, prefer one the article mentions; with
/// several mentioned, the line with the fewest declared numbers is treated
/// as most specific; otherwise the first-registered line wins.
fn prefer(lines: &[String], primary: &str, meta: &ArticleMeta, knowledge: &Knowledge) -> String {
    let mentioned: Vec<&String> = lines
        .iter()
        .filter(|l| meta.mentioned_lines.contains(*l))
        .collect();
    match mentioned.len() {
        0 => primary.to_string(),
        1 => mentioned[0].clone(),
        _ => mentioned
            .into_iter()
            .min_by_key(|l| knowledge.line_size(l.as_str()))
            .cloned()
            .unwrap_or_else(|| primary.to_string()),
    }
}
