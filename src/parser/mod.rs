pub mod meta;
pub mod segment;
pub mod text;
pub mod trip;

use anyhow::Result;
use chrono::Utc;

use crate::error::FallbackMatch;
use crate::lines::LineRepository;
use crate::model::{Cancellation, Observation};
use crate::resolver::{self, LineChoice};

/// Everything one successfully parsed article produces. A non-empty
/// `fallbacks` list means truncation-guessed mappings were persisted and
/// need human verification.
#[derive(Debug)]
pub struct ArticleResult {
    pub records: Vec<Cancellation>,
    pub observations: Vec<Observation>,
    pub fallbacks: Vec<FallbackMatch>,
}

/// Tagged outcome of processing one article. Callers branch on the variant;
/// nothing is partially consumed, either the whole trip list is returned or
/// none of it.
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(ArticleResult),
    /// Zero valid trips after segmentation and parsing: format drift, or an
    /// article that genuinely lists none.
    NoTrips,
    /// A train number that cannot be safely assigned to any line.
    Unresolved {
        train_number: String,
        mentioned: Vec<String>,
    },
}

/// Full pipeline for one article: normalize → metadata → segment → parse
/// trips → resolve lines. Trip order follows the source text. The repository
/// is only written by the resolver's fallback path.
pub fn process_article(
    html: &str,
    source_url: &str,
    repo: &mut LineRepository,
) -> Result<ParseOutcome> {
    let plain = text::normalize(html);
    let meta = meta::extract(&plain);

    let trips: Vec<_> = segment::segment(&plain)
        .iter()
        .filter_map(|line| trip::parse_line(line))
        .map(|m| m.into_trip())
        .collect();
    if trips.is_empty() {
        return Ok(ParseOutcome::NoTrips);
    }

    let captured_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    // Articles without a Stand declaration are rare; extraction time is the
    // closest substitute we have.
    let stand = meta.stand.clone().unwrap_or_else(|| captured_at.clone());
    let date = meta.date.clone().unwrap_or_else(|| stand[..10].to_string());

    let mut records = Vec::with_capacity(trips.len());
    let mut observations = Vec::new();
    let mut fallbacks = Vec::new();

    for trip in trips {
        match resolver::resolve_line(&trip.train_number, &meta, repo)? {
            LineChoice::Resolved {
                line,
                observation,
                fallback,
            } => {
                observations.extend(observation);
                fallbacks.extend(fallback);
                records.push(Cancellation {
                    line,
                    date: date.clone(),
                    stand: stand.clone(),
                    train_number: trip.train_number,
                    from_stop: trip.from_stop,
                    from_time: trip.from_time,
                    to_stop: trip.to_stop,
                    to_time: trip.to_time,
                    source_url: Some(source_url.to_string()),
                    captured_at: Some(captured_at.clone()),
                });
            }
            LineChoice::Unresolved => {
                return Ok(ParseOutcome::Unresolved {
                    train_number: trip.train_number,
                    mentioned: meta.mentioned_lines.clone(),
                });
            }
        }
    }

    Ok(ParseOutcome::Parsed(ArticleResult {
        records,
        observations,
        fallbacks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}.html")).unwrap()
    }

    fn repo() -> (tempfile::TempDir, LineRepository) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = LineRepository::load(tmp.path()).unwrap();
        (tmp, repo)
    }

    #[test]
    fn single_line_article_end_to_end() {
        let html = load_fixture("s5_single");
        let (_tmp, mut repo) = repo();
        let outcome = process_article(&html, "https://example.org/s5", &mut repo).unwrap();
        let ParseOutcome::Parsed(result) = outcome else {
            panic!("expected parsed outcome");
        };

        assert_eq!(result.records.len(), 2);
        let first = &result.records[0];
        assert_eq!(first.line, "S5");
        assert_eq!(first.train_number, "84888");
        assert_eq!(first.date, "2023-11-04");
        assert_eq!(first.stand, "2023-11-03T14:05:22");
        assert_eq!(first.from_stop, "Söllingen Bahnhof");
        assert_eq!(first.source_url.as_deref(), Some("https://example.org/s5"));

        // Single-mention article teaches both pairings.
        assert_eq!(result.observations.len(), 2);
        assert!(result.fallbacks.is_empty());
    }

    #[test]
    fn records_keep_source_order() {
        let html = load_fixture("s5_single");
        let (_tmp, mut repo) = repo();
        let ParseOutcome::Parsed(result) =
            process_article(&html, "https://example.org/s5", &mut repo).unwrap()
        else {
            panic!("expected parsed outcome");
        };
        assert_eq!(result.records[0].train_number, "84888");
        assert_eq!(result.records[1].train_number, "84893");
    }

    #[test]
    fn idempotent_modulo_captured_at() {
        let html = load_fixture("s5_single");
        let (_tmp, mut repo) = repo();
        let ParseOutcome::Parsed(a) =
            process_article(&html, "https://example.org/s5", &mut repo).unwrap()
        else {
            panic!()
        };
        let ParseOutcome::Parsed(b) =
            process_article(&html, "https://example.org/s5", &mut repo).unwrap()
        else {
            panic!()
        };
        for (x, y) in a.records.iter().zip(&b.records) {
            assert_eq!(x.line, y.line);
            assert_eq!(x.date, y.date);
            assert_eq!(x.stand, y.stand);
            assert_eq!(x.train_number, y.train_number);
            assert_eq!(x.from_stop, y.from_stop);
            assert_eq!(x.from_time, y.from_time);
            assert_eq!(x.to_stop, y.to_stop);
            assert_eq!(x.to_time, y.to_time);
            assert_eq!(x.source_url, y.source_url);
        }
    }

    #[test]
    fn marker_without_parseable_lines_is_no_trips() {
        let html = "<p>Wegen Sturm sind folgende Fahrten betroffen:</p><p>Details folgen.</p>";
        let (_tmp, mut repo) = repo();
        let outcome = process_article(html, "https://example.org/x", &mut repo).unwrap();
        assert!(matches!(outcome, ParseOutcome::NoTrips));
    }

    #[test]
    fn multi_line_article_with_unknown_number_and_no_declared_line() {
        let html = "<p>Ausfälle auf S4 und S5</p>\
                    <p>Betroffene Fahrten:</p>\
                    <p>99999 08:00 Uhr Acher - 09:00 Uhr Bühl</p>\
                    <p>Stand: 03.11.2023 14:05:22</p>";
        // Headline carries no line prefix, so nothing is declared.
        let (_tmp, mut repo) = repo();
        let outcome = process_article(html, "https://example.org/x", &mut repo).unwrap();
        match outcome {
            ParseOutcome::Unresolved {
                train_number,
                mentioned,
            } => {
                assert_eq!(train_number, "99999");
                assert_eq!(mentioned, vec!["S4", "S5"]);
            }
            other => panic!("expected unresolved, got {other:?}"),
        }
    }

    #[test]
    fn fallback_surfaces_in_result() {
        let html = load_fixture("multi_line");
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("S4.json"),
            r#"{"line":"S4","trainNumbers":["70010"]}"#,
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("S5.json"),
            r#"{"line":"S5","trainNumbers":["85001"]}"#,
        )
        .unwrap();
        let mut repo = LineRepository::load(tmp.path()).unwrap();

        let ParseOutcome::Parsed(result) =
            process_article(&html, "https://example.org/m", &mut repo).unwrap()
        else {
            panic!("expected parsed outcome");
        };
        // 70019 has no exact entry; truncation matches 70010 on S4.
        assert_eq!(result.fallbacks.len(), 1);
        assert_eq!(result.fallbacks[0].train_number, "70019");
        assert_eq!(result.fallbacks[0].line, "S4");
        assert!(result
            .records
            .iter()
            .any(|r| r.train_number == "70019" && r.line == "S4"));
        // Multi-line articles never emit observations.
        assert!(result.observations.is_empty());
    }
}
