use thiserror::Error;

/// Per-article parse failures. Callers branch on the variant; `NoTripsFound`
/// is routinely treated as benign by the batch driver, `UnresolvedMapping`
/// is not.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Segmentation + parsing produced zero valid trip records.
    #[error("no trips found in article")]
    NoTripsFound,

    /// A multi-line article contains a train number with no knowledge-base
    /// entry and no fallback match.
    #[error("no line mapping for train {train_number} (mentioned lines: {mentioned})")]
    UnresolvedMapping {
        train_number: String,
        mentioned: String,
    },
}

/// Knowledge-base construction failures.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Two unconnected lines declare the same train number.
    #[error("train {number} declared by both {first} and {second}, which are not connected")]
    Conflict {
        number: String,
        first: String,
        second: String,
    },

    #[error("failed to read line definitions from {dir}: {source}")]
    Io {
        dir: String,
        #[source]
        source: std::io::Error,
    },
}

/// A mapping found only via the last-digit truncation heuristic. The mapping
/// is persisted optimistically, but the match is surfaced so a human can
/// verify it and revert the definition if it was wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackMatch {
    pub train_number: String,
    pub matched_number: String,
    pub line: String,
}

impl std::fmt::Display for FallbackMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "train {} mapped to {} via truncation match on {} — verify manually",
            self.train_number, self.line, self.matched_number
        )
    }
}
