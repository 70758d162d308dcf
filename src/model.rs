use serde::{Deserialize, Serialize};

/// One cancelled trip, fully resolved. This is the unit persisted by the
/// store; field names match the on-disk JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub line: String,
    /// ISO `YYYY-MM-DD` day the cancellation applies to.
    pub date: String,
    /// ISO timestamp of the article's "Stand" declaration.
    pub stand: String,
    pub train_number: String,
    pub from_stop: String,
    pub from_time: String,
    pub to_stop: String,
    pub to_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
}

impl Cancellation {
    /// Identity key for duplicate detection: two records sharing this triple
    /// describe the same cancellation event even if other fields differ.
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.date, &self.train_number, &self.from_time)
    }

    /// Sort key for bucket files.
    pub fn sort_key(&self) -> (String, String, String) {
        (
            self.date.clone(),
            self.from_time.clone(),
            self.train_number.clone(),
        )
    }
}

/// A confidently observed (line, train number) pair from a single-line
/// article. Merged into the persisted definitions after the article's
/// parsing has fully completed; additive only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub line: String,
    pub train_number: String,
}
