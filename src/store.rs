use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::debug;

use crate::model::Cancellation;

/// Deduplicating (year, line)-partitioned JSON store. Buckets are
/// independent files and flush concurrently; one bucket's merge is
/// sequential.
pub struct Store {
    root: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub duplicates: usize,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    /// Merge records into their buckets without creating duplicates.
    /// Identity is (date, trainNumber, fromTime); records sharing it are the
    /// same cancellation event even if other fields differ.
    pub async fn merge(&self, records: Vec<Cancellation>) -> Result<MergeReport> {
        let mut buckets: BTreeMap<(String, String), Vec<Cancellation>> = BTreeMap::new();
        for record in records {
            let year = record
                .date
                .get(..4)
                .with_context(|| format!("record date too short: {:?}", record.date))?
                .to_string();
            buckets
                .entry((year, record.line.clone()))
                .or_default()
                .push(record);
        }

        let mut handles = Vec::new();
        for ((year, line), incoming) in buckets {
            let path = self.root.join(&year).join(format!("{line}.json"));
            handles.push(tokio::spawn(merge_bucket(path, incoming)));
        }

        let mut report = MergeReport::default();
        for handle in handles {
            let bucket_report = handle.await??;
            report.added += bucket_report.added;
            report.duplicates += bucket_report.duplicates;
        }
        Ok(report)
    }

    /// (year, line, record count) for every bucket on disk.
    pub async fn bucket_counts(&self) -> Result<Vec<(String, String, usize)>> {
        let mut counts = Vec::new();
        let mut years = match fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(counts),
            Err(e) => return Err(e.into()),
        };
        while let Some(year_entry) = years.next_entry().await? {
            if !year_entry.file_type().await?.is_dir() {
                continue;
            }
            let year = year_entry.file_name().to_string_lossy().to_string();
            let mut files = fs::read_dir(year_entry.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let line = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let records = read_bucket(&path).await?;
                counts.push((year.clone(), line, records.len()));
            }
        }
        counts.sort();
        Ok(counts)
    }
}

async fn merge_bucket(path: PathBuf, incoming: Vec<Cancellation>) -> Result<MergeReport> {
    let mut records = read_bucket(&path).await?;
    let mut report = MergeReport::default();
    for record in incoming {
        if records.iter().any(|r| r.identity() == record.identity()) {
            report.duplicates += 1;
        } else {
            records.push(record);
            report.added += 1;
        }
    }
    if report.added == 0 {
        // Nothing new; leave the file untouched.
        return Ok(report);
    }

    records.sort_by_key(|r| r.sort_key());
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let json = serde_json::to_string_pretty(&records)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    debug!(
        "bucket {}: {} added, {} duplicates",
        path.display(),
        report.added,
        report.duplicates
    );
    Ok(report)
}

async fn read_bucket(path: &Path) -> Result<Vec<Cancellation>> {
    match fs::read_to_string(path).await {
        Ok(raw) => {
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str, date: &str, train: &str, from_time: &str) -> Cancellation {
        Cancellation {
            line: line.into(),
            date: date.into(),
            stand: "2023-11-03T14:05:22".into(),
            train_number: train.into(),
            from_stop: "Söllingen Bahnhof".into(),
            from_time: from_time.into(),
            to_stop: "Germersheim Bahnhof".into(),
            to_time: "10:07".into(),
            source_url: Some("https://example.org/a".into()),
            captured_at: Some("2023-11-03T15:00:00".into()),
        }
    }

    #[tokio::test]
    async fn merge_partitions_by_year_and_line() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let report = store
            .merge(vec![
                record("S4", "2023-11-04", "84888", "08:38"),
                record("S5", "2023-11-04", "85001", "09:00"),
                record("S4", "2024-01-02", "84890", "10:10"),
            ])
            .await
            .unwrap();
        assert_eq!(report, MergeReport { added: 3, duplicates: 0 });
        assert!(tmp.path().join("2023/S4.json").exists());
        assert!(tmp.path().join("2023/S5.json").exists());
        assert!(tmp.path().join("2024/S4.json").exists());
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let rec = record("S4", "2023-11-04", "84888", "08:38");
        store.merge(vec![rec.clone()]).await.unwrap();
        let before = std::fs::read_to_string(tmp.path().join("2023/S4.json")).unwrap();

        let report = store.merge(vec![rec]).await.unwrap();
        assert_eq!(report, MergeReport { added: 0, duplicates: 1 });
        let after = std::fs::read_to_string(tmp.path().join("2023/S4.json")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn identity_ignores_other_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store
            .merge(vec![record("S4", "2023-11-04", "84888", "08:38")])
            .await
            .unwrap();
        // Same (date, train, fromTime), different destination: duplicate.
        let mut changed = record("S4", "2023-11-04", "84888", "08:38");
        changed.to_stop = "Karlsruhe Hbf".into();
        let report = store.merge(vec![changed]).await.unwrap();
        assert_eq!(report, MergeReport { added: 0, duplicates: 1 });
    }

    #[tokio::test]
    async fn bucket_sorted_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store
            .merge(vec![
                record("S4", "2023-11-05", "84890", "12:00"),
                record("S4", "2023-11-04", "84888", "08:38"),
                record("S4", "2023-11-04", "84001", "08:38"),
            ])
            .await
            .unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("2023/S4.json")).unwrap();
        let records: Vec<Cancellation> = serde_json::from_str(&raw).unwrap();
        let keys: Vec<_> = records
            .iter()
            .map(|r| (r.date.clone(), r.from_time.clone(), r.train_number.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn bucket_counts_reports_all_buckets() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store
            .merge(vec![
                record("S4", "2023-11-04", "84888", "08:38"),
                record("S5", "2023-11-04", "85001", "09:00"),
            ])
            .await
            .unwrap();
        let counts = store.bucket_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                ("2023".to_string(), "S4".to_string(), 1),
                ("2023".to_string(), "S5".to_string(), 1),
            ]
        );
    }
}
