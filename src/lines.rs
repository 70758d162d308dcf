use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::KnowledgeError;
use crate::model::Observation;

/// Persisted per-line definition, one JSON file per canonical line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDefinition {
    pub line: String,
    /// Ordered-unique; appends go to the end.
    pub train_numbers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connected_lines: Vec<String>,
}

/// Lines known to serve one train number.
#[derive(Debug, Clone)]
pub struct KnownLines {
    /// First-registered line for this number.
    pub primary: String,
    pub lines: Vec<String>,
}

/// Derived index: train number → candidate lines. Immutable once built;
/// the repository swaps in a fresh one after every definition write.
#[derive(Debug, Clone, Default)]
pub struct Knowledge {
    entries: HashMap<String, KnownLines>,
    line_sizes: HashMap<String, usize>,
}

impl Knowledge {
    /// Build from all definitions. A number declared by two lines is
    /// tolerated only if the lines declare each other (either direction)
    /// as connected; anything else is a hard conflict.
    fn build<'a>(defs: impl Iterator<Item = &'a LineDefinition>) -> Result<Self, KnowledgeError> {
        let defs: Vec<&LineDefinition> = defs.collect();
        let connected = |a: &str, b: &str| {
            defs.iter().any(|d| {
                (d.line == a && d.connected_lines.iter().any(|c| c == b))
                    || (d.line == b && d.connected_lines.iter().any(|c| c == a))
            })
        };

        let mut entries: HashMap<String, KnownLines> = HashMap::new();
        let mut line_sizes = HashMap::new();
        for def in &defs {
            line_sizes.insert(def.line.clone(), def.train_numbers.len());
            for number in &def.train_numbers {
                match entries.get_mut(number) {
                    None => {
                        entries.insert(
                            number.clone(),
                            KnownLines {
                                primary: def.line.clone(),
                                lines: vec![def.line.clone()],
                            },
                        );
                    }
                    Some(known) => {
                        if known.lines.iter().any(|l| l == &def.line) {
                            continue;
                        }
                        if let Some(other) =
                            known.lines.iter().find(|l| !connected(l.as_str(), &def.line))
                        {
                            return Err(KnowledgeError::Conflict {
                                number: number.clone(),
                                first: other.clone(),
                                second: def.line.clone(),
                            });
                        }
                        known.lines.push(def.line.clone());
                    }
                }
            }
        }
        Ok(Knowledge {
            entries,
            line_sizes,
        })
    }

    pub fn lookup(&self, train_number: &str) -> Option<&KnownLines> {
        self.entries.get(train_number)
    }

    /// All known numbers sharing `prefix`, sorted for determinism.
    pub fn prefix_matches(&self, prefix: &str) -> Vec<(&str, &KnownLines)> {
        let mut matches: Vec<(&str, &KnownLines)> = self
            .entries
            .iter()
            .filter(|(n, _)| n.starts_with(prefix))
            .map(|(n, k)| (n.as_str(), k))
            .collect();
        matches.sort_by_key(|(n, _)| *n);
        matches
    }

    /// Total train numbers declared by `line`; the resolver uses fewer as
    /// "more specific".
    pub fn line_size(&self, line: &str) -> usize {
        self.line_sizes.get(line).copied().unwrap_or(usize::MAX)
    }
}

/// Definition files plus the derived index, for one schedule period's
/// directory. All writes to definition files go through here; the driver
/// serializes access with a single lock.
#[derive(Debug)]
pub struct LineRepository {
    dir: PathBuf,
    defs: BTreeMap<String, LineDefinition>,
    knowledge: Knowledge,
}

impl LineRepository {
    /// Scan `dir` for per-line definition files and build the index. A file
    /// that fails to parse only resets that line; the rest still load.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, KnowledgeError> {
        let dir = dir.into();
        let mut defs = BTreeMap::new();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => Some(e),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(KnowledgeError::Io {
                    dir: dir.display().to_string(),
                    source: e,
                })
            }
        };
        if let Some(entries) = entries {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_definition(&path) {
                    Ok(def) => {
                        defs.insert(def.line.clone(), def);
                    }
                    Err(e) => {
                        warn!("malformed line definition {}: {e:#}", path.display());
                    }
                }
            }
        }
        let knowledge = Knowledge::build(defs.values())?;
        Ok(LineRepository {
            dir,
            defs,
            knowledge,
        })
    }

    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    /// Append a fallback-matched train number to `line`'s definition,
    /// persist it immediately, and rebuild the index so the next lookup in
    /// this run already sees the mapping.
    pub fn record_fallback(&mut self, line: &str, train_number: &str) -> Result<()> {
        self.append_number(line, train_number)?;
        self.rebuild()
    }

    /// End-of-run merge of confidently observed (line, number) pairs.
    /// Additive only; an observation whose number already belongs to an
    /// unconnected line is skipped rather than poisoning the index. The
    /// guard checks the pending definitions, not the derived index, so an
    /// observation appended earlier in the same call is already visible.
    pub fn merge_observations(&mut self, observations: &[Observation]) -> Result<usize> {
        let mut added = 0;
        for obs in observations {
            if let Some(holder) = self.conflicting_holder(&obs.line, &obs.train_number) {
                warn!(
                    "skipping observation ({}, {}): number already on {}",
                    obs.line, obs.train_number, holder
                );
                continue;
            }
            if self.append_number(&obs.line, &obs.train_number)? {
                added += 1;
            }
        }
        if added > 0 {
            self.rebuild()?;
        }
        Ok(added)
    }

    /// A line other than `line` that already declares `train_number` without
    /// being connected to `line` in either direction.
    fn conflicting_holder(&self, line: &str, train_number: &str) -> Option<String> {
        let connected = |a: &str, b: &str| {
            self.defs.values().any(|d| {
                (d.line == a && d.connected_lines.iter().any(|c| c == b))
                    || (d.line == b && d.connected_lines.iter().any(|c| c == a))
            })
        };
        self.defs
            .values()
            .filter(|d| d.line != line && d.train_numbers.iter().any(|n| n == train_number))
            .find(|d| !connected(&d.line, line))
            .map(|d| d.line.clone())
    }

    fn rebuild(&mut self) -> Result<()> {
        self.knowledge = Knowledge::build(self.defs.values())?;
        Ok(())
    }

    /// Returns true if the number was new for that line. Creates the
    /// definition file on first contact with a line.
    fn append_number(&mut self, line: &str, train_number: &str) -> Result<bool> {
        let def = self
            .defs
            .entry(line.to_string())
            .or_insert_with(|| LineDefinition {
                line: line.to_string(),
                train_numbers: Vec::new(),
                connected_lines: Vec::new(),
            });
        if def.train_numbers.iter().any(|n| n == train_number) {
            return Ok(false);
        }
        def.train_numbers.push(train_number.to_string());
        let def = def.clone();
        self.write_definition(&def)?;
        Ok(true)
    }

    fn write_definition(&self, def: &LineDefinition) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", def.line));
        let tmp = self.dir.join(format!("{}.json.tmp", def.line));
        let json = serde_json::to_string_pretty(def)?;
        fs::write(&tmp, json)
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

fn read_definition(path: &Path) -> Result<LineDefinition> {
    let raw = fs::read_to_string(path)?;
    let def: LineDefinition = serde_json::from_str(&raw)?;
    Ok(def)
}
