//! Directory-backed data point store

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::types::{DataPoint, ShapePolicy, TestSet};
use crate::error::{ValidationError, ValidationResult};

const FAIL_TO_PASS_KEYS: [&str; 2] = ["FAIL_TO_PASS", "fail_to_pass"];
const PASS_TO_PASS_KEYS: [&str; 2] = ["PASS_TO_PASS", "pass_to_pass"];
const KNOWN_FIELDS: [&str; 9] = [
    "instance_id",
    "repo",
    "base_commit",
    "patch",
    "test_patch",
    "FAIL_TO_PASS",
    "fail_to_pass",
    "PASS_TO_PASS",
    "pass_to_pass",
];

/// One record read from disk, valid or not.
#[derive(Debug)]
pub struct LoadedRecord {
    /// File the record came from
    pub source: PathBuf,
    /// Instance id when readable, otherwise a location inside `source`
    pub key: String,
    pub result: ValidationResult<DataPoint>,
}

/// Reads data point records from a directory of `.json` / `.jsonl` files.
///
/// Only the top level of the directory is read. Files are visited in name
/// order so batches are reproducible.
pub struct DataPointStore {
    root: PathBuf,
    policy: ShapePolicy,
}

impl DataPointStore {
    pub fn new(root: impl Into<PathBuf>, policy: ShapePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every record in the store, including the malformed ones.
    ///
    /// Only a missing root directory fails the scan; a file that cannot be
    /// read becomes a malformed record. Symlinked record files are followed.
    pub fn scan(&self) -> ValidationResult<Vec<LoadedRecord>> {
        if !self.root.is_dir() {
            return Err(ValidationError::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "data directory not found"),
            ));
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(&self.root).to_path_buf();
                    if is_record_file(&path) {
                        records.push(unreadable(&path, &e));
                    } else {
                        warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    }
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_record_file(entry.path()) {
                continue;
            }
            debug!(path = %entry.path().display(), "reading data point file");
            records.extend(self.read_file(entry.path()));
        }

        info!(
            dir = %self.root.display(),
            records = records.len(),
            "scanned data point store"
        );
        Ok(records)
    }

    /// Every valid data point; malformed records are logged and skipped.
    pub fn load_all(&self) -> ValidationResult<Vec<DataPoint>> {
        let mut points = Vec::new();
        for record in self.scan()? {
            match record.result {
                Ok(point) => points.push(point),
                Err(e) => warn!(source = %record.source.display(), error = %e, "skipping record"),
            }
        }
        Ok(points)
    }

    /// Load one data point by instance id.
    ///
    /// `<instance_id>.json` is tried first, then the whole store.
    pub fn load(&self, instance_id: &str) -> ValidationResult<DataPoint> {
        let direct = self.root.join(format!("{}.json", instance_id));
        if direct.is_file() {
            if let Some(record) = self
                .read_file(&direct)
                .into_iter()
                .find(|r| r.key == instance_id)
            {
                return record.result;
            }
        }

        self.scan()?
            .into_iter()
            .find(|r| r.key == instance_id)
            .map(|r| r.result)
            .unwrap_or_else(|| {
                Err(ValidationError::NotFound {
                    instance_id: instance_id.to_string(),
                })
            })
    }

    /// Records from the named files. A name without an extension gets
    /// `.json` appended; a missing file yields a `NotFound` record.
    pub fn load_files(&self, names: &[String]) -> ValidationResult<Vec<LoadedRecord>> {
        let mut records = Vec::new();
        for name in names {
            let file_name = if name.ends_with(".json") || name.ends_with(".jsonl") {
                name.clone()
            } else {
                format!("{}.json", name)
            };
            let path = self.root.join(&file_name);
            if !path.is_file() {
                warn!(file = %file_name, "data point file not found");
                records.push(LoadedRecord {
                    source: path,
                    key: name.clone(),
                    result: Err(ValidationError::NotFound {
                        instance_id: name.clone(),
                    }),
                });
                continue;
            }
            records.extend(self.read_file(&path));
        }
        Ok(records)
    }

    /// Validate a raw JSON record against this store's policy.
    pub fn validate_shape(&self, raw: &Value) -> ValidationResult<DataPoint> {
        validate_shape(raw, &self.policy)
    }

    fn read_file(&self, path: &Path) -> Vec<LoadedRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return vec![unreadable(path, &e)],
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let is_jsonl = path.extension().and_then(|e| e.to_str()) == Some("jsonl");
        let mut records = Vec::new();

        if is_jsonl {
            for (idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let fallback = format!("{}:{}", stem, idx + 1);
                records.push(self.record_from_text(path, line, fallback));
            }
            return records;
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(items)) => {
                for (idx, item) in items.iter().enumerate() {
                    records.push(self.record_from_value(path, item, format!("{}[{}]", stem, idx)));
                }
            }
            Ok(value) => records.push(self.record_from_value(path, &value, stem)),
            Err(e) => records.push(unparseable(path, stem, &e)),
        }
        records
    }

    fn record_from_text(&self, path: &Path, text: &str, fallback: String) -> LoadedRecord {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.record_from_value(path, &value, fallback),
            Err(e) => unparseable(path, fallback, &e),
        }
    }

    fn record_from_value(&self, path: &Path, value: &Value, fallback: String) -> LoadedRecord {
        let key = value
            .get("instance_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(String::from)
            .unwrap_or(fallback);
        LoadedRecord {
            source: path.to_path_buf(),
            key,
            result: validate_shape(value, &self.policy),
        }
    }
}

fn unparseable(path: &Path, key: String, err: &serde_json::Error) -> LoadedRecord {
    warn!(path = %path.display(), error = %err, "invalid JSON in data point file");
    LoadedRecord {
        source: path.to_path_buf(),
        key: key.clone(),
        result: Err(ValidationError::MalformedRecord {
            key,
            problems: vec![format!("invalid JSON: {}", err)],
        }),
    }
}

fn unreadable(path: &Path, err: &dyn std::fmt::Display) -> LoadedRecord {
    warn!(path = %path.display(), error = %err, "unreadable data point file");
    let key = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();
    LoadedRecord {
        source: path.to_path_buf(),
        key: key.clone(),
        result: Err(ValidationError::MalformedRecord {
            key,
            problems: vec![format!("unreadable: {}", err)],
        }),
    }
}

fn is_record_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("jsonl")
    )
}

/// Check a raw record and build a [`DataPoint`] from it.
///
/// Every problem found is reported, not only the first one.
pub fn validate_shape(raw: &Value, policy: &ShapePolicy) -> ValidationResult<DataPoint> {
    let Some(object) = raw.as_object() else {
        return Err(ValidationError::MalformedRecord {
            key: "<unknown>".to_string(),
            problems: vec!["record is not a JSON object".to_string()],
        });
    };

    let mut problems = Vec::new();

    let instance_id = required_string(raw, "instance_id", &mut problems);
    let repo = required_string(raw, "repo", &mut problems);
    let base_commit = required_string(raw, "base_commit", &mut problems);
    let patch = match raw.get("patch") {
        None | Some(Value::Null) => {
            problems.push("missing field 'patch'".to_string());
            None
        }
        Some(Value::String(p)) if p.trim().is_empty() => {
            problems.push("patch is empty".to_string());
            None
        }
        Some(Value::String(p)) => Some(p.clone()),
        Some(_) => {
            problems.push("field 'patch' must be a string".to_string());
            None
        }
    };
    let test_patch = match raw.get("test_patch") {
        None | Some(Value::Null) => None,
        Some(Value::String(p)) => Some(p.clone()),
        Some(_) => {
            problems.push("field 'test_patch' must be a string".to_string());
            None
        }
    };

    let fail_to_pass = test_set(raw, &FAIL_TO_PASS_KEYS, &mut problems);
    let pass_to_pass = test_set(raw, &PASS_TO_PASS_KEYS, &mut problems);

    if let Some(f2p) = &fail_to_pass {
        if f2p.is_empty() {
            problems.push("FAIL_TO_PASS is empty".to_string());
        }
    }
    if let Some(p2p) = &pass_to_pass {
        if p2p.is_empty() && policy.require_pass_to_pass {
            problems.push("PASS_TO_PASS is empty".to_string());
        }
    }
    if let (Some(f2p), Some(p2p)) = (&fail_to_pass, &pass_to_pass) {
        let overlap: Vec<&str> = f2p
            .iter()
            .filter(|t| p2p.contains(*t))
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() {
            problems.push(format!(
                "tests listed in both FAIL_TO_PASS and PASS_TO_PASS: {}",
                overlap.join(", ")
            ));
        }
    }

    if !problems.is_empty() {
        let key = instance_id.unwrap_or_else(|| "<unknown>".to_string());
        return Err(ValidationError::MalformedRecord { key, problems });
    }

    let metadata: IndexMap<String, Value> = object
        .iter()
        .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    // All `None`s pushed a problem above.
    match (instance_id, repo, base_commit, patch, fail_to_pass, pass_to_pass) {
        (
            Some(instance_id),
            Some(repo),
            Some(base_commit),
            Some(patch),
            Some(fail_to_pass),
            Some(pass_to_pass),
        ) => Ok(DataPoint {
            instance_id,
            repo,
            base_commit,
            patch,
            test_patch,
            fail_to_pass,
            pass_to_pass,
            metadata,
        }),
        _ => Err(ValidationError::MalformedRecord {
            key: "<unknown>".to_string(),
            problems: vec!["incomplete record".to_string()],
        }),
    }
}

fn required_string(raw: &Value, field: &str, problems: &mut Vec<String>) -> Option<String> {
    match raw.get(field) {
        None | Some(Value::Null) => {
            problems.push(format!("missing field '{}'", field));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            problems.push(format!("field '{}' is empty", field));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            problems.push(format!("field '{}' must be a string", field));
            None
        }
    }
}

/// A test set is a JSON array of strings, or a string holding one.
fn test_set(raw: &Value, keys: &[&str], problems: &mut Vec<String>) -> Option<TestSet> {
    let name = keys[0];
    let Some(value) = keys.iter().find_map(|k| raw.get(*k)).filter(|v| !v.is_null()) else {
        problems.push(format!("missing field '{}'", name));
        return None;
    };

    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(encoded) if encoded.trim().is_empty() => Vec::new(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Array(items)) => items,
            _ => {
                problems.push(format!("{} is not a JSON-encoded list", name));
                return None;
            }
        },
        _ => {
            problems.push(format!("{} must be a list of test ids", name));
            return None;
        }
    };

    let mut set = TestSet::new();
    let mut ok = true;
    for (idx, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(id) => {
                set.insert(id.to_string());
            }
            None => {
                problems.push(format!("{}[{}] is not a string", name, idx));
                ok = false;
            }
        }
    }
    ok.then_some(set)
}
