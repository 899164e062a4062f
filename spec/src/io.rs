//! Artifact readers and writers.
//!
//! JSONL files carry one object per line; blank lines and lines starting with
//! `//` are skipped. Every parse error names the file and 1-based line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

/// One data line of a JSONL file, with its 1-based line number.
#[derive(Debug, Clone)]
pub struct JsonLine {
    /// 1-based line number in the source file.
    pub line: usize,
    /// Parsed value.
    pub value: Value,
}

/// Returns the data lines of JSONL `content` as `(line_no, text)`.
pub fn data_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, text)| (i + 1, text.trim()))
        .filter(|(_, text)| !text.is_empty() && !text.starts_with("//"))
}

/// Reads a JSONL file into raw values, keeping line numbers.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any data line is not valid JSON.
pub fn read_jsonl_values(path: &Path) -> Result<Vec<JsonLine>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    data_lines(&content)
        .map(|(line, text)| {
            serde_json::from_str(text)
                .map(|value| JsonLine { line, value })
                .with_context(|| format!("{}:{}: invalid JSON", path.display(), line))
        })
        .collect()
}

/// Reads a JSONL file into typed records.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any line does not match `T`.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    data_lines(&content)
        .map(|(line, text)| {
            serde_json::from_str(text)
                .with_context(|| format!("{}:{}: invalid record", path.display(), line))
        })
        .collect()
}

/// Writes typed records as JSONL, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if serialization fails or the file cannot be written.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row).context("Failed to serialize JSONL row")?);
        out.push('\n');
    }
    write_text(path, &out)
}

/// Reads a JSON document into `T`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes `value` as pretty JSON with a trailing newline.
///
/// # Errors
///
/// Returns an error if serialization fails or the file cannot be written.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    text.push('\n');
    write_text(path, &text)
}

/// Writes text to a file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if directories cannot be created or the file cannot be written.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Locates `rules/<stem>.jsonl` or `rules/<stem>.json`, preferring JSONL.
#[must_use]
pub fn rule_file_path(rules_dir: &Path, stem: &str) -> Option<PathBuf> {
    ["jsonl", "json"]
        .iter()
        .map(|ext| rules_dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Reads a rule file that may be JSONL or a JSON array. A missing file
/// yields no records.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_rule_file<T: DeserializeOwned>(rules_dir: &Path, stem: &str) -> Result<Vec<T>> {
    let Some(path) = rule_file_path(rules_dir, stem) else {
        tracing::debug!(rule = stem, "rule file absent");
        return Ok(Vec::new());
    };
    if path.extension().is_some_and(|e| e == "jsonl") {
        return read_jsonl(&path);
    }
    let value: Value = read_json(&path)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .with_context(|| format!("{}: invalid record at index {}", path.display(), i))
            })
            .collect(),
        _ => bail!("{}: expected a JSON array of records", path.display()),
    }
}

/// Reads a keyed rule table from `rules/<stem>.json`. A missing file yields
/// the empty table.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_rule_map<T: DeserializeOwned + Default>(rules_dir: &Path, stem: &str) -> Result<T> {
    let path = rules_dir.join(format!("{stem}.json"));
    if !path.is_file() {
        tracing::debug!(rule = stem, "rule table absent");
        return Ok(T::default());
    }
    read_json(&path)
}

/// Returns every file under `dir` with extension `ext`, sorted by path.
/// A missing directory yields no files.
#[must_use]
pub fn collect_files(dir: &Path, ext: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|x| x == ext))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
