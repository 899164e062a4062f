//! Stage fingerprints.
//!
//! `fingerprint = sha256(logic_digest || inputs_digest)` where the logic
//! digest covers the stage id, its logic version and any settings that
//! change its output, and the inputs digest covers every file matched by
//! the stage's input globs, in sorted path order.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Directory an input glob is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Root {
    /// The hand-authored ontology directory.
    Ontology,
    /// The build directory (upstream stage artifacts).
    Build,
}

impl Root {
    fn tag(self) -> &'static [u8] {
        match self {
            Self::Ontology => b"ontology",
            Self::Build => b"build",
        }
    }
}

/// One declared stage input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGlob {
    /// Resolution root.
    pub root: Root,
    /// Glob relative to the root, `/`-separated.
    pub pattern: &'static str,
}

impl InputGlob {
    /// An input under the ontology directory.
    #[must_use]
    pub const fn ontology(pattern: &'static str) -> Self {
        Self {
            root: Root::Ontology,
            pattern,
        }
    }

    /// An input under the build directory.
    #[must_use]
    pub const fn build(pattern: &'static str) -> Self {
        Self {
            root: Root::Build,
            pattern,
        }
    }
}

/// Compiles `patterns` into one matcher.
///
/// # Errors
///
/// Returns an error if a pattern is not a valid glob.
pub fn glob_set<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("Invalid input glob `{pattern}`"))?;
        builder.add(glob);
    }
    builder.build().context("Failed to compile input globs")
}

/// Returns the root-relative paths of files under `dir` matching `set`,
/// sorted. A missing directory matches nothing.
#[must_use]
pub fn matched_files(dir: &Path, set: &GlobSet) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .filter(|rel| set.is_match(rel))
        .collect();
    files.sort();
    files
}

/// Hashes the files matched by `inputs`, resolving each root through `dir_of`.
///
/// Each file contributes its root, relative path, length and bytes, so
/// renames and moves between files change the digest.
///
/// # Errors
///
/// Returns an error if a glob is invalid or a matched file cannot be read.
pub fn inputs_digest(inputs: &[InputGlob], dir_of: impl Fn(Root) -> PathBuf) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut files = 0usize;
    for root in [Root::Ontology, Root::Build] {
        let patterns: Vec<&str> = inputs
            .iter()
            .filter(|g| g.root == root)
            .map(|g| g.pattern)
            .collect();
        if patterns.is_empty() {
            continue;
        }
        let dir = dir_of(root);
        let set = glob_set(patterns)?;
        for rel in matched_files(&dir, &set) {
            let path = dir.join(&rel);
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            hasher.update(root.tag());
            hasher.update([0u8]);
            hasher.update(rel.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update([0u8]);
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
            files += 1;
        }
    }
    tracing::debug!(files, "hashed stage inputs");
    Ok(hex::encode(hasher.finalize()))
}

/// Hashes the parts that define a stage's logic.
#[must_use]
pub fn logic_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Combines the logic and inputs digests into the stage fingerprint.
#[must_use]
pub fn combine(logic: &str, inputs: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(logic.as_bytes());
    hasher.update(inputs.as_bytes());
    hex::encode(hasher.finalize())
}
