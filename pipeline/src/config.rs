//! Build settings from the optional `taxograph.toml` in the ontology directory.
//!
//! ```toml
//! [canon]
//! signature_width = 12
//!
//! [substrates]
//! part_changing_fallback = ["tf:mill", "tf:press"]
//!
//! [cache]
//! enabled = true
//! ```
//!
//! Every section and key is optional; a missing file yields the defaults.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use taxograph_compiler::canon::signature::{DEFAULT_WIDTH, MAX_WIDTH, MIN_WIDTH};
use taxograph_compiler::substrates::{SubstrateConfig, DEFAULT_PART_CHANGING_FALLBACK};
use taxograph_spec::layout::ontology;

/// Parsed `taxograph.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// `[canon]`
    pub canon: CanonSettings,
    /// `[substrates]`
    pub substrates: SubstrateSettings,
    /// `[cache]`
    pub cache: CacheSettings,
}

/// `[canon]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanonSettings {
    /// Hex characters of the identity hash kept in TPT ids.
    pub signature_width: usize,
}

impl Default for CanonSettings {
    fn default() -> Self {
        Self {
            signature_width: DEFAULT_WIDTH,
        }
    }
}

/// `[substrates]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubstrateSettings {
    /// Transforms accepted in part promotions regardless of their class.
    pub part_changing_fallback: Vec<String>,
}

impl Default for SubstrateSettings {
    fn default() -> Self {
        Self {
            part_changing_fallback: DEFAULT_PART_CHANGING_FALLBACK
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Whether unchanged stages may be skipped.
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl BuildConfig {
    /// Loads `taxograph.toml` from `ontology_dir`, or the defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable, malformed, or
    /// holds an out-of-range value.
    pub fn load(ontology_dir: &Path) -> Result<Self> {
        let path = ontology_dir.join(ontology::CONFIG);
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no build config; using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Invalid build config {}", path.display()))
    }

    /// Parses and validates a config document.
    ///
    /// # Errors
    ///
    /// Returns an error on TOML syntax errors, unknown keys, or a signature
    /// width outside the supported range.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse TOML")?;
        let width = config.canon.signature_width;
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
            bail!("canon.signature_width must be between {MIN_WIDTH} and {MAX_WIDTH}, got {width}");
        }
        Ok(config)
    }

    /// Returns the substrate engine settings.
    #[must_use]
    pub fn substrate_config(&self) -> SubstrateConfig {
        SubstrateConfig {
            part_changing_fallback: self.substrates.part_changing_fallback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = BuildConfig::parse("").expect("parse");
        assert_eq!(config, BuildConfig::default());
        assert!(config.cache.enabled);
        assert_eq!(config.canon.signature_width, DEFAULT_WIDTH);
        assert_eq!(config.substrate_config(), SubstrateConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = BuildConfig::parse(
            "[canon]\nsignature_width = 16\n\n[substrates]\npart_changing_fallback = [\"tf:mill\"]\n\n[cache]\nenabled = false\n",
        )
        .expect("parse");
        assert_eq!(config.canon.signature_width, 16);
        assert_eq!(
            config.substrates.part_changing_fallback,
            vec!["tf:mill".to_owned()]
        );
        assert!(!config.cache.enabled);
    }

    #[test]
    fn out_of_range_width_is_rejected() {
        let err = BuildConfig::parse("[canon]\nsignature_width = 2\n").unwrap_err();
        assert!(err.to_string().contains("signature_width"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BuildConfig::parse("[cache]\nenable = false\n").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            BuildConfig::load(dir.path()).expect("load"),
            BuildConfig::default()
        );
    }
}
