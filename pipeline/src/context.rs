//! Per-build state shared by every stage.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use anyhow::Result;
use taxograph_spec::layout::build;
use taxograph_spec::TransformRegistry;

use crate::config::BuildConfig;
use crate::fingerprint::Root;

/// Directories, settings and the lazily built transform registry of one
/// build invocation.
#[derive(Debug)]
pub struct StageContext {
    ontology: PathBuf,
    build: PathBuf,
    config: BuildConfig,
    registry: OnceCell<TransformRegistry>,
}

impl StageContext {
    /// Creates a context for one build.
    #[must_use]
    pub fn new(ontology: PathBuf, build: PathBuf, config: BuildConfig) -> Self {
        Self {
            ontology,
            build,
            config,
            registry: OnceCell::new(),
        }
    }

    /// Ontology source directory.
    #[must_use]
    pub fn ontology_dir(&self) -> &Path {
        &self.ontology
    }

    /// Build directory.
    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build
    }

    /// Build settings.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Resolves a path relative to the ontology directory.
    #[must_use]
    pub fn source(&self, rel: &str) -> PathBuf {
        self.ontology.join(rel)
    }

    /// Resolves a path relative to the build directory.
    #[must_use]
    pub fn artifact(&self, rel: &str) -> PathBuf {
        self.build.join(rel)
    }

    /// Directory an input glob root refers to.
    #[must_use]
    pub fn root_dir(&self, root: Root) -> PathBuf {
        match root {
            Root::Ontology => self.ontology.clone(),
            Root::Build => self.build.clone(),
        }
    }

    /// Returns the transform registry, loading `tmp/transforms_canon.json`
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the canon file is missing or malformed.
    pub fn registry(&self) -> Result<&TransformRegistry> {
        if let Some(registry) = self.registry.get() {
            return Ok(registry);
        }
        let registry = TransformRegistry::load(&self.artifact(build::TRANSFORMS_CANON))?;
        tracing::debug!(transforms = registry.len(), "transform registry loaded");
        Ok(self.registry.get_or_init(|| registry))
    }

    /// Installs the registry the transforms stage just produced. Has no
    /// effect if a registry was already loaded.
    pub fn install_registry(&self, registry: TransformRegistry) {
        if self.registry.set(registry).is_err() {
            tracing::debug!("transform registry already loaded");
        }
    }
}
