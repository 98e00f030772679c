//! Marketplace root: configuration, index and package directories together

use std::path::{Path, PathBuf};

use crate::capability::CapabilityCatalog;
use crate::config::Config;
use crate::error::{MarketError, Result};
use crate::plugin::manifest::PackageManifest;
use crate::plugin::registry::{self, normalize, DiscoveredPackage, Reconciliation, RegistryIndex};
use crate::plugin::resolver::{resolve, CapabilityBinding, InstallationSet};
use crate::plugin::validator::{validate, DiagnosticKind, Severity, ValidationResult};
use crate::report::{report_with_registry, Report};

pub struct Marketplace {
    root: PathBuf,
    config: Config,
    index: RegistryIndex,
}

/// Everything `verify` found, before rendering
#[derive(Debug, Clone)]
pub struct Verification {
    pub reconciliation: Reconciliation,
    pub results: Vec<ValidationResult>,
    pub bindings: Vec<CapabilityBinding>,
}

impl Verification {
    pub fn report(&self) -> Report {
        report_with_registry(&self.reconciliation, &self.results, &self.bindings)
    }
}

impl Marketplace {
    /// Load config and index from `root`
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        let index = registry::load(&config.index_path(root))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    pub fn discover(&self) -> Result<Vec<DiscoveredPackage>> {
        registry::discover(&self.root, &self.config.plugins_dir(&self.root))
    }

    pub fn reconcile(&self) -> Result<Reconciliation> {
        Ok(registry::reconcile(&self.index, &self.discover()?))
    }

    /// Directory of the package `name`: its index source, else a discovered
    /// directory carrying that name
    pub fn package_dir(&self, name: &str) -> Result<PathBuf> {
        if let Some(entry) = self.index.get(name) {
            let dir = self.root.join(normalize(Path::new(&entry.source)));
            if dir.is_dir() {
                return Ok(dir);
            }
        }

        self.discover()?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| self.root.join(p.path))
            .ok_or_else(|| MarketError::PackageNotFound {
                name: name.to_string(),
            })
    }

    pub fn validate(&self, name: &str) -> Result<ValidationResult> {
        Ok(validate(&self.package_dir(name)?))
    }

    /// Validate every discovered package; one failure never stops the rest
    pub fn validate_all(&self) -> Result<Vec<ValidationResult>> {
        Ok(self
            .discover()?
            .iter()
            .map(|p| validate(&self.root.join(&p.path)))
            .collect())
    }

    /// Manifests of every discovered package that parses
    fn manifests(&self, packages: &[DiscoveredPackage]) -> Vec<PackageManifest> {
        packages
            .iter()
            .filter_map(|p| match PackageManifest::load(&self.root.join(&p.path)) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    tracing::debug!("skipping {}: {}", p.path.display(), e);
                    None
                }
            })
            .collect()
    }

    pub fn catalog(&self) -> Result<CapabilityCatalog> {
        Ok(CapabilityCatalog::from_manifests(
            &self.manifests(&self.discover()?),
        ))
    }

    /// Installation set of every package in the registry that validates
    pub fn registry_set(&self) -> Result<InstallationSet> {
        let mut set = InstallationSet::new();
        for package in self.discover()? {
            let dir = self.root.join(&package.path);
            if !validate(&dir).passed() {
                continue;
            }
            if let Ok(manifest) = PackageManifest::load(&dir) {
                set.insert_manifest(&manifest);
            }
        }
        Ok(set)
    }

    /// Reconcile, validate every package on disk (drifted and orphaned ones
    /// included), flag consumed capabilities nothing provides, and resolve
    /// bindings over the valid ones
    pub fn verify(&self) -> Result<Verification> {
        let discovered = self.discover()?;
        let reconciliation = registry::reconcile(&self.index, &discovered);
        let catalog = CapabilityCatalog::from_manifests(&self.manifests(&discovered));

        let mut results = Vec::new();
        let mut set = InstallationSet::new();
        for package in &discovered {
            let dir = self.root.join(&package.path);
            let mut result = validate(&dir);

            if let Ok(manifest) = PackageManifest::load(&dir) {
                for name in catalog.unknown_consumed(&manifest) {
                    result.push(
                        Severity::Warning,
                        DiagnosticKind::Capability,
                        format!("consumes unknown capability '{}': nothing in the registry provides it", name),
                    );
                }
                if result.passed() {
                    set.insert_manifest(&manifest);
                }
            }

            results.push(result);
        }

        let bindings = resolve(&set);
        tracing::info!(
            "verified {} package(s), {} drift finding(s)",
            results.len(),
            reconciliation.missing.len()
        );

        Ok(Verification {
            reconciliation,
            results,
            bindings,
        })
    }
}
