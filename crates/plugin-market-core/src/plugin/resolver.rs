//! Capability Resolver
//!
//! Binds each consumed capability to a provider within an explicit
//! installation set. Consumed capabilities are optional: an unmet one only
//! marks its binding unresolved.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::capability::CapabilityName;
use crate::plugin::manifest::PackageManifest;

/// Capabilities of one member of an installation set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageCapabilities {
    pub provides: BTreeSet<CapabilityName>,
    pub consumes: BTreeSet<CapabilityName>,
}

impl PackageCapabilities {
    pub fn from_manifest(manifest: &PackageManifest) -> Self {
        Self {
            provides: manifest.provided_capabilities().into_iter().collect(),
            consumes: manifest.consumed_capabilities().into_iter().collect(),
        }
    }
}

/// The packages considered present, keyed by package name
#[derive(Debug, Clone, Default)]
pub struct InstallationSet {
    packages: BTreeMap<String, PackageCapabilities>,
}

impl InstallationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, capabilities: PackageCapabilities) {
        self.packages.insert(name.into(), capabilities);
    }

    /// Add a manifest; manifests without a name cannot take part and are skipped
    pub fn insert_manifest(&mut self, manifest: &PackageManifest) {
        if let Some(name) = manifest.name.as_deref() {
            self.insert(name, PackageCapabilities::from_manifest(manifest));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, PackageCapabilities)> for InstallationSet {
    fn from_iter<I: IntoIterator<Item = (N, PackageCapabilities)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, capabilities) in iter {
            set.insert(name, capabilities);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityBinding {
    pub consumer: String,
    pub capability: CapabilityName,
    /// Bound provider: the lexicographically smallest one present
    pub provider: Option<String>,
    /// Other providers present, informational
    pub alternates: Vec<String>,
    pub resolved: bool,
}

/// Resolve every consumed capability in `set`.
///
/// Output is sorted by consumer then capability, so it never depends on
/// the order packages were added.
pub fn resolve(set: &InstallationSet) -> Vec<CapabilityBinding> {
    let mut providers: BTreeMap<&CapabilityName, BTreeSet<&str>> = BTreeMap::new();
    for (name, capabilities) in &set.packages {
        for capability in &capabilities.provides {
            providers.entry(capability).or_default().insert(name.as_str());
        }
    }

    let mut bindings = Vec::new();
    for (consumer, capabilities) in &set.packages {
        for capability in &capabilities.consumes {
            let mut candidates = providers
                .get(capability)
                .into_iter()
                .flatten()
                .map(|p| p.to_string());
            let provider = candidates.next();
            let alternates: Vec<String> = candidates.collect();

            if provider.is_none() {
                tracing::debug!("{} runs without optional capability {}", consumer, capability);
            }

            bindings.push(CapabilityBinding {
                consumer: consumer.clone(),
                capability: capability.clone(),
                resolved: provider.is_some(),
                provider,
                alternates,
            });
        }
    }

    bindings
}

/// Bindings whose capability has no provider in the set
pub fn unresolved(bindings: &[CapabilityBinding]) -> impl Iterator<Item = &CapabilityBinding> {
    bindings.iter().filter(|b| !b.resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(provides: &[&str], consumes: &[&str]) -> PackageCapabilities {
        let typed = |names: &[&str]| {
            names
                .iter()
                .map(|n| CapabilityName::parse(n).unwrap())
                .collect()
        };
        PackageCapabilities {
            provides: typed(provides),
            consumes: typed(consumes),
        }
    }

    #[test]
    fn unmet_capability_is_unresolved() {
        let set: InstallationSet = [("x", caps(&[], &["docs-search"]))].into_iter().collect();
        let bindings = resolve(&set);

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].consumer, "x");
        assert!(!bindings[0].resolved);
        assert!(bindings[0].provider.is_none());
        assert_eq!(unresolved(&bindings).count(), 1);
    }

    #[test]
    fn smallest_provider_wins_rest_are_alternates() {
        let set: InstallationSet = [
            ("consumer", caps(&[], &["docs-search"])),
            ("zeta-docs", caps(&["docs-search"], &[])),
            ("alpha-docs", caps(&["docs-search"], &[])),
            ("mid-docs", caps(&["docs-search"], &[])),
        ]
        .into_iter()
        .collect();

        let bindings = resolve(&set);
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].resolved);
        assert_eq!(bindings[0].provider.as_deref(), Some("alpha-docs"));
        assert_eq!(bindings[0].alternates, vec!["mid-docs", "zeta-docs"]);
    }

    #[test]
    fn provider_outside_set_does_not_count() {
        let set: InstallationSet = [
            ("a", caps(&[], &["lint"])),
            ("b", caps(&["format"], &[])),
        ]
        .into_iter()
        .collect();

        let bindings = resolve(&set);
        assert!(!bindings[0].resolved);
    }

    #[test]
    fn order_independent() {
        let a = ("a", caps(&["lint"], &["docs-search"]));
        let b = ("b", caps(&["docs-search"], &["lint", "format"]));
        let c = ("c", caps(&["docs-search", "format"], &[]));

        let forward: InstallationSet = [a.clone(), b.clone(), c.clone()].into_iter().collect();
        let backward: InstallationSet = [c.clone(), b.clone(), a.clone()].into_iter().collect();
        let shuffled: InstallationSet = [b, a, c].into_iter().collect();

        let expected = resolve(&forward);
        assert_eq!(expected.len(), 3);
        assert_eq!(resolve(&backward), expected);
        assert_eq!(resolve(&shuffled), expected);
    }

    #[test]
    fn from_manifest_skips_malformed_names() {
        let manifest: PackageManifest = serde_json::from_str(
            r#"{"name": "x", "capabilities": {"consumes": ["docs-search", "Not Valid"]}}"#,
        )
        .unwrap();
        let mut set = InstallationSet::new();
        set.insert_manifest(&manifest);

        assert!(set.contains("x"));
        assert_eq!(resolve(&set).len(), 1);
    }
}
