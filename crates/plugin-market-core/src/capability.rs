//! Capability names
//!
//! A capability is a named optional facility one package provides and
//! another may consume. Names are kebab-case slugs checked against the
//! closed set of names the registry actually provides.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::plugin::manifest::{is_slug, PackageManifest};

/// Validated capability identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CapabilityName(String);

impl CapabilityName {
    /// Parse a capability name, returning `None` if it is not a kebab-case slug
    pub fn parse(raw: &str) -> Option<Self> {
        if is_slug(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of capability names provided somewhere in the registry
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    providers: BTreeMap<CapabilityName, BTreeSet<String>>,
}

impl CapabilityCatalog {
    /// Build from every manifest in the registry. Malformed names are skipped;
    /// the validator reports them on their own package.
    pub fn from_manifests<'a>(manifests: impl IntoIterator<Item = &'a PackageManifest>) -> Self {
        let mut providers: BTreeMap<CapabilityName, BTreeSet<String>> = BTreeMap::new();
        for manifest in manifests {
            let Some(owner) = manifest.name.as_deref() else {
                continue;
            };
            for name in manifest.provided_capabilities() {
                providers
                    .entry(name)
                    .or_default()
                    .insert(owner.to_string());
            }
        }
        Self { providers }
    }

    pub fn contains(&self, name: &CapabilityName) -> bool {
        self.providers.contains_key(name)
    }

    /// Packages providing `name`, in name order
    pub fn providers(&self, name: &CapabilityName) -> impl Iterator<Item = &str> {
        self.providers
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn names(&self) -> impl Iterator<Item = &CapabilityName> {
        self.providers.keys()
    }

    /// Consumed names of `manifest` that nothing in the registry provides
    pub fn unknown_consumed(&self, manifest: &PackageManifest) -> Vec<CapabilityName> {
        manifest
            .consumed_capabilities()
            .into_iter()
            .filter(|name| !self.contains(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(json: &str) -> PackageManifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_accepts_kebab_case_only() {
        assert!(CapabilityName::parse("docs-search").is_some());
        assert!(CapabilityName::parse("lsp").is_some());
        assert!(CapabilityName::parse("Docs_Search").is_none());
        assert!(CapabilityName::parse("docs--search").is_none());
        assert!(CapabilityName::parse("").is_none());
    }

    #[test]
    fn catalog_collects_providers() {
        let a = manifest(r#"{"name": "a", "capabilities": {"provides": ["docs-search"]}}"#);
        let b = manifest(r#"{"name": "b", "capabilities": {"provides": ["docs-search", "lint"]}}"#);
        let catalog = CapabilityCatalog::from_manifests([&a, &b]);

        let docs = CapabilityName::parse("docs-search").unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.providers(&docs).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn unknown_consumed_catches_typos() {
        let provider = manifest(r#"{"name": "p", "capabilities": {"provides": ["docs-search"]}}"#);
        let consumer = manifest(
            r#"{"name": "c", "capabilities": {"consumes": ["docs-serach", "docs-search"]}}"#,
        );
        let catalog = CapabilityCatalog::from_manifests([&provider, &consumer]);

        let unknown = catalog.unknown_consumed(&consumer);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].as_str(), "docs-serach");
    }
}
