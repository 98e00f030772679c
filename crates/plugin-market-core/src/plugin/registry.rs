//! Marketplace Registry
//!
//! Loads the marketplace index, discovers package directories on disk and
//! reconciles the two.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::plugin::manifest::{Author, PackageManifest};
use crate::plugin::package::dir_name;

/// Index document: a bare list of entries, or a marketplace object holding them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IndexDocument {
    Entries(Vec<IndexEntry>),
    Marketplace(MarketplaceDocument),
}

#[derive(Debug, Clone, Deserialize)]
struct MarketplaceDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owner: Option<Author>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    plugins: Vec<IndexEntry>,
}

/// One package entry in the marketplace index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Package name (must equal the manifest name)
    pub name: String,
    /// Package directory, relative to the marketplace root
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Parsed marketplace index, entries kept in file order
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<IndexEntry>,
}

impl RegistryIndex {
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Case-insensitive search over name, description, category and keywords
    pub fn search(&self, query: &str) -> Vec<&IndexEntry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| matches_query(e, &query))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn matches_query(entry: &IndexEntry, query: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(query);

    contains(entry.name.as_str())
        || entry.description.as_deref().is_some_and(contains)
        || entry.category.as_deref().is_some_and(contains)
        || entry.keywords.iter().any(|k| contains(k.as_str()))
}

/// Load the index file
pub fn load(index_path: &Path) -> Result<RegistryIndex> {
    if !index_path.exists() {
        return Err(MarketError::FileNotFound {
            path: index_path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(index_path)?;
    let document: IndexDocument =
        serde_json::from_str(&content).map_err(|e| MarketError::ConfigParse {
            path: index_path.to_path_buf(),
            message: e.to_string(),
        })?;

    let index = match document {
        IndexDocument::Entries(entries) => RegistryIndex {
            entries,
            ..Default::default()
        },
        IndexDocument::Marketplace(doc) => RegistryIndex {
            name: doc.name,
            owner: doc.owner.map(|o| o.name().to_string()),
            description: doc.description,
            entries: doc.plugins,
        },
    };

    tracing::debug!(
        "loaded {} index entries from {}",
        index.entries.len(),
        index_path.display()
    );
    Ok(index)
}

/// A package directory found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPackage {
    /// Manifest name when readable, else the directory name
    pub name: String,
    /// Path relative to the marketplace root
    pub path: PathBuf,
}

/// List package directories: every immediate subdirectory of `plugins_dir`
pub fn discover(root: &Path, plugins_dir: &Path) -> Result<Vec<DiscoveredPackage>> {
    if !plugins_dir.is_dir() {
        tracing::warn!("plugins directory not found: {}", plugins_dir.display());
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(plugins_dir)? {
        let path = entry?.path();
        if !path.is_dir() || dir_name(&path).starts_with('.') {
            continue;
        }

        let name = PackageManifest::read_name(&path).unwrap_or_else(|| dir_name(&path));
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        found.push(DiscoveredPackage {
            name,
            path: normalize(&relative),
        });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftKind {
    /// Nothing of that name exists on disk
    MissingSource,
    /// The name exists, but not where the index says, or the source holds another package
    NameMismatch { found: String },
    /// The index lists the name more than once
    DuplicateEntry,
    /// More than one directory on disk carries the name
    DuplicatePackage,
}

/// Registry-level inconsistency between index and disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub name: String,
    pub source: String,
    pub kind: DriftKind,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DriftKind::MissingSource => write!(
                f,
                "index entry '{}' points at '{}', which holds no package",
                self.name, self.source
            ),
            DriftKind::NameMismatch { found } => write!(
                f,
                "index entry '{}' points at '{}', but {}",
                self.name, self.source, found
            ),
            DriftKind::DuplicateEntry => write!(
                f,
                "index lists '{}' more than once (one entry points at '{}')",
                self.name, self.source
            ),
            DriftKind::DuplicatePackage => write!(
                f,
                "package name '{}' is used by more than one directory (one is '{}')",
                self.name, self.source
            ),
        }
    }
}

/// An index entry matched to its package directory
#[derive(Debug, Clone)]
pub struct Matched {
    pub entry: IndexEntry,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub matched: Vec<Matched>,
    pub missing: Vec<Drift>,
    pub orphaned: Vec<DiscoveredPackage>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Name-keyed set difference between index and disk. Neither input is modified.
pub fn reconcile(index: &RegistryIndex, discovered: &[DiscoveredPackage]) -> Reconciliation {
    let mut result = Reconciliation::default();

    let mut on_disk: BTreeMap<&str, Vec<&DiscoveredPackage>> = BTreeMap::new();
    for package in discovered {
        on_disk.entry(package.name.as_str()).or_default().push(package);
    }
    let by_path: BTreeMap<&Path, &DiscoveredPackage> =
        discovered.iter().map(|p| (p.path.as_path(), p)).collect();

    let mut index_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &index.entries {
        *index_counts.entry(entry.name.as_str()).or_default() += 1;
    }

    for entry in &index.entries {
        let source = normalize(Path::new(&entry.source));

        if index_counts[entry.name.as_str()] > 1 {
            result.missing.push(drift(entry, DriftKind::DuplicateEntry));
            continue;
        }

        match on_disk.get(entry.name.as_str()).map(Vec::as_slice) {
            Some([package]) if package.path == source => result.matched.push(Matched {
                entry: entry.clone(),
                path: package.path.clone(),
            }),
            Some([package]) => result.missing.push(drift(
                entry,
                DriftKind::NameMismatch {
                    found: format!("the package lives at '{}'", package.path.display()),
                },
            )),
            Some(_) => result.missing.push(drift(entry, DriftKind::DuplicatePackage)),
            None => {
                let kind = match by_path.get(source.as_path()) {
                    Some(other) => DriftKind::NameMismatch {
                        found: format!("its manifest is named '{}'", other.name),
                    },
                    None => DriftKind::MissingSource,
                };
                result.missing.push(drift(entry, kind));
            }
        }
    }

    let indexed: BTreeSet<&str> = index.entries.iter().map(|e| e.name.as_str()).collect();
    let mut reported_duplicates = BTreeSet::new();
    for package in discovered {
        if indexed.contains(package.name.as_str()) {
            continue;
        }
        if on_disk[package.name.as_str()].len() > 1 {
            if reported_duplicates.insert(package.name.as_str()) {
                result.missing.push(Drift {
                    name: package.name.clone(),
                    source: package.path.display().to_string(),
                    kind: DriftKind::DuplicatePackage,
                });
            }
            continue;
        }
        result.orphaned.push(package.clone());
    }

    result
}

fn drift(entry: &IndexEntry, kind: DriftKind) -> Drift {
    Drift {
        name: entry.name.clone(),
        source: entry.source.clone(),
        kind,
    }
}

/// Drop `.` components and trailing slashes so "./plugins/a/" == "plugins/a"
pub(crate) fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, source: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            source: source.to_string(),
            category: None,
            description: None,
            author: None,
            homepage: None,
            repository: None,
            license: None,
            keywords: Vec::new(),
        }
    }

    fn discovered(name: &str, path: &str) -> DiscoveredPackage {
        DiscoveredPackage {
            name: name.to_string(),
            path: PathBuf::from(path),
        }
    }

    fn index(entries: Vec<IndexEntry>) -> RegistryIndex {
        RegistryIndex {
            entries,
            ..Default::default()
        }
    }

    #[test]
    fn test_load_marketplace_object() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("marketplace.json");
        fs::write(
            &path,
            r#"{
                "name": "test-marketplace",
                "owner": { "name": "Test Owner", "email": "test@example.com" },
                "plugins": [
                    {
                        "name": "rails-workflow",
                        "source": "./plugins/rails-workflow",
                        "description": "Rails commands",
                        "category": "development",
                        "author": "Test Owner",
                        "homepage": "https://example.com",
                        "license": "MIT",
                        "keywords": ["rails", "ruby"]
                    }
                ]
            }"#,
        )
        .unwrap();

        let index = load(&path).unwrap();
        assert_eq!(index.name.as_deref(), Some("test-marketplace"));
        assert_eq!(index.owner.as_deref(), Some("Test Owner"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries[0].keywords, vec!["rails", "ruby"]);
    }

    #[test]
    fn test_load_bare_array() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        fs::write(&path, r#"[{"name": "a", "source": "plugins/a"}]"#).unwrap();

        let index = load(&path).unwrap();
        assert!(index.name.is_none());
        assert_eq!(index.entries[0].name, "a");
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        assert!(matches!(load(&path), Err(MarketError::FileNotFound { .. })));

        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(load(&path), Err(MarketError::ConfigParse { .. })));
    }

    #[test]
    fn test_discover_reads_manifest_names() {
        let temp = TempDir::new().unwrap();
        let plugins = temp.path().join("plugins");
        fs::create_dir_all(plugins.join("alpha/.claude-plugin")).unwrap();
        fs::write(
            plugins.join("alpha/.claude-plugin/plugin.json"),
            r#"{"name": "alpha-pack"}"#,
        )
        .unwrap();
        fs::create_dir_all(plugins.join("beta")).unwrap();
        fs::create_dir_all(plugins.join(".hidden")).unwrap();
        fs::write(plugins.join("README.md"), "not a package").unwrap();

        let found = discover(temp.path(), &plugins).unwrap();
        assert_eq!(
            found,
            vec![
                discovered("alpha-pack", "plugins/alpha"),
                discovered("beta", "plugins/beta"),
            ]
        );
    }

    #[test]
    fn test_reconcile_all_matched() {
        let names = ["a", "b", "c", "d", "e", "f", "g"];
        let idx = index(
            names
                .iter()
                .map(|n| entry(n, &format!("./plugins/{}", n)))
                .collect(),
        );
        let disk: Vec<_> = names
            .iter()
            .map(|n| discovered(n, &format!("plugins/{}", n)))
            .collect();

        let result = reconcile(&idx, &disk);
        assert_eq!(result.matched.len(), 7);
        assert!(result.missing.is_empty());
        assert!(result.orphaned.is_empty());
        assert!(result.is_clean());
    }

    #[test]
    fn test_reconcile_missing_and_orphaned() {
        let idx = index(vec![entry("a", "plugins/a"), entry("gone", "plugins/gone")]);
        let disk = vec![discovered("a", "plugins/a"), discovered("extra", "plugins/extra")];

        let result = reconcile(&idx, &disk);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].name, "gone");
        assert_eq!(result.missing[0].kind, DriftKind::MissingSource);
        assert_eq!(result.orphaned, vec![discovered("extra", "plugins/extra")]);
    }

    #[test]
    fn test_reconcile_name_mismatch() {
        let idx = index(vec![entry("rails", "plugins/rails")]);
        let disk = vec![discovered("rails-workflow", "plugins/rails")];

        let result = reconcile(&idx, &disk);
        assert!(result.matched.is_empty());
        assert!(matches!(
            result.missing[0].kind,
            DriftKind::NameMismatch { .. }
        ));
        assert!(result.missing[0].to_string().contains("rails-workflow"));
        // The directory is still unindexed under its real name
        assert_eq!(result.orphaned.len(), 1);
    }

    #[test]
    fn test_reconcile_wrong_path() {
        let idx = index(vec![entry("a", "plugins/old-a")]);
        let disk = vec![discovered("a", "plugins/a")];

        let result = reconcile(&idx, &disk);
        assert!(result.matched.is_empty());
        assert!(matches!(
            result.missing[0].kind,
            DriftKind::NameMismatch { .. }
        ));
        assert!(result.orphaned.is_empty());
    }

    #[test]
    fn test_reconcile_duplicate_entries_pick_no_winner() {
        let idx = index(vec![entry("a", "plugins/a"), entry("a", "plugins/a-fork")]);
        let disk = vec![discovered("a", "plugins/a"), discovered("b", "plugins/a-fork")];

        let result = reconcile(&idx, &disk);
        assert!(result.matched.is_empty());
        assert_eq!(result.missing.len(), 2);
        assert!(result
            .missing
            .iter()
            .all(|d| d.kind == DriftKind::DuplicateEntry));
    }

    #[test]
    fn test_reconcile_duplicate_packages_on_disk() {
        let idx = index(vec![]);
        let disk = vec![discovered("a", "plugins/a"), discovered("a", "plugins/a2")];

        let result = reconcile(&idx, &disk);
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].kind, DriftKind::DuplicatePackage);
        assert!(result.orphaned.is_empty());
    }

    #[test]
    fn test_search() {
        let mut rails = entry("rails-workflow", "plugins/rails");
        rails.keywords = vec!["ruby".to_string()];
        let mut docs = entry("docs", "plugins/docs");
        docs.description = Some("Search Rails guides".to_string());
        docs.category = Some("documentation".to_string());
        let idx = index(vec![rails, docs]);

        assert_eq!(idx.search("RUBY").len(), 1);
        assert_eq!(idx.search("rails").len(), 2);
        assert_eq!(idx.search("documentation")[0].name, "docs");
        assert!(idx.search("python").is_empty());
        assert!(idx.get("docs").is_some());
    }
}
