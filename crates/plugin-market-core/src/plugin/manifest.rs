//! Package manifest parsing for .claude-plugin/plugin.json

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityName;
use crate::error::{MarketError, Result};

pub const PLUGIN_DIR: &str = ".claude-plugin";
pub const PLUGIN_JSON: &str = "plugin.json";

static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

// semver.org 2.0.0
static SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .unwrap()
});

/// Check a package or capability name is a kebab-case slug
pub fn is_slug(value: &str) -> bool {
    SLUG.is_match(value)
}

/// Check a version string is a semantic version
pub fn is_semver(value: &str) -> bool {
    SEMVER.is_match(value)
}

/// Path of the descriptor inside a package directory
pub fn descriptor_path(package_dir: &Path) -> PathBuf {
    package_dir.join(PLUGIN_DIR).join(PLUGIN_JSON)
}

/// Package manifest structure
///
/// Required keys are optional here so that a manifest missing one still
/// loads; the validator reports what is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

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

    #[serde(default)]
    pub categories: Vec<String>,

    /// Declared content kinds
    #[serde(default)]
    pub kind: KindSpec,

    #[serde(default)]
    pub capabilities: Capabilities,
}

/// Author as a bare name or a structured record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl Author {
    pub fn name(&self) -> &str {
        match self {
            Author::Name(name) => name,
            Author::Detailed { name, .. } => name,
        }
    }
}

/// Capabilities a package offers to, or optionally uses from, other packages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub provides: Vec<String>,

    #[serde(default)]
    pub consumes: Vec<String>,
}

/// Kind of content a package ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Commands,
    Agents,
    Hooks,
    Skills,
    CapabilityProvider,
}

/// Content kinds that map to a subdirectory, in walk order
pub const CONTENT_DIR_KINDS: &[ContentKind] = &[
    ContentKind::Commands,
    ContentKind::Agents,
    ContentKind::Hooks,
    ContentKind::Skills,
];

impl ContentKind {
    /// Subdirectory holding this kind of content
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            ContentKind::Commands => Some("commands"),
            ContentKind::Agents => Some("agents"),
            ContentKind::Hooks => Some("hooks"),
            ContentKind::Skills => Some("skills"),
            ContentKind::CapabilityProvider => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Commands => "commands",
            ContentKind::Agents => "agents",
            ContentKind::Hooks => "hooks",
            ContentKind::Skills => "skills",
            ContentKind::CapabilityProvider => "capability-provider",
        };
        f.write_str(s)
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "commands" => Ok(ContentKind::Commands),
            "agents" => Ok(ContentKind::Agents),
            "hooks" => Ok(ContentKind::Hooks),
            "skills" => Ok(ContentKind::Skills),
            "capability-provider" => Ok(ContentKind::CapabilityProvider),
            other => Err(format!("unknown content kind '{}'", other)),
        }
    }
}

/// Content kind can be a single string or array of strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KindSpec {
    #[default]
    None,
    Single(ContentKind),
    Multiple(Vec<ContentKind>),
}

impl KindSpec {
    pub fn to_vec(&self) -> Vec<ContentKind> {
        let mut kinds = match self {
            KindSpec::None => Vec::new(),
            KindSpec::Single(k) => vec![*k],
            KindSpec::Multiple(v) => v.clone(),
        };
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        match self {
            KindSpec::None => true,
            KindSpec::Single(_) => false,
            KindSpec::Multiple(v) => v.is_empty(),
        }
    }
}

impl PackageManifest {
    /// Load the manifest of a package directory
    pub fn load(package_dir: &Path) -> Result<Self> {
        let path = descriptor_path(package_dir);
        if !path.exists() {
            return Err(MarketError::FileNotFound { path });
        }

        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| MarketError::ConfigParse {
            path,
            message: e.to_string(),
        })
    }

    /// Read only the `name` field, tolerating an otherwise malformed manifest
    pub fn read_name(package_dir: &Path) -> Option<String> {
        let content = fs::read_to_string(descriptor_path(package_dir)).ok()?;
        let value: serde_json::Value = serde_json::from_str(&content).ok()?;
        value
            .get("name")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }

    pub fn exists(package_dir: &Path) -> bool {
        descriptor_path(package_dir).is_file()
    }

    pub fn declared_kinds(&self) -> Vec<ContentKind> {
        self.kind.to_vec()
    }

    /// Declared kinds that map to a content directory
    pub fn declared_content_kinds(&self) -> Vec<ContentKind> {
        self.declared_kinds()
            .into_iter()
            .filter(|k| k.dir_name().is_some())
            .collect()
    }

    pub fn is_capability_provider(&self) -> bool {
        self.declared_kinds()
            .contains(&ContentKind::CapabilityProvider)
    }

    /// Well-formed provided capability names, sorted and deduplicated
    pub fn provided_capabilities(&self) -> Vec<CapabilityName> {
        typed_names(&self.capabilities.provides)
    }

    /// Well-formed consumed capability names, sorted and deduplicated
    pub fn consumed_capabilities(&self) -> Vec<CapabilityName> {
        typed_names(&self.capabilities.consumes)
    }

    pub fn author_name(&self) -> Option<&str> {
        self.author.as_ref().map(Author::name)
    }
}

fn typed_names(raw: &[String]) -> Vec<CapabilityName> {
    let mut names: Vec<_> = raw
        .iter()
        .filter_map(|n| CapabilityName::parse(n))
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_pattern() {
        assert!(is_slug("rails-workflow"));
        assert!(is_slug("a1"));
        assert!(!is_slug("Rails_Workflow"));
        assert!(!is_slug("-leading"));
        assert!(!is_slug("trailing-"));
        assert!(!is_slug(""));
    }

    #[test]
    fn semver_pattern() {
        assert!(is_semver("1.0.0"));
        assert!(is_semver("0.3.12-beta.1+build.7"));
        assert!(!is_semver("1.0"));
        assert!(!is_semver("v1.0.0"));
        assert!(!is_semver("01.0.0"));
    }

    #[test]
    fn kind_single_or_multiple() {
        let single: PackageManifest = serde_json::from_str(r#"{"kind": "commands"}"#).unwrap();
        assert_eq!(single.declared_kinds(), vec![ContentKind::Commands]);

        let multiple: PackageManifest =
            serde_json::from_str(r#"{"kind": ["skills", "capability-provider", "skills"]}"#)
                .unwrap();
        assert_eq!(
            multiple.declared_kinds(),
            vec![ContentKind::Skills, ContentKind::CapabilityProvider]
        );
        assert_eq!(multiple.declared_content_kinds(), vec![ContentKind::Skills]);
        assert!(multiple.is_capability_provider());

        let none: PackageManifest = serde_json::from_str("{}").unwrap();
        assert!(none.kind.is_empty());
    }

    #[test]
    fn author_string_or_object() {
        let plain: PackageManifest = serde_json::from_str(r#"{"author": "Jo"}"#).unwrap();
        assert_eq!(plain.author_name(), Some("Jo"));

        let detailed: PackageManifest =
            serde_json::from_str(r#"{"author": {"name": "Jo", "email": "jo@example.com"}}"#)
                .unwrap();
        assert_eq!(detailed.author_name(), Some("Jo"));
    }

    #[test]
    fn capability_names_are_typed() {
        let manifest: PackageManifest = serde_json::from_str(
            r#"{"capabilities": {"provides": ["lint", "Bad Name", "lint"], "consumes": ["docs-search"]}}"#,
        )
        .unwrap();

        let provided: Vec<_> = manifest
            .provided_capabilities()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(provided, vec!["lint"]);
        assert_eq!(manifest.consumed_capabilities().len(), 1);
    }

    #[test]
    fn content_kind_from_str() {
        assert_eq!(
            "capability-provider".parse::<ContentKind>().unwrap(),
            ContentKind::CapabilityProvider
        );
        assert!("widgets".parse::<ContentKind>().is_err());
        assert_eq!(ContentKind::Hooks.dir_name(), Some("hooks"));
    }
}
