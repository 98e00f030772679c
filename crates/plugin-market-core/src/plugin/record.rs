use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::capability::CapabilityName;
use crate::error::Result;
use crate::plugin::resolver::{InstallationSet, PackageCapabilities};

pub const RECORD_FILENAME: &str = ".plugin-market.toml";

/// Packages installed under one plugin root, and the files each placed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    /// Directories above the packages (the plugin root and its missing
    /// ancestors) that the first install created, relative to the target root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_dirs: Vec<String>,

    #[serde(default)]
    pub packages: BTreeMap<String, InstalledPackage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub version: String,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    /// Directories this package's install created, relative to the plugin root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_dirs: Vec<String>,
    /// Path relative to the package namespace -> content hash
    pub files: BTreeMap<String, String>,
}

impl InstalledPackage {
    pub fn capabilities(&self) -> PackageCapabilities {
        let typed = |names: &[String]| {
            names
                .iter()
                .filter_map(|n| CapabilityName::parse(n))
                .collect()
        };
        PackageCapabilities {
            provides: typed(&self.provides),
            consumes: typed(&self.consumes),
        }
    }

    /// Same shipped content, ignoring when it was installed
    pub fn same_content(&self, other: &InstalledPackage) -> bool {
        self.version == other.version
            && self.files == other.files
            && self.provides == other.provides
            && self.consumes == other.consumes
    }
}

impl InstallRecord {
    pub fn load(plugin_root: &Path) -> Result<Self> {
        let path = plugin_root.join(RECORD_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the record, or delete it once no package is left
    pub fn save(&self, plugin_root: &Path) -> Result<()> {
        let path = plugin_root.join(RECORD_FILENAME);
        if self.packages.is_empty() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            return Ok(());
        }

        fs::create_dir_all(plugin_root)?;
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackage> {
        self.packages.get(name)
    }

    pub fn insert(&mut self, name: &str, package: InstalledPackage) {
        self.packages.insert(name.to_string(), package);
    }

    pub fn remove(&mut self, name: &str) -> Option<InstalledPackage> {
        self.packages.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn installation_set(&self) -> InstallationSet {
        self.packages
            .iter()
            .map(|(name, package)| (name.clone(), package.capabilities()))
            .collect()
    }
}

pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    format!("sha256:{}", hex::encode(result))
}

pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = fs::read(path)?;
    Ok(compute_hash(&content))
}
