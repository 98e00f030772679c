use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

const CONFIG_FILE: &str = "plugin-market.toml";

pub const DEFAULT_INDEX_PATH: &str = ".claude-plugin/marketplace.json";
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";
pub const DEFAULT_PLUGIN_ROOT: &str = ".claude/plugins";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# plugin-market configuration file
# Location: <marketplace root>/plugin-market.toml

[marketplace]
# Registry index, relative to the marketplace root
index = ".claude-plugin/marketplace.json"

# Directory holding one subdirectory per package
plugins_dir = "plugins"

[install]
# Where packages land inside a target project (one subdirectory per package)
plugin_root = ".claude/plugins"

# Glob patterns (relative to the package root) never copied on install
# Example: exclude = ["**/*.bak", "commands/drafts/**"]
exclude = []
"#;

/// Marketplace configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    #[serde(default)]
    pub install: InstallConfig,
}

/// Where the registry lives inside the marketplace root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: String,
}

/// How packages are placed into a target project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default = "default_plugin_root")]
    pub plugin_root: String,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_index() -> String {
    DEFAULT_INDEX_PATH.to_string()
}

fn default_plugins_dir() -> String {
    DEFAULT_PLUGINS_DIR.to_string()
}

fn default_plugin_root() -> String {
    DEFAULT_PLUGIN_ROOT.to_string()
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            index: default_index(),
            plugins_dir: default_plugins_dir(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            plugin_root: default_plugin_root(),
            exclude: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from the marketplace root, falling back to defaults
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| MarketError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to the marketplace root
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(CONFIG_FILE);
        fs::create_dir_all(root)?;

        let content = toml::to_string_pretty(self).map_err(|e| MarketError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(root: &Path) -> Result<PathBuf> {
        let path = root.join(CONFIG_FILE);
        fs::create_dir_all(root)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    pub fn index_path(&self, root: &Path) -> PathBuf {
        root.join(&self.marketplace.index)
    }

    pub fn plugins_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.marketplace.plugins_dir)
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "marketplace.index" => Some(self.marketplace.index.clone()),
            "marketplace.plugins_dir" => Some(self.marketplace.plugins_dir.clone()),
            "install.plugin_root" => Some(self.install.plugin_root.clone()),
            "install.exclude" => Some(format!("{:?}", self.install.exclude)),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "marketplace.index" => self.marketplace.index = non_empty(key, value)?,
            "marketplace.plugins_dir" => self.marketplace.plugins_dir = non_empty(key, value)?,
            "install.plugin_root" => {
                let root = non_empty(key, value)?;
                if Path::new(&root).is_absolute() || root.split('/').any(|c| c == "..") {
                    return Err(MarketError::ConfigValue {
                        key: key.to_string(),
                        message: "must be a relative path inside the target".to_string(),
                    });
                }
                self.install.plugin_root = root;
            }
            "install.exclude" => {
                let patterns = parse_string_list(value);
                for pattern in &patterns {
                    glob::Pattern::new(pattern).map_err(|e| MarketError::ConfigValue {
                        key: key.to_string(),
                        message: format!("bad glob '{}': {}", pattern, e),
                    })?;
                }
                self.install.exclude = patterns;
            }
            _ => {
                return Err(MarketError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "marketplace.index",
            "marketplace.plugins_dir",
            "install.plugin_root",
            "install.exclude",
        ]
        .iter()
        .filter_map(|key| self.get(key).map(|v| (key.to_string(), v)))
        .collect()
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MarketError::ConfigValue {
            key: key.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Parse a comma-separated or JSON-like list string
fn parse_string_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
