//! Package installer
//!
//! Places a validated package under `<target>/<plugin_root>/<package-name>/`
//! and removes it again using the install record, never a directory listing.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::config::Config;
use crate::error::{MarketError, Result};
use crate::plugin::package::{FileFilter, Package};
use crate::plugin::record::{compute_file_hash, compute_hash, InstallRecord, InstalledPackage};
use crate::plugin::resolver::InstallationSet;
use crate::plugin::validator::validate;

/// Callback type for file operation progress reporting
pub type FileCallback<'a> = Option<&'a dyn Fn(&str, &str)>;

#[derive(Debug, Default)]
pub struct InstallOutcome {
    pub package: String,
    pub version: String,
    pub destination: PathBuf,
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct UninstallOutcome {
    pub package: String,
    pub removed: usize,
    /// Recorded files that were already gone
    pub missing: usize,
    pub dry_run: bool,
}

struct StagedFile {
    relative: String,
    content: Vec<u8>,
    hash: String,
}

/// Previous state of a path touched by an install, for rollback
struct Undo {
    path: PathBuf,
    previous: Option<Vec<u8>>,
}

pub struct Installer {
    plugin_root: PathBuf,
    filter: FileFilter,
}

impl Installer {
    pub fn new(config: &Config) -> Self {
        Self {
            plugin_root: PathBuf::from(&config.install.plugin_root),
            filter: FileFilter::new(&config.install.exclude),
        }
    }

    /// Target project root: explicit path, the home directory, or the current directory
    pub fn resolve_target(target: Option<&Path>, global: bool) -> Result<PathBuf> {
        if global {
            return dirs::home_dir().ok_or(MarketError::HomeNotFound);
        }

        let base = match target {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir()?,
        };

        if !base.exists() {
            return Err(MarketError::TargetNotFound { path: base });
        }

        Ok(base)
    }

    /// Directory holding installed packages inside `target_root`
    pub fn plugin_root(&self, target_root: &Path) -> PathBuf {
        target_root.join(&self.plugin_root)
    }

    /// Directory one package is installed into
    pub fn namespace(&self, target_root: &Path, package: &str) -> PathBuf {
        self.plugin_root(target_root).join(package)
    }

    pub fn installed(&self, target_root: &Path) -> Result<InstallRecord> {
        InstallRecord::load(&self.plugin_root(target_root))
    }

    pub fn installation_set(&self, target_root: &Path) -> Result<InstallationSet> {
        Ok(self.installed(target_root)?.installation_set())
    }

    /// Install the package at `package_dir` into `target_root`.
    ///
    /// Either every file of the package lands or none does.
    pub fn install(
        &self,
        package_dir: &Path,
        target_root: &Path,
        dry_run: bool,
        on_file: FileCallback<'_>,
    ) -> Result<InstallOutcome> {
        let validation = validate(package_dir);
        if !validation.passed() {
            return Err(MarketError::InvalidPackage {
                name: validation.package_name,
                errors: validation.errors.len(),
            });
        }

        let package = Package::open(package_dir)?;
        let name = package.name();
        let namespace = self.namespace(target_root, &name);
        let plugin_root = self.plugin_root(target_root);

        self.preflight(target_root, &namespace)?;

        // Read everything before the first write
        let mut staged = Vec::new();
        for relative in package.files(&self.filter) {
            let content = fs::read(package.path.join(&relative))?;
            staged.push(StagedFile {
                relative: relative_key(&relative),
                hash: compute_hash(&content),
                content,
            });
        }

        let mut record = InstallRecord::load(&plugin_root)?;
        let previous = record.get(&name).cloned();

        let mut entry = InstalledPackage {
            version: package.manifest.version.clone().unwrap_or_default(),
            installed_at: Utc::now(),
            provides: names(&package.manifest.provided_capabilities()),
            consumes: names(&package.manifest.consumed_capabilities()),
            created_dirs: Vec::new(),
            files: staged
                .iter()
                .map(|f| (f.relative.clone(), f.hash.clone()))
                .collect(),
        };
        if let Some(prev) = &previous {
            if prev.same_content(&entry) {
                entry.installed_at = prev.installed_at;
            }
        }

        // Directories this install brings into existence; only these are
        // ever pruned again
        let created = if dry_run {
            Vec::new()
        } else {
            missing_dirs(&namespace, &staged, target_root)
        };
        let mut package_dirs: Vec<String> = previous
            .iter()
            .flat_map(|p| p.created_dirs.iter().cloned())
            .collect();
        for dir in &created {
            match dir.strip_prefix(&plugin_root) {
                Ok(relative) if !relative.as_os_str().is_empty() => {
                    package_dirs.push(relative_key(relative))
                }
                _ => {
                    if let Ok(relative) = dir.strip_prefix(target_root) {
                        record.created_dirs.push(relative_key(relative));
                    }
                }
            }
        }
        package_dirs.sort();
        package_dirs.dedup();
        entry.created_dirs = package_dirs;
        record.created_dirs.sort();
        record.created_dirs.dedup();

        let stale: Vec<String> = previous
            .iter()
            .flat_map(|p| p.files.keys())
            .filter(|k| !entry.files.contains_key(*k))
            .cloned()
            .collect();

        let mut outcome = InstallOutcome {
            package: name.clone(),
            version: entry.version.clone(),
            destination: namespace.clone(),
            dry_run,
            ..Default::default()
        };

        let mut undo: Vec<Undo> = Vec::new();
        for file in &staged {
            let dst = namespace.join(&file.relative);
            let exists = dst.is_file();

            if exists && compute_file_hash(&dst)? == file.hash {
                if let Some(f) = on_file {
                    f("SKIP", &file.relative);
                }
                outcome.unchanged += 1;
                continue;
            }

            if !dry_run {
                if let Err(e) = write_file(&dst, &file.content, &mut undo) {
                    tracing::warn!("install of {} failed, rolling back: {}", name, e);
                    rollback(undo, &created);
                    return Err(e);
                }
            }

            if let Some(f) = on_file {
                f(if exists { "UPDATE" } else { "NEW" }, &file.relative);
            }
            outcome.written += 1;
        }

        if !dry_run {
            record.insert(&name, entry);
            if let Err(e) = record.save(&plugin_root) {
                rollback(undo, &created);
                return Err(e);
            }
        }

        // Files an earlier version shipped and this one no longer does
        for relative in &stale {
            if !is_contained(relative) {
                continue;
            }
            let path = namespace.join(relative);
            if !dry_run && path.is_file() {
                fs::remove_file(&path)?;
                if let Some(parent) = path.parent() {
                    let _ = remove_empty_dirs(parent, &namespace);
                }
            }
            if let Some(f) = on_file {
                f("DEL", relative);
            }
            outcome.removed += 1;
        }

        tracing::info!(
            "installed {} {} into {} ({} written, {} unchanged, {} removed)",
            name,
            outcome.version,
            namespace.display(),
            outcome.written,
            outcome.unchanged,
            outcome.removed
        );
        Ok(outcome)
    }

    /// Remove exactly the files the install record lists for `package_name`,
    /// then the directories its install created once they are empty
    pub fn uninstall(
        &self,
        package_name: &str,
        target_root: &Path,
        dry_run: bool,
        on_file: FileCallback<'_>,
    ) -> Result<UninstallOutcome> {
        if !target_root.is_dir() {
            return Err(MarketError::TargetNotFound {
                path: target_root.to_path_buf(),
            });
        }

        let plugin_root = self.plugin_root(target_root);
        let mut record = InstallRecord::load(&plugin_root)?;
        let entry = record
            .get(package_name)
            .cloned()
            .ok_or_else(|| MarketError::NotInstalled {
                name: package_name.to_string(),
            })?;

        let namespace = self.namespace(target_root, package_name);
        let mut outcome = UninstallOutcome {
            package: package_name.to_string(),
            dry_run,
            ..Default::default()
        };

        for relative in entry.files.keys() {
            if !is_contained(relative) {
                tracing::warn!("ignoring recorded path outside package: {}", relative);
                continue;
            }

            let path = namespace.join(relative);
            if !path.is_file() {
                outcome.missing += 1;
                continue;
            }

            if !dry_run {
                fs::remove_file(&path)?;
            }
            if let Some(f) = on_file {
                f("DEL", relative);
            }
            outcome.removed += 1;
        }

        if !dry_run {
            record.remove(package_name);
            record.save(&plugin_root)?;

            let mut dirs: Vec<PathBuf> = contained(&entry.created_dirs)
                .map(|d| plugin_root.join(d))
                .collect();
            // The plugin root itself goes only with the last package
            if record.is_empty() {
                dirs.extend(contained(&record.created_dirs).map(|d| target_root.join(d)));
            }
            prune_dirs(dirs);
        }

        tracing::info!(
            "uninstalled {} ({} removed, {} already missing)",
            package_name,
            outcome.removed,
            outcome.missing
        );
        Ok(outcome)
    }

    /// Target must exist and accept writes before anything is copied
    fn preflight(&self, target_root: &Path, namespace: &Path) -> Result<()> {
        if !target_root.is_dir() {
            return Err(MarketError::TargetNotFound {
                path: target_root.to_path_buf(),
            });
        }

        // Probe the deepest directory that already exists on the way to the namespace
        let probe_dir = namespace
            .ancestors()
            .find(|p| p.is_dir())
            .unwrap_or(target_root);

        tempfile::tempfile_in(probe_dir).map_err(|e| MarketError::TargetNotWritable {
            path: probe_dir.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(())
    }
}

fn write_file(dst: &Path, content: &[u8], undo: &mut Vec<Undo>) -> Result<()> {
    let previous = if dst.is_file() {
        Some(fs::read(dst)?)
    } else {
        None
    };

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    undo.push(Undo {
        path: dst.to_path_buf(),
        previous,
    });
    fs::write(dst, content)?;
    Ok(())
}

fn rollback(undo: Vec<Undo>, created: &[PathBuf]) {
    for step in undo.into_iter().rev() {
        let restored = match &step.previous {
            Some(content) => fs::write(&step.path, content),
            None if step.path.is_file() => fs::remove_file(&step.path),
            None => Ok(()),
        };
        if let Err(e) = restored {
            tracing::warn!("rollback of {} failed: {}", step.path.display(), e);
        }
    }
    prune_dirs(created.to_vec());
}

/// Directories between `target_root` (exclusive) and each staged file that
/// do not exist yet
fn missing_dirs(namespace: &Path, staged: &[StagedFile], target_root: &Path) -> Vec<PathBuf> {
    let mut missing = BTreeSet::new();
    for file in staged {
        let dst = namespace.join(&file.relative);
        for dir in dst.ancestors().skip(1) {
            if dir == target_root || !dir.starts_with(target_root) || dir.exists() {
                break;
            }
            missing.insert(dir.to_path_buf());
        }
    }
    missing.into_iter().collect()
}

/// Remove each directory that is empty, deepest first
fn prune_dirs(mut dirs: Vec<PathBuf>) {
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            if let Err(e) = fs::remove_dir(&dir) {
                tracing::debug!("could not remove {}: {}", dir.display(), e);
            }
        }
    }
}

fn contained(relatives: &[String]) -> impl Iterator<Item = &String> {
    relatives.iter().filter(|r| is_contained(r))
}

fn remove_empty_dirs(dir: &Path, root: &Path) -> std::io::Result<()> {
    if dir == root || !dir.starts_with(root) {
        return Ok(());
    }

    if dir.is_dir() && fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
        if let Some(parent) = dir.parent() {
            remove_empty_dirs(parent, root)?;
        }
    }

    Ok(())
}

/// Record key for a package-relative path, always '/'-separated
fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Only plain relative paths may be touched under a namespace
fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    !relative.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn names(capabilities: &[crate::capability::CapabilityName]) -> Vec<String> {
    capabilities.iter().map(|c| c.to_string()).collect()
}
