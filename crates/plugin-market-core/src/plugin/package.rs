//! Package directory: a manifest plus the content tree it ships

use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::Result;
use crate::plugin::manifest::{descriptor_path, ContentKind, PackageManifest, CONTENT_DIR_KINDS};

const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", ".gitkeep"];

/// Exclude patterns applied to package-relative paths
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    exclude: Vec<Pattern>,
}

impl FileFilter {
    /// Build from glob strings; invalid patterns are skipped with a warning
    pub fn new(patterns: &[String]) -> Self {
        let exclude = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("ignoring bad exclude pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self { exclude }
    }

    pub fn matches_exclude(&self, relative: &Path) -> bool {
        let path_str = relative.to_string_lossy();
        self.exclude.iter().any(|p| p.matches(&path_str))
    }

    fn should_ignore(&self, relative: &Path) -> bool {
        let ignored_name = relative
            .file_name()
            .map(|n| IGNORED_FILES.contains(&n.to_string_lossy().as_ref()))
            .unwrap_or(false);
        ignored_name || self.matches_exclude(relative)
    }
}

/// A package directory with its parsed manifest
#[derive(Debug, Clone)]
pub struct Package {
    pub path: PathBuf,
    pub manifest: PackageManifest,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        let manifest = PackageManifest::load(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
        })
    }

    /// Manifest name, falling back to the directory name
    pub fn name(&self) -> String {
        self.manifest
            .name
            .clone()
            .unwrap_or_else(|| dir_name(&self.path))
    }

    /// Content kinds whose directories ship with the package.
    ///
    /// Declared kinds win; with none declared, whichever content
    /// directories exist on disk are used.
    pub fn content_kinds(&self) -> Vec<ContentKind> {
        let declared = self.manifest.declared_content_kinds();
        if !declared.is_empty() || !self.manifest.kind.is_empty() {
            return declared;
        }
        present_kinds(&self.path)
    }

    /// Files an install places, relative to the package root: the descriptor
    /// plus every file under the content directories. Sorted.
    pub fn files(&self, filter: &FileFilter) -> Vec<PathBuf> {
        let mut files = Vec::new();

        if let Ok(relative) = descriptor_path(&self.path).strip_prefix(&self.path) {
            files.push(relative.to_path_buf());
        }

        for kind in self.content_kinds() {
            let Some(dir) = kind.dir_name() else {
                continue;
            };
            for relative in list_files(&self.path, &self.path.join(dir)) {
                if filter.should_ignore(&relative) {
                    tracing::debug!("excluded {}", relative.display());
                    continue;
                }
                files.push(relative);
            }
        }

        files.sort();
        files.dedup();
        files
    }

    /// Contents summary (e.g., "commands (3), skills (1)")
    pub fn contents_summary(&self) -> String {
        let parts: Vec<String> = self
            .content_kinds()
            .into_iter()
            .filter_map(|kind| {
                let dir = kind.dir_name()?;
                let count = list_files(&self.path, &self.path.join(dir)).len();
                Some(format!("{} ({})", kind, count))
            })
            .collect();

        if parts.is_empty() {
            "(no content)".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Content directories present on disk, in canonical order
pub fn present_kinds(package_dir: &Path) -> Vec<ContentKind> {
    CONTENT_DIR_KINDS
        .iter()
        .copied()
        .filter(|k| {
            k.dir_name()
                .map(|d| package_dir.join(d).is_dir())
                .unwrap_or(false)
        })
        .collect()
}

/// Files below `dir`, relative to `root`, sorted
pub fn list_files(root: &Path, dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .filter(|p| {
            p.file_name()
                .map(|n| !IGNORED_FILES.contains(&n.to_string_lossy().as_ref()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
