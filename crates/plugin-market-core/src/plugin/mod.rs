//! Plugin Module
//!
//! - `manifest`: `.claude-plugin/plugin.json` parsing
//! - `package`: a package directory and the files it ships
//! - `validator`: per-package descriptor and layout checks
//! - `registry`: marketplace index, discovery and reconciliation
//! - `resolver`: capability bindings over an installation set
//! - `installer`: install/uninstall into a target project
//! - `record`: what each install placed

pub mod installer;
pub mod manifest;
pub mod package;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod validator;

// Re-exports
pub use installer::{FileCallback, InstallOutcome, Installer, UninstallOutcome};
pub use manifest::{Author, ContentKind, KindSpec, PackageManifest, PLUGIN_DIR, PLUGIN_JSON};
pub use package::{FileFilter, Package};
pub use record::{InstallRecord, InstalledPackage, RECORD_FILENAME};
pub use registry::{
    DiscoveredPackage, Drift, DriftKind, IndexEntry, Matched, Reconciliation, RegistryIndex,
};
pub use resolver::{CapabilityBinding, InstallationSet, PackageCapabilities};
pub use validator::{validate, Diagnostic, DiagnosticKind, Severity, ValidationResult};
