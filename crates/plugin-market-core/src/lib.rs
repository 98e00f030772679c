pub mod capability;
pub mod config;
pub mod error;
pub mod marketplace;
pub mod plugin;
pub mod report;

pub use capability::{CapabilityCatalog, CapabilityName};
pub use config::Config;
pub use error::{MarketError, Result};
pub use marketplace::{Marketplace, Verification};
pub use plugin::{
    validate, CapabilityBinding, Diagnostic, DiagnosticKind, DiscoveredPackage, Drift, DriftKind,
    FileCallback, FileFilter, IndexEntry, InstallOutcome, InstallRecord, InstallationSet,
    InstalledPackage, Installer, Package, PackageCapabilities, PackageManifest, Reconciliation,
    RegistryIndex, UninstallOutcome, ValidationResult,
};
pub use report::{report, report_with_registry, Report};
