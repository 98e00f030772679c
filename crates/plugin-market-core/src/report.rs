//! Plain-text report over validation results, capability bindings and drift

use std::fmt::Write as _;

use crate::plugin::registry::Reconciliation;
use crate::plugin::resolver::{unresolved, CapabilityBinding};
use crate::plugin::validator::ValidationResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub errors: usize,
    pub warnings: usize,
    /// 0 when there are no errors, 1 otherwise
    pub exit_code: i32,
}

/// Render per-package results, the aggregate counts and degraded-mode notices
pub fn report(results: &[ValidationResult], bindings: &[CapabilityBinding]) -> Report {
    let mut text = String::new();
    let (errors, warnings) = write_results(&mut text, results);
    finish(text, errors, warnings, bindings)
}

/// Same as [`report`], preceded by the registry findings.
///
/// Each drift counts as an error, each orphaned package as a warning.
pub fn report_with_registry(
    reconciliation: &Reconciliation,
    results: &[ValidationResult],
    bindings: &[CapabilityBinding],
) -> Report {
    let mut text = String::new();

    for drift in &reconciliation.missing {
        let _ = writeln!(text, "[DRIFT] {}", drift);
    }
    for orphan in &reconciliation.orphaned {
        let _ = writeln!(
            text,
            "[ORPHAN] {} at {} is not listed in the index",
            orphan.name,
            orphan.path.display()
        );
    }
    if !reconciliation.is_clean() {
        text.push('\n');
    }

    let (errors, warnings) = write_results(&mut text, results);
    finish(
        text,
        errors + reconciliation.missing.len(),
        warnings + reconciliation.orphaned.len(),
        bindings,
    )
}

fn write_results(text: &mut String, results: &[ValidationResult]) -> (usize, usize) {
    let mut errors = 0;
    let mut warnings = 0;

    for result in results {
        let status = if result.passed() { "PASS" } else { "FAIL" };
        let _ = writeln!(
            text,
            "[{}] {} ({})",
            status,
            result.package_name,
            result.path.display()
        );
        for diagnostic in &result.errors {
            let _ = writeln!(text, "  error: {}", diagnostic);
        }
        for diagnostic in &result.warnings {
            let _ = writeln!(text, "  warning: {}", diagnostic);
        }

        errors += result.errors.len();
        warnings += result.warnings.len();
    }

    (errors, warnings)
}

fn finish(
    mut text: String,
    errors: usize,
    warnings: usize,
    bindings: &[CapabilityBinding],
) -> Report {
    let _ = writeln!(text, "\nErrors: {}, Warnings: {}", errors, warnings);

    let mut degraded = unresolved(bindings).peekable();
    if degraded.peek().is_some() {
        text.push('\n');
    }
    for binding in degraded {
        let _ = writeln!(text, "{}", degraded_notice(binding));
    }

    Report {
        text,
        errors,
        warnings,
        exit_code: if errors > 0 { 1 } else { 0 },
    }
}

/// Notice for a consumer whose optional capability has no provider
pub fn degraded_notice(binding: &CapabilityBinding) -> String {
    format!(
        "[DEGRADED] {} runs without '{}': no installed package provides it",
        binding.consumer, binding.capability
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityName;
    use crate::plugin::registry::{DiscoveredPackage, Drift, DriftKind};
    use crate::plugin::resolver::{resolve, InstallationSet, PackageCapabilities};
    use crate::plugin::validator::validate;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn package(root: &Path, dir: &str, manifest: &str) -> PathBuf {
        let path = root.join(dir);
        fs::create_dir_all(path.join(".claude-plugin")).unwrap();
        fs::write(path.join(".claude-plugin/plugin.json"), manifest).unwrap();
        path
    }

    #[test]
    fn invalid_name_still_listed() {
        let temp = TempDir::new().unwrap();
        let bad = package(
            temp.path(),
            "rails",
            r#"{"name": "Rails_Workflow", "version": "1.0.0", "description": "d", "author": "a", "kind": "capability-provider"}"#,
        );
        let good = package(
            temp.path(),
            "lint",
            r#"{"name": "lint", "version": "1.0.0", "description": "d", "author": "a", "kind": "capability-provider"}"#,
        );

        let results = vec![validate(&bad), validate(&good)];
        let report = report(&results, &[]);

        assert!(report.text.contains("[FAIL] Rails_Workflow"));
        assert!(report.text.contains("[PASS] lint"));
        assert!(report.text.contains("Errors: 1, Warnings: 0"));
        assert_eq!(report.errors, 1);
        assert_eq!(report.exit_code, 1);
    }

    #[test]
    fn unresolved_capability_is_degraded_not_an_error() {
        let temp = TempDir::new().unwrap();
        let x = package(
            temp.path(),
            "x",
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a",
                "kind": "capability-provider", "capabilities": {"consumes": ["docs-search"]}}"#,
        );
        let results = vec![validate(&x)];
        assert!(results[0].passed());

        let mut set = InstallationSet::new();
        set.insert(
            "x",
            PackageCapabilities {
                provides: Default::default(),
                consumes: [CapabilityName::parse("docs-search").unwrap()]
                    .into_iter()
                    .collect(),
            },
        );
        let bindings = resolve(&set);

        let report = report(&results, &bindings);
        assert_eq!(report.errors, 0);
        assert_eq!(report.exit_code, 0);
        assert!(report.text.contains("Errors: 0, Warnings: 0"));
        assert!(report.text.contains("[DEGRADED] x runs without 'docs-search'"));
    }

    #[test]
    fn drift_counts_as_error_orphan_as_warning() {
        let reconciliation = Reconciliation {
            matched: Vec::new(),
            missing: vec![Drift {
                name: "gone".to_string(),
                source: "./plugins/gone".to_string(),
                kind: DriftKind::MissingSource,
            }],
            orphaned: vec![DiscoveredPackage {
                name: "stray".to_string(),
                path: PathBuf::from("plugins/stray"),
            }],
        };

        let report = report_with_registry(&reconciliation, &[], &[]);
        assert_eq!(report.errors, 1);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.exit_code, 1);
        assert!(report.text.contains("[DRIFT] index entry 'gone'"));
        assert!(report.text.contains("[ORPHAN] stray"));
    }

    #[test]
    fn empty_report_passes() {
        let report = report(&[], &[]);
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.text.trim(), "Errors: 0, Warnings: 0");
    }
}
