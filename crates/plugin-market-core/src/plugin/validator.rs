//! Package validator
//!
//! Checks one package directory's descriptor and layout. Pure over the
//! filesystem: nothing is written, and results are recomputed per run.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::plugin::manifest::{
    descriptor_path, is_semver, is_slug, ContentKind, PackageManifest, CONTENT_DIR_KINDS,
};
use crate::plugin::package::{dir_name, list_files};

const REQUIRED_FIELDS: &[&str] = &["name", "description", "version", "author"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What a diagnostic is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Descriptor missing or not parseable
    Structural,
    /// Required field missing or malformed
    Schema,
    /// Content directories
    Layout,
    /// Optional capability references
    Capability,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Structural => "structural",
            DiagnosticKind::Schema => "schema",
            DiagnosticKind::Layout => "layout",
            DiagnosticKind::Capability => "capability",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Outcome of validating one package
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub package_name: String,
    pub path: PathBuf,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationResult {
    fn new(package_name: String, path: &Path) -> Self {
        Self {
            package_name,
            path: path.to_path_buf(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, severity: Severity, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(kind, message);
        match severity {
            Severity::Error => self.errors.push(diagnostic),
            Severity::Warning => self.warnings.push(diagnostic),
        }
    }

    fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Severity::Error, kind, message);
    }

    fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Severity::Warning, kind, message);
    }
}

/// Validate the package at `package_path`
pub fn validate(package_path: &Path) -> ValidationResult {
    let descriptor = descriptor_path(package_path);
    let mut result = ValidationResult::new(dir_name(package_path), package_path);

    // (a) descriptor must exist and parse; anything else is pointless without it
    let value = match read_descriptor(&descriptor) {
        Ok(value) => value,
        Err(message) => {
            result.error(DiagnosticKind::Structural, message);
            tracing::debug!("{}: structural failure", package_path.display());
            return result;
        }
    };

    if let Some(name) = value.get("name").and_then(Value::as_str) {
        if !name.is_empty() {
            result.package_name = name.to_string();
        }
    }

    check_required(&value, &mut result);
    check_formats(&value, &mut result);
    let kinds = check_kinds(&value, &mut result);
    check_string_lists(&value, &mut result);
    check_capabilities(&value, &mut result);

    // Catch any shape mismatch the field checks above did not name
    if result.errors.is_empty() {
        if let Err(e) = serde_json::from_value::<PackageManifest>(value) {
            result.error(DiagnosticKind::Schema, format!("malformed manifest: {}", e));
        }
    }

    if let Some(kinds) = kinds {
        check_layout(package_path, &kinds, &mut result);
    }

    tracing::debug!(
        "validated {}: {} error(s), {} warning(s)",
        result.package_name,
        result.errors.len(),
        result.warnings.len()
    );
    result
}

fn read_descriptor(path: &Path) -> std::result::Result<Value, String> {
    if !path.is_file() {
        return Err(format!("descriptor not found: {}", path.display()));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("cannot read descriptor {}: {}", path.display(), e))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| format!("descriptor is not valid JSON ({}): {}", path.display(), e))?;

    if !value.is_object() {
        return Err(format!(
            "descriptor must be a JSON object: {}",
            path.display()
        ));
    }
    Ok(value)
}

// (b)
fn check_required(value: &Value, result: &mut ValidationResult) {
    for field in REQUIRED_FIELDS {
        let present = match (*field, value.get(*field)) {
            (_, None) | (_, Some(Value::Null)) => false,
            (_, Some(Value::String(s))) => !s.trim().is_empty(),
            ("author", Some(Value::Object(author))) => author
                .get("name")
                .and_then(Value::as_str)
                .map(|n| !n.trim().is_empty())
                .unwrap_or(false),
            (_, Some(_)) => {
                result.error(
                    DiagnosticKind::Schema,
                    format!("field '{}' must be a string", field),
                );
                continue;
            }
        };

        if !present {
            result.error(
                DiagnosticKind::Schema,
                format!("required field '{}' is missing or empty", field),
            );
        }
    }
}

// (c) and (d)
fn check_formats(value: &Value, result: &mut ValidationResult) {
    if let Some(name) = value.get("name").and_then(Value::as_str) {
        if !name.trim().is_empty() && !is_slug(name) {
            result.error(
                DiagnosticKind::Schema,
                format!(
                    "name '{}' must be kebab-case (lowercase letters, digits, single hyphens)",
                    name
                ),
            );
        }
    }

    if let Some(version) = value.get("version").and_then(Value::as_str) {
        if !version.trim().is_empty() && !is_semver(version) {
            result.error(
                DiagnosticKind::Schema,
                format!("version '{}' is not a semantic version", version),
            );
        }
    }
}

/// Returns the declared kinds, or `None` when `kind` itself is malformed
fn check_kinds(value: &Value, result: &mut ValidationResult) -> Option<Vec<ContentKind>> {
    let raw: Vec<&Value> = match value.get("kind") {
        None | Some(Value::Null) => return Some(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    };

    let mut kinds = Vec::new();
    let mut ok = true;
    for item in raw {
        match item.as_str().map(str::parse::<ContentKind>) {
            Some(Ok(kind)) => kinds.push(kind),
            Some(Err(message)) => {
                result.error(DiagnosticKind::Schema, message);
                ok = false;
            }
            None => {
                result.error(DiagnosticKind::Schema, "field 'kind' must hold strings");
                ok = false;
            }
        }
    }

    kinds.sort();
    kinds.dedup();
    ok.then_some(kinds)
}

fn check_string_lists(value: &Value, result: &mut ValidationResult) {
    for field in ["keywords", "categories"] {
        let Some(list) = value.get(field) else {
            continue;
        };
        let Some(items) = list.as_array() else {
            result.error(
                DiagnosticKind::Schema,
                format!("field '{}' must be an array of strings", field),
            );
            continue;
        };

        let mut seen = HashSet::new();
        for item in items {
            match item.as_str() {
                Some(s) if !seen.insert(s) => {
                    result.warn(
                        DiagnosticKind::Schema,
                        format!("duplicate entry '{}' in '{}'", s, field),
                    );
                }
                Some(_) => {}
                None => result.error(
                    DiagnosticKind::Schema,
                    format!("field '{}' must be an array of strings", field),
                ),
            }
        }
    }
}

fn check_capabilities(value: &Value, result: &mut ValidationResult) {
    let Some(capabilities) = value.get("capabilities") else {
        return;
    };
    let Some(capabilities) = capabilities.as_object() else {
        result.error(
            DiagnosticKind::Schema,
            "field 'capabilities' must be an object",
        );
        return;
    };

    for direction in ["provides", "consumes"] {
        let Some(list) = capabilities.get(direction) else {
            continue;
        };
        let Some(items) = list.as_array() else {
            result.error(
                DiagnosticKind::Schema,
                format!("'capabilities.{}' must be an array of strings", direction),
            );
            continue;
        };

        for item in items {
            match item.as_str() {
                Some(name) if is_slug(name) => {}
                Some(name) => result.error(
                    DiagnosticKind::Schema,
                    format!(
                        "capability '{}' in 'capabilities.{}' must be kebab-case",
                        name, direction
                    ),
                ),
                None => result.error(
                    DiagnosticKind::Schema,
                    format!("'capabilities.{}' must be an array of strings", direction),
                ),
            }
        }
    }
}

// (e)
fn check_layout(package_path: &Path, declared: &[ContentKind], result: &mut ValidationResult) {
    let mut has_content = false;

    for kind in CONTENT_DIR_KINDS {
        let Some(dir) = kind.dir_name() else {
            continue;
        };
        let path = package_path.join(dir);
        let exists = path.is_dir();
        let file_count = list_files(package_path, &path).len();
        has_content |= file_count > 0;

        if declared.contains(kind) {
            if !exists {
                result.error(
                    DiagnosticKind::Layout,
                    format!("declares kind '{}' but has no '{}/' directory", kind, dir),
                );
            } else if file_count == 0 {
                result.error(
                    DiagnosticKind::Layout,
                    format!("declares kind '{}' but '{}/' contains no files", kind, dir),
                );
            }
        } else if exists && file_count == 0 {
            result.warn(
                DiagnosticKind::Layout,
                format!("'{}/' directory is empty", dir),
            );
        }
    }

    if declared.is_empty() && !has_content {
        result.warn(
            DiagnosticKind::Layout,
            "no content directories (commands, agents, hooks, skills) and no declared kind",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn package(manifest: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".claude-plugin/plugin.json", manifest);
        temp
    }

    const VALID: &str = r#"{
        "name": "rails-workflow",
        "version": "1.2.0",
        "description": "Rails workflow commands",
        "author": {"name": "Test Owner"},
        "kind": ["commands", "agents"],
        "keywords": ["rails"],
        "capabilities": {"consumes": ["docs-search"]}
    }"#;

    #[test]
    fn valid_package_has_no_errors() {
        let temp = package(VALID);
        write(temp.path(), "commands/plan.md", "plan");
        write(temp.path(), "agents/reviewer.md", "review");

        let result = validate(temp.path());
        assert!(result.passed(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.package_name, "rails-workflow");
    }

    #[test]
    fn missing_descriptor_short_circuits() {
        let temp = TempDir::new().unwrap();
        // Would trigger a layout warning if layout checks still ran
        fs::create_dir_all(temp.path().join("commands")).unwrap();

        let result = validate(temp.path());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, DiagnosticKind::Structural);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn unparseable_descriptor_is_structural() {
        let temp = package("{ not json");
        let result = validate(temp.path());

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, DiagnosticKind::Structural);
    }

    #[test]
    fn bad_name_is_one_schema_error() {
        let temp = package(
            r#"{"name": "Rails_Workflow", "version": "1.0.0", "description": "d", "author": "a", "kind": "capability-provider"}"#,
        );

        let result = validate(temp.path());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, DiagnosticKind::Schema);
        assert!(result.errors[0].message.contains("Rails_Workflow"));
        assert_eq!(result.package_name, "Rails_Workflow");
    }

    #[test]
    fn required_fields_reported_together() {
        let temp = package(r#"{"name": "x", "description": "", "kind": "capability-provider"}"#);
        let result = validate(temp.path());

        let messages: Vec<_> = result.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(result.errors.len(), 3, "{:?}", messages);
        assert!(messages.iter().any(|m| m.contains("'description'")));
        assert!(messages.iter().any(|m| m.contains("'version'")));
        assert!(messages.iter().any(|m| m.contains("'author'")));
    }

    #[test]
    fn blank_name_is_reported_once() {
        let temp = package(
            r#"{"name": "  ", "version": "1.0.0", "description": "d", "author": "a", "kind": "capability-provider"}"#,
        );
        let result = validate(temp.path());

        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert!(result.errors[0].message.contains("missing or empty"));
    }

    #[test]
    fn bad_version_is_schema_error() {
        let temp = package(
            r#"{"name": "x", "version": "1.0", "description": "d", "author": "a", "kind": "capability-provider"}"#,
        );
        let result = validate(temp.path());

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("semantic version"));
    }

    #[test]
    fn declared_kind_without_directory_is_error() {
        let temp = package(
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a", "kind": "skills"}"#,
        );
        let result = validate(temp.path());

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, DiagnosticKind::Layout);
    }

    #[test]
    fn undeclared_empty_directory_is_warning() {
        let temp = package(
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a"}"#,
        );
        write(temp.path(), "commands/go.md", "go");
        fs::create_dir_all(temp.path().join("hooks")).unwrap();

        let result = validate(temp.path());
        assert!(result.passed());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("hooks/"));
    }

    #[test]
    fn no_content_without_kind_is_warning() {
        let temp = package(
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a"}"#,
        );
        let result = validate(temp.path());

        assert!(result.passed());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, DiagnosticKind::Layout);
    }

    #[test]
    fn capability_provider_without_content_is_clean() {
        let temp = package(
            r#"{"name": "docs", "version": "0.1.0", "description": "d", "author": "a",
                "kind": "capability-provider", "capabilities": {"provides": ["docs-search"]}}"#,
        );
        let result = validate(temp.path());

        assert!(result.passed());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn malformed_capability_name_is_schema_error() {
        let temp = package(
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a",
                "kind": "capability-provider", "capabilities": {"consumes": ["Docs Search"]}}"#,
        );
        let result = validate(temp.path());

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("Docs Search"));
    }

    #[test]
    fn unknown_kind_and_wrong_types() {
        let temp = package(
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a",
                "kind": "widgets", "keywords": "rails"}"#,
        );
        let result = validate(temp.path());

        assert_eq!(result.errors.len(), 2, "{:?}", result.errors);
        assert!(result.errors.iter().all(|e| e.kind == DiagnosticKind::Schema));
    }

    #[test]
    fn duplicate_keywords_warn() {
        let temp = package(
            r#"{"name": "x", "version": "1.0.0", "description": "d", "author": "a",
                "kind": "capability-provider", "keywords": ["a", "a"]}"#,
        );
        let result = validate(temp.path());

        assert!(result.passed());
        assert_eq!(result.warnings.len(), 1);
    }
}
