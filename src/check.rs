//! Template checks
//!
//! Glue from template source to validation result, for a single template or a
//! manifest of them:
//!
//! ```toml
//! [[templates]]
//! name = "cluster describe"
//! type = "*app.Cluster"
//! template = "{{.Name}} {{.StateName}}"
//!
//! [[templates]]
//! name = "cluster list"
//! type = "[]app.Cluster"
//! file = "templates/cluster_list.tmpl"
//! ```
//!
//! Inside a batch, a template that fails to parse (or cannot be read) does not
//! stop the others unless `fail_fast` is set.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::calltree::build_call_tree;
use crate::error::{CheckerError, Result};
use crate::types::{TypeExpr, TypeResolver};
use crate::validation::{Mismatch, ValidationResult, Validator};

/// Parse, build and validate one template against `root_type`.
pub fn check_template<R: TypeResolver + ?Sized>(
    source: &str,
    root_type: &TypeExpr,
    resolver: &R,
) -> Result<ValidationResult> {
    check_with(source, root_type, &Validator::new(resolver))
}

fn check_with<R: TypeResolver + ?Sized>(
    source: &str,
    root_type: &TypeExpr,
    validator: &Validator<'_, R>,
) -> Result<ValidationResult> {
    let tree = build_call_tree(source)?;
    Ok(validator.validate(&tree, root_type))
}

/// Templates to check, with the type each one is rendered against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub templates: Vec<TemplateEntry>,

    /// Directory `file` entries are relative to.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub root_type: TypeExpr,
    /// Inline template source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Template file, relative to the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl TemplateEntry {
    pub fn inline(name: impl Into<String>, root_type: TypeExpr, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_type,
            template: Some(template.into()),
            file: None,
        }
    }

    /// The template text, read from disk for `file` entries.
    pub fn source(&self, base_dir: &Path) -> Result<String> {
        match (&self.template, &self.file) {
            (Some(template), None) => Ok(template.clone()),
            (None, Some(file)) => Ok(fs::read_to_string(base_dir.join(file))?),
            _ => Err(CheckerError::Manifest(format!(
                "template '{}' needs exactly one of `template` or `file`",
                self.name
            ))),
        }
    }
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let manifest = Self::from_toml_str(&content, base_dir)?;
        debug!(
            path = %path.display(),
            templates = manifest.templates.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    pub fn from_toml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut manifest: Manifest = toml::from_str(content)?;
        manifest.base_dir = base_dir.into();

        for entry in &manifest.templates {
            if entry.template.is_some() == entry.file.is_some() {
                return Err(CheckerError::Manifest(format!(
                    "template '{}' needs exactly one of `template` or `file`",
                    entry.name
                )));
            }
        }
        Ok(manifest)
    }
}

/// Batch behaviour.
#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    /// Abort the batch on the first template that cannot be checked.
    pub fail_fast: bool,
    /// Attach "did you mean" suggestions to missing fields.
    pub suggestions: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            suggestions: true,
        }
    }
}

/// What happened to one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Valid,
    Invalid { mismatches: Vec<Mismatch> },
    /// The template could not be read, parsed or built.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateReport {
    pub name: String,
    #[serde(rename = "type")]
    pub root_type: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Results of a manifest run, in manifest order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub templates: Vec<TemplateReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.templates.len()
    }

    pub fn valid(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Valid))
    }

    pub fn invalid(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Invalid { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.templates.iter().filter(|t| pred(&t.outcome)).count()
    }

    /// Every template was checked and matched its type.
    pub fn is_success(&self) -> bool {
        self.valid() == self.total()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} template(s): {} valid, {} invalid, {} failed",
            self.total(),
            self.valid(),
            self.invalid(),
            self.failed()
        )
    }

    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();
        for report in &self.templates {
            let label = format!("{} ({})", report.name, report.root_type);
            match &report.outcome {
                Outcome::Valid => lines.push(format!("✅ {}", label)),
                Outcome::Invalid { mismatches } => {
                    lines.push(format!("❌ {} - {} mismatch(es)", label, mismatches.len()));
                    lines.extend(mismatches.iter().map(|m| format!("   └─ {}", m)));
                }
                Outcome::Failed { error } => lines.push(format!("⚠️  {} - {}", label, error)),
            }
        }
        lines.push(String::new());
        lines.push(self.summary());
        lines.push(String::new());
        lines.join("\n")
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Check every template of `manifest`.
///
/// Returns `Err` only when `fail_fast` is set and a template could not be
/// checked; otherwise failures are recorded in the report.
pub fn run_batch<R: TypeResolver + ?Sized>(
    manifest: &Manifest,
    resolver: &R,
    options: CheckOptions,
) -> Result<BatchReport> {
    let validator = Validator::new(resolver).with_suggestions(options.suggestions);
    let mut report = BatchReport::default();

    for entry in &manifest.templates {
        let checked = entry
            .source(&manifest.base_dir)
            .and_then(|source| check_with(&source, &entry.root_type, &validator));

        let outcome = match checked {
            Ok(result) if result.is_valid() => Outcome::Valid,
            Ok(result) => Outcome::Invalid {
                mismatches: result.into_iter().collect(),
            },
            Err(e) if options.fail_fast => return Err(e),
            Err(e) => {
                warn!(template = %entry.name, error = %e, "template could not be checked");
                Outcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        debug!(template = %entry.name, root = %entry.root_type, ?outcome, "checked template");

        report.templates.push(TemplateReport {
            name: entry.name.clone(),
            root_type: entry.root_type.to_string(),
            outcome,
        });
    }

    info!(
        total = report.total(),
        valid = report.valid(),
        invalid = report.invalid(),
        failed = report.failed(),
        "template check finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeCatalog;

    fn catalog() -> TypeCatalog {
        TypeCatalog::from_toml_str(
            r#"
[types."app.Cluster"]
fields = [
    { name = "Name", type = "string" },
    { name = "Nodes", type = "[]string" },
]
"#,
        )
        .unwrap()
    }

    fn ty(s: &str) -> TypeExpr {
        s.parse().unwrap()
    }

    #[test]
    fn test_check_template() {
        let catalog = catalog();
        let result = check_template("{{.Name}}", &ty("*app.Cluster"), &catalog).unwrap();
        assert!(result.is_valid());

        let result = check_template("{{.Nmae}}", &ty("app.Cluster"), &catalog).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_check_template_propagates_errors() {
        let err = check_template("{{.Name", &ty("app.Cluster"), &catalog()).unwrap_err();
        assert!(err.is_template_error());
    }

    #[test]
    fn test_manifest_entry_needs_one_source() {
        let err = Manifest::from_toml_str(
            r#"
[[templates]]
name = "both"
type = "app.Cluster"
template = "{{.Name}}"
file = "x.tmpl"
"#,
            ".",
        )
        .unwrap_err();
        assert!(matches!(err, CheckerError::Manifest(_)));

        let err = Manifest::from_toml_str(
            r#"
[[templates]]
name = "neither"
type = "app.Cluster"
"#,
            ".",
        )
        .unwrap_err();
        assert!(matches!(err, CheckerError::Manifest(_)));
    }

    #[test]
    fn test_manifest_rejects_bad_type() {
        let err = Manifest::from_toml_str(
            r#"
[[templates]]
name = "bad"
type = "map[string"
template = "{{.}}"
"#,
            ".",
        )
        .unwrap_err();
        assert!(matches!(err, CheckerError::Toml(_)));
    }

    fn manifest() -> Manifest {
        Manifest {
            templates: vec![
                TemplateEntry::inline("ok", ty("app.Cluster"), "{{.Name}}"),
                TemplateEntry::inline("typo", ty("app.Cluster"), "{{.Nmae}}"),
                TemplateEntry::inline("broken", ty("app.Cluster"), "{{if .Name}}"),
                TemplateEntry::inline("nodes", ty("app.Cluster"), "{{range .Nodes}}{{.}}{{end}}"),
            ],
            base_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_batch_isolates_failures() {
        let report = run_batch(&manifest(), &catalog(), CheckOptions::default()).unwrap();
        assert_eq!(report.total(), 4);
        assert_eq!(report.valid(), 2);
        assert_eq!(report.invalid(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
        assert!(matches!(report.templates[2].outcome, Outcome::Failed { .. }));
    }

    #[test]
    fn test_batch_fail_fast() {
        let options = CheckOptions {
            fail_fast: true,
            ..CheckOptions::default()
        };
        let err = run_batch(&manifest(), &catalog(), options).unwrap_err();
        assert!(matches!(err, CheckerError::TemplateSyntax { .. }));
    }

    #[test]
    fn test_missing_file_is_isolated() {
        let manifest = Manifest {
            templates: vec![TemplateEntry {
                name: "gone".to_string(),
                root_type: ty("app.Cluster"),
                template: None,
                file: Some(PathBuf::from("does-not-exist.tmpl")),
            }],
            base_dir: std::env::temp_dir(),
        };
        let report = run_batch(&manifest, &catalog(), CheckOptions::default()).unwrap();
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_report_rendering() {
        let report = run_batch(&manifest(), &catalog(), CheckOptions::default()).unwrap();
        let text = report.render_text();
        assert!(text.contains("✅ ok (app.Cluster)"));
        assert!(text.contains("❌ typo (app.Cluster) - 1 mismatch(es)"));
        assert!(text.contains("path: '.nmae', error: field 'nmae' is missing (did you mean 'name'?)"));
        assert!(text.ends_with("4 template(s): 2 valid, 1 invalid, 1 failed\n"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["templates"][0]["status"], "valid");
        assert_eq!(json["templates"][1]["status"], "invalid");
        assert_eq!(json["templates"][1]["mismatches"][0]["breadcrumb"], ".nmae");
        assert_eq!(json["templates"][2]["status"], "failed");
        assert_eq!(json["templates"][3]["type"], "app.Cluster");
    }

    #[test]
    fn test_empty_batch_is_success() {
        let report = run_batch(&Manifest::default(), &catalog(), CheckOptions::default()).unwrap();
        assert!(report.is_success());
    }
}
