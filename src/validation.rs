//! Call tree validation
//!
//! Walks a call tree alongside the shape of the type the template will be
//! rendered against. Mismatches are collected, never raised: every field the
//! template touches is checked, even after a sibling has failed.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::calltree::{CallTree, Facets};
use crate::types::{FieldSet, TypeExpr, TypeResolver, TypeShape};

/// Breadcrumb segment for list elements and map entries.
const ELEMENT_BREADCRUMB: &str = "[]";

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Slices and maps reject being drilled into with the same message.
const NOT_A_STRUCT: &str = "expecting a list, got a struct instead";

/// One place where the template and the type disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Location in the call tree, like `.items[].name`. Empty at the root.
    pub breadcrumb: String,
    pub message: String,
    /// A similarly named field of the type, for missing fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path: '{}', error: {}", self.breadcrumb, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", suggestion)?;
        }
        Ok(())
    }
}

/// All mismatches found for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    is_valid: bool,
    mismatches: Vec<Mismatch>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            mismatches: Vec::new(),
        }
    }

    pub fn add(&mut self, breadcrumb: &str, message: impl Into<String>) {
        self.push(Mismatch {
            breadcrumb: breadcrumb.to_string(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub fn push(&mut self, mismatch: Mismatch) {
        self.mismatches.push(mismatch);
        self.is_valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    /// Rendered mismatches, one line each.
    pub fn error_messages(&self) -> Vec<String> {
        self.mismatches.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.mismatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoIterator for ValidationResult {
    type Item = Mismatch;
    type IntoIter = std::vec::IntoIter<Mismatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.mismatches.into_iter()
    }
}

/// Checks call trees against types known to a resolver.
#[derive(Debug)]
pub struct Validator<'r, R: ?Sized> {
    resolver: &'r R,
    suggestions: bool,
}

impl<'r, R: TypeResolver + ?Sized> Validator<'r, R> {
    pub fn new(resolver: &'r R) -> Self {
        Self {
            resolver,
            suggestions: true,
        }
    }

    /// Enable or disable "did you mean" suggestions on missing fields.
    pub fn with_suggestions(mut self, suggestions: bool) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn validate(&self, tree: &CallTree, ty: &TypeExpr) -> ValidationResult {
        let mut result = ValidationResult::new();
        self.validate_node(tree, ty, "", &mut result);
        debug!(
            root = %ty,
            mismatches = result.len(),
            "validated call tree"
        );
        result
    }

    fn validate_node(
        &self,
        node: &CallTree,
        ty: &TypeExpr,
        breadcrumb: &str,
        result: &mut ValidationResult,
    ) {
        let Some(shape) = self.resolver.resolve(ty) else {
            result.add(breadcrumb, format!("unknown type '{}'", ty));
            return;
        };

        match shape {
            TypeShape::Scalar => {
                if !node.is_leaf() {
                    result.add(breadcrumb, "expected further structure on a scalar field");
                }
            }
            TypeShape::Pointer(elem) => self.validate_node(node, elem, breadcrumb, result),
            TypeShape::Struct(fields) => self.validate_struct(node, fields, breadcrumb, result),
            TypeShape::Slice(elem) => {
                if node.non_empty_fields().is_some() {
                    result.add(breadcrumb, NOT_A_STRUCT);
                } else if let Some(list) = node.list() {
                    let breadcrumb = format!("{}{}", breadcrumb, ELEMENT_BREADCRUMB);
                    self.validate_node(list, elem, &breadcrumb, result);
                }
            }
            TypeShape::Map { key, value } => {
                if node.non_empty_fields().is_some() {
                    result.add(breadcrumb, NOT_A_STRUCT);
                } else if let Some(list) = node.list() {
                    // Keys and values are indistinguishable in the tree, so both must fit.
                    let breadcrumb = format!("{}{}", breadcrumb, ELEMENT_BREADCRUMB);
                    self.validate_node(list, key, &breadcrumb, result);
                    self.validate_node(list, value, &breadcrumb, result);
                }
            }
        }
    }

    fn validate_struct(
        &self,
        node: &CallTree,
        fields: &FieldSet,
        breadcrumb: &str,
        result: &mut ValidationResult,
    ) {
        let used = match node.facets() {
            Facets::Leaf => return,
            Facets::List(_) | Facets::Conflict { .. } => {
                result.add(breadcrumb, "expecting a struct, got a list instead");
                return;
            }
            Facets::Struct(used) => used,
        };

        for (key, child) in used {
            let breadcrumb = format!("{}.{}", breadcrumb, key);
            match fields.get(key) {
                Some(field_ty) => self.validate_node(child, field_ty, &breadcrumb, result),
                None => result.push(Mismatch {
                    message: format!("field '{}' is missing", key),
                    suggestion: self.suggest(key, fields),
                    breadcrumb,
                }),
            }
        }
    }

    fn suggest(&self, key: &str, fields: &FieldSet) -> Option<String> {
        if !self.suggestions {
            return None;
        }

        let mut best: Option<(&str, f64)> = None;
        for known in fields.names() {
            let similarity = strsim::jaro_winkler(key, known);
            if similarity >= SUGGESTION_THRESHOLD && best.map_or(true, |(_, s)| similarity > s) {
                best = Some((known, similarity));
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calltree::build_call_tree;
    use crate::types::TypeCatalog;

    const CATALOG: &str = r#"
[types."app.Summary"]
fields = [
    { name = "Name", type = "string" },
    { name = "Count", type = "int" },
]

[types."app.Item"]
fields = [{ name = "ID", type = "string" }]

[types."app.Base"]
fields = [{ name = "X", type = "string" }]

[types."app.Derived"]
fields = [{ type = "app.Base", embedded = true }]

[types."app.User"]
fields = [{ name = "Email", type = "string" }]
methods = [
    { name = "GetName", results = ["string"] },
    { name = "TotalCount", params = ["int"], results = ["int"] },
]

[types."app.Page"]
fields = [
    { name = "Title", type = "string" },
    { name = "Items", type = "[]*app.Item" },
    { name = "Owner", type = "*app.User" },
    { name = "Labels", type = "map[string]app.Item" },
    { name = "Counts", type = "map[string]int" },
]
"#;

    fn catalog() -> TypeCatalog {
        TypeCatalog::from_toml_str(CATALOG).unwrap()
    }

    fn check(catalog: &TypeCatalog, root: &str, template: &str) -> ValidationResult {
        let tree = build_call_tree(template).unwrap();
        let root: TypeExpr = root.parse().unwrap();
        Validator::new(catalog).validate(&tree, &root)
    }

    #[test]
    fn test_matching_struct() {
        let result = check(&catalog(), "app.Summary", "{{.Name}} {{.Count}}");
        assert!(result.is_valid());
        assert!(result.is_empty());
    }

    #[test]
    fn test_missing_field() {
        let result = check(&catalog(), "app.Summary", "{{.Nmae}}");
        assert!(!result.is_valid());
        assert_eq!(result.len(), 1);

        let mismatch = &result.mismatches()[0];
        assert_eq!(mismatch.breadcrumb, ".nmae");
        assert_eq!(mismatch.message, "field 'nmae' is missing");
        assert_eq!(mismatch.suggestion.as_deref(), Some("name"));
    }

    #[test]
    fn test_suggestions_can_be_disabled() {
        let catalog = catalog();
        let tree = build_call_tree("{{.Nmae}}").unwrap();
        let result = Validator::new(&catalog)
            .with_suggestions(false)
            .validate(&tree, &TypeExpr::named("app.Summary"));
        assert_eq!(result.mismatches()[0].suggestion, None);
        assert_eq!(
            result.error_messages(),
            vec!["path: '.nmae', error: field 'nmae' is missing".to_string()]
        );
    }

    #[test]
    fn test_no_suggestion_for_unrelated_names() {
        let result = check(&catalog(), "app.Summary", "{{.Zzz}}");
        assert_eq!(result.mismatches()[0].suggestion, None);
    }

    #[test]
    fn test_list_of_structs() {
        let catalog = catalog();
        assert!(check(&catalog, "[]app.Item", "{{range .}}{{.ID}}{{end}}").is_valid());

        let result = check(&catalog, "[]app.Item", "{{.ID}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, "");
        assert_eq!(
            result.mismatches()[0].message,
            "expecting a list, got a struct instead"
        );
    }

    #[test]
    fn test_range_over_struct() {
        let result = check(&catalog(), "app.Item", "{{range .}}{{end}}");
        assert_eq!(
            result.mismatches()[0].message,
            "expecting a struct, got a list instead"
        );
    }

    #[test]
    fn test_promoted_field() {
        assert!(check(&catalog(), "app.Derived", "{{.X}}").is_valid());
        assert!(check(&catalog(), "app.Derived", "{{.Base.X}}").is_valid());
    }

    #[test]
    fn test_methods_as_fields() {
        let catalog = catalog();
        assert!(check(&catalog, "app.User", "{{.getname}}").is_valid());

        let result = check(&catalog, "app.User", "{{.TotalCount}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].message, "field 'totalcount' is missing");
    }

    #[test]
    fn test_pointer_is_transparent() {
        let catalog = catalog();
        assert!(check(&catalog, "*app.Page", "{{.Owner.Email}}").is_valid());
        assert!(check(&catalog, "app.Page", "{{range .Items}}{{.ID}}{{end}}").is_valid());
    }

    #[test]
    fn test_scalar_with_structure() {
        let result = check(&catalog(), "app.Page", "{{.Title.Length}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".title");
        assert_eq!(
            result.mismatches()[0].message,
            "expected further structure on a scalar field"
        );
    }

    #[test]
    fn test_siblings_are_all_reported() {
        let result = check(
            &catalog(),
            "app.Page",
            "{{.Bogus}}{{.Owner.Nope}}{{.Title}}{{range .Items}}{{.Missing}}{{end}}",
        );
        let breadcrumbs: Vec<_> = result
            .mismatches()
            .iter()
            .map(|m| m.breadcrumb.as_str())
            .collect();
        assert_eq!(breadcrumbs, vec![".bogus", ".items[].missing", ".owner.nope"]);
    }

    #[test]
    fn test_missing_field_stops_descent() {
        let result = check(&catalog(), "app.Page", "{{.Nope.Deeper.Still}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".nope");
    }

    #[test]
    fn test_map_checks_key_and_value() {
        let catalog = catalog();
        assert!(check(&catalog, "app.Page", "{{range .Counts}}{{.}}{{end}}").is_valid());

        let result = check(&catalog, "app.Page", "{{range .Labels}}{{.ID}}{{end}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".labels[]");
        assert_eq!(
            result.mismatches()[0].message,
            "expected further structure on a scalar field"
        );
    }

    #[test]
    fn test_map_drilled_into() {
        let result = check(&catalog(), "app.Page", "{{.Labels.env}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".labels");
        assert_eq!(
            result.mismatches()[0].message,
            "expecting a list, got a struct instead"
        );
    }

    #[test]
    fn test_scalar_iterated() {
        let catalog = catalog();
        for source in ["{{range .Title}}{{end}}", "{{index .Title 0}}"] {
            let result = check(&catalog, "app.Page", source);
            assert_eq!(result.len(), 1, "{}", source);
            assert_eq!(result.mismatches()[0].breadcrumb, ".title");
            assert_eq!(
                result.mismatches()[0].message,
                "expected further structure on a scalar field"
            );
        }
    }

    #[test]
    fn test_slice_iterated_and_drilled_into() {
        let result = check(
            &catalog(),
            "app.Page",
            "{{.Items.Total}}{{range .Items}}{{.Missing}}{{end}}",
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".items");
        assert_eq!(
            result.mismatches()[0].message,
            "expecting a list, got a struct instead"
        );
    }

    #[test]
    fn test_conflicting_facets() {
        let result = check(
            &catalog(),
            "app.Page",
            "{{.Owner.Email}}{{range .Owner}}{{end}}",
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".owner");
        assert_eq!(
            result.mismatches()[0].message,
            "expecting a struct, got a list instead"
        );
    }

    #[test]
    fn test_unknown_type() {
        let result = check(&catalog(), "app.Phantom", "{{.A}}");
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].message, "unknown type 'app.Phantom'");
    }

    #[test]
    fn test_branches_are_both_checked() {
        let catalog = TypeCatalog::from_toml_str(
            r#"
[types."t.A"]
fields = [{ name = "B", type = "string" }]

[types."t.Root"]
fields = [
    { name = "X", type = "bool" },
    { name = "A", type = "t.A" },
]
"#,
        )
        .unwrap();
        let result = check(
            &catalog,
            "t.Root",
            "{{if .X}}{{.A.B}}{{else}}{{.A.C}}{{end}}",
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result.mismatches()[0].breadcrumb, ".a.c");
    }

    #[test]
    fn test_validation_is_idempotent() {
        let catalog = catalog();
        let tree = build_call_tree("{{.Bogus}}{{range .Items}}{{.Nope}}{{end}}").unwrap();
        let root = TypeExpr::named("app.Page");
        let validator = Validator::new(&catalog);

        let first = validator.validate(&tree, &root);
        let second = validator.validate(&tree, &root);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_mismatch_display() {
        let mismatch = Mismatch {
            breadcrumb: ".nmae".to_string(),
            message: "field 'nmae' is missing".to_string(),
            suggestion: Some("name".to_string()),
        };
        assert_eq!(
            mismatch.to_string(),
            "path: '.nmae', error: field 'nmae' is missing (did you mean 'name'?)"
        );
    }
}
