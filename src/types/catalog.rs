//! Type catalog
//!
//! A [`TypeResolver`] built from type declarations kept in TOML or JSON:
//!
//! ```toml
//! [types."app.Cluster"]
//! fields = [
//!     { name = "Name", type = "string" },
//!     { type = "*app.Meta", embedded = true },
//! ]
//! methods = [{ name = "GetName", results = ["string"] }]
//!
//! [types."app.State"]
//! underlying = "string"
//! ```
//!
//! Every declaration is checked when the catalog is built, so resolution of a
//! declared name never fails afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{FieldSet, TypeExpr, TypeResolver, TypeShape};
use crate::error::{CheckerError, Result};

/// Names that resolve to scalars without being declared.
pub const BUILTIN_SCALARS: &[&str] = &[
    "bool",
    "string",
    "byte",
    "rune",
    "error",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
    "float32",
    "float64",
    "complex64",
    "complex128",
    "time.Time",
    "time.Duration",
];

/// On-disk catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub types: BTreeMap<String, TypeDecl>,
}

/// A named type: either a struct (`fields` and `methods`) or a named
/// non-struct type (`underlying`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<TypeExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Embedded fields may leave this out; they are named after their type.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    #[serde(default)]
    pub embedded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<TypeExpr>,
    #[serde(default)]
    pub results: Vec<TypeExpr>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: false,
        }
    }

    pub fn embedded(ty: TypeExpr) -> Self {
        Self {
            name: String::new(),
            ty,
            embedded: true,
        }
    }

    /// The declared name, or the type name for embedded fields.
    pub fn field_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        let base = self.ty.strip_pointers().name().unwrap_or_default();
        base.rsplit(['.', '/']).next().unwrap_or(base)
    }
}

impl MethodDecl {
    /// The result type, if templates can call the method as a field.
    pub fn template_result(&self) -> Option<&TypeExpr> {
        match (self.params.as_slice(), self.results.as_slice()) {
            ([], [result]) => Some(result),
            _ => None,
        }
    }
}

/// Whether templates can reach a member with this name.
fn is_exported(name: &str) -> bool {
    name.chars().next().map_or(true, char::is_uppercase)
}

#[derive(Debug, Clone)]
enum Entry {
    Builtin,
    Named(TypeExpr),
    Struct(FieldSet),
}

/// Resolves built-in and declared type names.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    entries: BTreeMap<String, Entry>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        let entries = BUILTIN_SCALARS
            .iter()
            .map(|name| (name.to_string(), Entry::Builtin))
            .collect();
        Self { entries }
    }
}

impl TypeCatalog {
    /// A catalog holding only the built-in scalars.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog file; `.json` files are read as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let file: CatalogFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        debug!(path = %path.display(), types = file.types.len(), "loaded type catalog");
        Self::from_file(file)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_file(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_file(serde_json::from_str(content)?)
    }

    /// Check every declaration and compute the field set of each struct.
    pub fn from_file(file: CatalogFile) -> Result<Self> {
        let mut catalog = Self::default();
        let decls = file.types;

        for (name, decl) in &decls {
            if catalog.entries.contains_key(name) {
                return Err(CheckerError::Catalog(format!(
                    "'{}' redeclares a built-in type",
                    name
                )));
            }
            check_shape(name, decl)?;
        }
        for (name, decl) in &decls {
            check_references(name, decl, &catalog, &decls)?;
        }
        check_named_chains(&decls)?;

        let mut builder = FieldSetBuilder {
            decls: &decls,
            done: HashMap::new(),
            in_progress: Vec::new(),
        };
        let mut entries = Vec::with_capacity(decls.len());
        for (name, decl) in &decls {
            let entry = match &decl.underlying {
                Some(underlying) => Entry::Named(underlying.clone()),
                None => Entry::Struct(into_field_set(builder.field_set(name)?)),
            };
            entries.push((name.clone(), entry));
        }
        catalog.entries.extend(entries);

        Ok(catalog)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Template-addressable members of a declared struct.
    pub fn field_set(&self, name: &str) -> Option<&FieldSet> {
        match self.entries.get(name)? {
            Entry::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Declared (non built-in) type names.
    pub fn declared_types(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, entry)| !matches!(entry, Entry::Builtin))
            .map(|(name, _)| name.as_str())
    }
}

impl TypeResolver for TypeCatalog {
    fn resolve<'a>(&'a self, ty: &'a TypeExpr) -> Option<TypeShape<'a>> {
        let mut current = ty;
        loop {
            if let Some(shape) = current.composite_shape() {
                return Some(shape);
            }
            match self.entries.get(current.name()?)? {
                Entry::Builtin => return Some(TypeShape::Scalar),
                Entry::Struct(fields) => return Some(TypeShape::Struct(fields)),
                Entry::Named(underlying) => current = underlying,
            }
        }
    }
}

fn check_shape(name: &str, decl: &TypeDecl) -> Result<()> {
    if decl.underlying.is_some() && !(decl.fields.is_empty() && decl.methods.is_empty()) {
        return Err(CheckerError::Catalog(format!(
            "'{}' declares an underlying type together with fields or methods",
            name
        )));
    }
    for field in &decl.fields {
        if field.name.is_empty() && !field.embedded {
            return Err(CheckerError::Catalog(format!(
                "'{}' has a field of type '{}' without a name",
                name, field.ty
            )));
        }
    }
    Ok(())
}

fn check_references(
    name: &str,
    decl: &TypeDecl,
    catalog: &TypeCatalog,
    decls: &BTreeMap<String, TypeDecl>,
) -> Result<()> {
    let known = |ty: &TypeExpr, member: &str| -> Result<()> {
        for referenced in ty.referenced_names() {
            if !catalog.contains(referenced) && !decls.contains_key(referenced) {
                return Err(CheckerError::UnknownType {
                    name: referenced.to_string(),
                    referenced_by: format!("{}{}", name, member),
                });
            }
        }
        Ok(())
    };

    if let Some(underlying) = &decl.underlying {
        known(underlying, "")?;
    }
    for field in &decl.fields {
        known(&field.ty, &format!(".{}", field.field_name()))?;
        if field.embedded {
            let target = field.ty.strip_pointers().name().and_then(|t| decls.get(t));
            if !matches!(target, Some(target) if target.underlying.is_none()) {
                return Err(CheckerError::Catalog(format!(
                    "embedded field '{}' of '{}' must be a declared struct type, got '{}'",
                    field.field_name(),
                    name,
                    field.ty
                )));
            }
        }
    }
    for method in &decl.methods {
        let member = format!(".{}()", method.name);
        for ty in method.params.iter().chain(&method.results) {
            known(ty, &member)?;
        }
    }
    Ok(())
}

/// Following underlying names (through pointers) must not lead back to the start.
fn check_named_chains(decls: &BTreeMap<String, TypeDecl>) -> Result<()> {
    for start in decls.keys() {
        let mut seen = vec![start.as_str()];
        let mut current = start.as_str();
        while let Some(next) = decls
            .get(current)
            .and_then(|decl| decl.underlying.as_ref())
            .and_then(|ty| ty.strip_pointers().name())
        {
            if seen.contains(&next) {
                return Err(CheckerError::Catalog(format!(
                    "underlying type cycle: {} -> {}",
                    seen.join(" -> "),
                    next
                )));
            }
            seen.push(next);
            current = next;
        }
    }
    Ok(())
}

/// Member type and embedding depth; shallower members hide deeper ones.
type DepthFields = BTreeMap<String, (TypeExpr, usize)>;

fn into_field_set(fields: DepthFields) -> FieldSet {
    fields.into_iter().map(|(name, (ty, _))| (name, ty)).collect()
}

struct FieldSetBuilder<'d> {
    decls: &'d BTreeMap<String, TypeDecl>,
    done: HashMap<String, DepthFields>,
    in_progress: Vec<String>,
}

impl FieldSetBuilder<'_> {
    fn field_set(&mut self, name: &str) -> Result<DepthFields> {
        if let Some(fields) = self.done.get(name) {
            return Ok(fields.clone());
        }
        if self.in_progress.iter().any(|n| n == name) {
            return Err(CheckerError::Catalog(format!(
                "embedding cycle: {} -> {}",
                self.in_progress.join(" -> "),
                name
            )));
        }
        let Some(decl) = self.decls.get(name) else {
            return Err(CheckerError::UnknownType {
                name: name.to_string(),
                referenced_by: "embedding".to_string(),
            });
        };

        self.in_progress.push(name.to_string());
        let mut fields = DepthFields::new();

        for field in &decl.fields {
            let field_name = field.field_name();
            if field.embedded || is_exported(field_name) {
                insert_at_depth(&mut fields, field_name, &field.ty, 0);
            }
        }
        for method in &decl.methods {
            if !is_exported(&method.name) {
                continue;
            }
            if let Some(result) = method.template_result() {
                insert_at_depth(&mut fields, &method.name, result, 0);
            }
        }
        for field in decl.fields.iter().filter(|f| f.embedded) {
            let Some(target) = field.ty.strip_pointers().name() else {
                continue;
            };
            let promoted = self.field_set(target)?;
            for (member, (ty, depth)) in &promoted {
                insert_at_depth(&mut fields, member, ty, depth + 1);
            }
        }

        self.in_progress.pop();
        self.done.insert(name.to_string(), fields.clone());
        Ok(fields)
    }
}

fn insert_at_depth(fields: &mut DepthFields, name: &str, ty: &TypeExpr, depth: usize) {
    let key = name.to_lowercase();
    match fields.get(&key) {
        Some((_, existing)) if *existing <= depth => {}
        _ => {
            fields.insert(key, (ty.clone(), depth));
        }
    }
}
