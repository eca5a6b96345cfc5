//! Type-shape plumbing
//!
//! Validation never looks at concrete types, only at their [`TypeShape`]: a
//! closed set of kinds (scalar, struct, pointer, slice, map) obtained from a
//! [`TypeResolver`]. Types themselves are written as Go-style expressions
//! ([`TypeExpr`]) such as `*app.Cluster`, `[]string` or `map[string]app.Tag`.

pub mod catalog;

pub use catalog::{CatalogFile, FieldDecl, MethodDecl, TypeCatalog, TypeDecl};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CheckerError, Result};

/// A Go-style type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeExpr {
    /// A built-in or declared type name, optionally package qualified.
    Named(String),
    /// `*T`
    Pointer(Box<TypeExpr>),
    /// `[]T`
    Slice(Box<TypeExpr>),
    /// `[N]T`
    Array { len: usize, elem: Box<TypeExpr> },
    /// `map[K]V`
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// The type name, for named types.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// The expression with every leading `*` removed.
    pub fn strip_pointers(&self) -> &TypeExpr {
        let mut ty = self;
        while let Self::Pointer(elem) = ty {
            ty = elem.as_ref();
        }
        ty
    }

    /// Every type name the expression mentions.
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Named(name) => names.push(name),
            Self::Pointer(elem) | Self::Slice(elem) | Self::Array { elem, .. } => {
                elem.collect_names(names)
            }
            Self::Map { key, value } => {
                key.collect_names(names);
                value.collect_names(names);
            }
        }
    }

    /// The shape of a composite expression. Named types need a resolver.
    pub fn composite_shape(&self) -> Option<TypeShape<'_>> {
        match self {
            Self::Named(_) => None,
            Self::Pointer(elem) => Some(TypeShape::Pointer(elem)),
            Self::Slice(elem) | Self::Array { elem, .. } => Some(TypeShape::Slice(elem)),
            Self::Map { key, value } => Some(TypeShape::Map { key, value }),
        }
    }

    fn parse_expr(expr: &str, full: &str) -> Result<Self> {
        let invalid = |reason: &str| CheckerError::InvalidTypeExpr {
            expr: full.to_string(),
            reason: reason.to_string(),
        };

        let expr = expr.trim();
        if expr.is_empty() {
            return Err(invalid("missing type"));
        }

        if let Some(rest) = expr.strip_prefix('*') {
            return Ok(Self::Pointer(Box::new(Self::parse_expr(rest, full)?)));
        }
        if let Some(rest) = expr.strip_prefix("[]") {
            return Ok(Self::Slice(Box::new(Self::parse_expr(rest, full)?)));
        }
        if let Some(rest) = expr.strip_prefix("map[") {
            let close = matching_bracket(rest).ok_or_else(|| invalid("unclosed map key"))?;
            let key = Self::parse_expr(&rest[..close], full)?;
            let value = Self::parse_expr(&rest[close + 1..], full)?;
            return Ok(Self::Map {
                key: Box::new(key),
                value: Box::new(value),
            });
        }
        if let Some(rest) = expr.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| invalid("unclosed array length"))?;
            let len = rest[..close]
                .trim()
                .parse()
                .map_err(|_| invalid("array length is not a number"))?;
            let elem = Self::parse_expr(&rest[close + 1..], full)?;
            return Ok(Self::Array {
                len,
                elem: Box::new(elem),
            });
        }

        if !is_type_name(expr) {
            return Err(invalid("not a type name"));
        }
        Ok(Self::Named(expr.to_string()))
    }
}

/// Index of the `]` closing an already opened `[`.
fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' if depth == 0 => return Some(i),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// `name`, `pkg.Name` or `example.com/pkg.Name`.
fn is_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '-'))
        && !s.ends_with('.')
}

impl FromStr for TypeExpr {
    type Err = CheckerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_expr(s, s)
    }
}

impl TryFrom<String> for TypeExpr {
    type Error = CheckerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TypeExpr> for String {
    fn from(value: TypeExpr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::Pointer(elem) => write!(f, "*{}", elem),
            Self::Slice(elem) => write!(f, "[]{}", elem),
            Self::Array { len, elem } => write!(f, "[{}]{}", len, elem),
            Self::Map { key, value } => write!(f, "map[{}]{}", key, value),
        }
    }
}

/// Template-addressable members of a struct, keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldSet {
    fields: BTreeMap<String, TypeExpr>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless a member with the same (case-insensitive) name exists.
    pub fn insert(&mut self, name: &str, ty: TypeExpr) -> bool {
        let key = name.to_lowercase();
        if self.fields.contains_key(&key) {
            return false;
        }
        self.fields.insert(key, ty);
        true
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&TypeExpr> {
        self.fields.get(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeExpr)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, TypeExpr)> for FieldSet {
    fn from_iter<I: IntoIterator<Item = (S, TypeExpr)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, ty) in iter {
            set.insert(name.as_ref(), ty);
        }
        set
    }
}

/// The structural kind of a type, as far as templates can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape<'a> {
    Scalar,
    Struct(&'a FieldSet),
    Pointer(&'a TypeExpr),
    Slice(&'a TypeExpr),
    Map {
        key: &'a TypeExpr,
        value: &'a TypeExpr,
    },
}

/// Maps type expressions to shapes.
pub trait TypeResolver {
    /// `None` when the type is unknown.
    fn resolve<'a>(&'a self, ty: &'a TypeExpr) -> Option<TypeShape<'a>>;
}

impl<R: TypeResolver + ?Sized> TypeResolver for &R {
    fn resolve<'a>(&'a self, ty: &'a TypeExpr) -> Option<TypeShape<'a>> {
        (**self).resolve(ty)
    }
}
