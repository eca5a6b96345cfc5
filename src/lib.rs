//! Templates Checker
//!
//! Statically checks that `{{ }}` output templates only dereference fields
//! that exist on the type they are rendered against.
//!
//! ## Pipeline
//!
//! - **Parse**: the template source becomes a parse tree ([`template`])
//! - **Build**: the parse tree becomes a call tree, the union of every field
//!   path the template may touch ([`calltree`])
//! - **Validate**: the call tree is walked alongside the shape of the root type
//!   and every disagreement is reported ([`validation`])
//!
//! Types are described by a [`TypeResolver`]; [`TypeCatalog`] is one built from
//! TOML or JSON declarations.
//!
//! ```text
//! {{range .Items}}{{.Nmae}}{{end}}   against   app.Order
//!
//! path: '.items[].nmae', error: field 'nmae' is missing (did you mean 'name'?)
//! ```

pub mod calltree;
pub mod check;
pub mod config;
pub mod error;
pub mod template;
pub mod types;
pub mod validation;

pub use calltree::{build_call_tree, CallTree, Facets, TreeBuilder};
pub use check::{check_template, run_batch, BatchReport, CheckOptions, Manifest, Outcome, TemplateEntry};
pub use config::{CheckerConfig, OutputFormat};
pub use error::{CheckerError, Result};
pub use types::{FieldSet, TypeCatalog, TypeExpr, TypeResolver, TypeShape};
pub use validation::{Mismatch, ValidationResult, Validator};
