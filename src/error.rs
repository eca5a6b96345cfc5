//! Error types for the templates checker

use thiserror::Error;

use crate::template::Pos;

/// Result type for checker operations
pub type Result<T> = std::result::Result<T, CheckerError>;

/// Templates checker errors
///
/// Shape mismatches between a template and its type are not errors; they are
/// reported through [`crate::validation::ValidationResult`].
#[derive(Error, Debug)]
pub enum CheckerError {
    #[error("template syntax error at {line}:{column}: {message}")]
    TemplateSyntax {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("unsupported template construct at {line}:{column}: {message}")]
    UnsupportedConstruct {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("unknown type '{name}' referenced by {referenced_by}")]
    UnknownType { name: String, referenced_by: String },

    #[error("invalid type catalog: {0}")]
    Catalog(String),

    #[error("invalid type expression '{expr}': {reason}")]
    InvalidTypeExpr { expr: String, reason: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckerError {
    pub fn syntax(pos: Pos, message: impl Into<String>) -> Self {
        Self::TemplateSyntax {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    pub fn unsupported(pos: Pos, message: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    /// Whether the error belongs to a single template rather than the whole run.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            Self::TemplateSyntax { .. } | Self::UnsupportedConstruct { .. }
        )
    }
}
