//! Template grammar front-end
//!
//! Lexes and parses `{{ }}`-delimited templates into a parse tree. Only the
//! structure matters here: templates are never executed, and the registered
//! functions in [`funcs`] exist so that calls to them are accepted.

pub mod ast;
pub mod funcs;
pub mod lexer;
pub mod parser;

pub use ast::{Arg, BranchNode, ListNode, Node, PipeNode, Pos, Template};
pub use parser::parse;
