//! Parse tree for templates.

use std::fmt;

/// 1-based source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub root: ListNode,
}

/// A sequence of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    pub pos: Pos,
    pub nodes: Vec<Node>,
}

/// Statement-level nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    If(BranchNode),
    Range(BranchNode),
    With(BranchNode),
    Template(TemplateNode),
    Break(Pos),
    Continue(Pos),
}

impl Node {
    pub fn pos(&self) -> Pos {
        match self {
            Self::Text(n) => n.pos,
            Self::Action(n) => n.pos,
            Self::If(n) | Self::Range(n) | Self::With(n) => n.pos,
            Self::Template(n) => n.pos,
            Self::Break(pos) | Self::Continue(pos) => *pos,
        }
    }

    /// Short name of the node kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Action(_) => "action",
            Self::If(_) => "if",
            Self::Range(_) => "range",
            Self::With(_) => "with",
            Self::Template(_) => "template",
            Self::Break(_) => "break",
            Self::Continue(_) => "continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub pos: Pos,
    pub text: String,
}

/// `{{pipeline}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub pos: Pos,
    pub pipe: PipeNode,
}

/// Shared shape of `if`, `range` and `with`.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub pos: Pos,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

/// `{{template "name" pipeline}}`
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub pos: Pos,
    pub name: String,
    pub pipe: Option<PipeNode>,
}

/// Commands joined by `|`, optionally preceded by variable declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeNode {
    pub pos: Pos,
    /// `$x = ...` rather than `$x := ...`.
    pub is_assign: bool,
    pub decls: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

/// A function call or a single operand.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub pos: Pos,
    pub args: Vec<Arg>,
}

/// Operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// The cursor, `.`
    Dot(Pos),
    Field(FieldNode),
    Variable(VariableNode),
    /// A function name.
    Identifier(IdentifierNode),
    /// `(term).Field1.Field2`
    Chain(ChainNode),
    /// A parenthesized pipeline.
    Pipe(Box<PipeNode>),
    String(StringNode),
    Number(NumberNode),
    Bool(Pos, bool),
    Nil(Pos),
}

impl Arg {
    pub fn pos(&self) -> Pos {
        match self {
            Self::Dot(pos) | Self::Bool(pos, _) | Self::Nil(pos) => *pos,
            Self::Field(n) => n.pos,
            Self::Variable(n) => n.pos,
            Self::Identifier(n) => n.pos,
            Self::Chain(n) => n.pos,
            Self::Pipe(n) => n.pos,
            Self::String(n) => n.pos,
            Self::Number(n) => n.pos,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Dot(_) => "dot",
            Self::Field(_) => "field",
            Self::Variable(_) => "variable",
            Self::Identifier(_) => "identifier",
            Self::Chain(_) => "chain",
            Self::Pipe(_) => "pipeline",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(..) => "bool",
            Self::Nil(_) => "nil",
        }
    }
}

/// `.A.B.C`, idents stored without dots.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub pos: Pos,
    pub idents: Vec<String>,
}

/// `$x.A.B`, the first ident keeps its `$`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub pos: Pos,
    pub idents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierNode {
    pub pos: Pos,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    pub pos: Pos,
    pub node: Box<Arg>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub pos: Pos,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    pub pos: Pos,
    pub text: String,
}

impl NumberNode {
    /// Integer constants, including character constants.
    pub fn is_integer(&self) -> bool {
        let text = self.text.trim_start_matches(['+', '-']);
        if text.starts_with('\'') {
            return true;
        }
        let lower = text.to_ascii_lowercase();
        if lower.starts_with("0x") {
            return !lower.contains('p') && !lower.ends_with('i');
        }
        !lower.contains(['.', 'e', 'i'])
    }
}
