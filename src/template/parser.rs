//! Recursive descent parser turning the token stream into a [`Template`].

use crate::error::{CheckerError, Result};

use super::ast::*;
use super::funcs;
use super::lexer::{lex, Keyword, Token, TokenKind};

/// Parse a template source into its parse tree.
pub fn parse(source: &str) -> Result<Template> {
    let tokens = lex(source)?;
    Parser::new(tokens).parse_template()
}

/// How deep parenthesized pipelines and control structures may nest.
pub const MAX_NESTING_DEPTH: usize = 100;

/// How an item list was terminated.
enum ListEnd {
    Eof(Pos),
    End(Pos),
    /// `{{else` has been consumed; the rest of the action is still pending.
    Else(Pos),
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Variables in scope, innermost last. `$` is always defined.
    vars: Vec<String>,
    range_depth: usize,
    /// Open parentheses and control structures around the current token.
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            vars: vec!["$".to_string()],
            range_depth: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.index + n)
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        match self.peek().kind {
            TokenKind::Keyword(keyword) => Some(keyword),
            _ => None,
        }
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn unexpected(token: &Token, context: &str) -> CheckerError {
        CheckerError::syntax(
            token.pos,
            format!("unexpected {} in {}", token.kind.describe(), context),
        )
    }

    fn expect_right_delim(&mut self, context: &str) -> Result<()> {
        let token = self.next();
        match token.kind {
            TokenKind::RightDelim => Ok(()),
            _ => Err(Self::unexpected(&token, context)),
        }
    }

    fn parse_template(mut self) -> Result<Template> {
        let (root, end) = self.item_list()?;
        match end {
            ListEnd::Eof(_) => Ok(Template { root }),
            ListEnd::End(pos) => Err(CheckerError::syntax(pos, "unexpected {{end}}")),
            ListEnd::Else(pos) => Err(CheckerError::syntax(pos, "unexpected {{else}}")),
        }
    }

    fn item_list(&mut self) -> Result<(ListNode, ListEnd)> {
        let mut list = ListNode {
            pos: self.peek().pos,
            nodes: Vec::new(),
        };

        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Eof => return Ok((list, ListEnd::Eof(token.pos))),
                TokenKind::Text(text) => list.nodes.push(Node::Text(TextNode {
                    pos: token.pos,
                    text,
                })),
                TokenKind::LeftDelim => match self.peek_keyword() {
                    Some(Keyword::End) => {
                        self.next();
                        self.expect_right_delim("end")?;
                        return Ok((list, ListEnd::End(token.pos)));
                    }
                    Some(Keyword::Else) => {
                        self.next();
                        return Ok((list, ListEnd::Else(token.pos)));
                    }
                    _ => list.nodes.push(self.action(token.pos)?),
                },
                _ => return Err(Self::unexpected(&token, "input")),
            }
        }
    }

    fn action(&mut self, pos: Pos) -> Result<Node> {
        match self.peek_keyword() {
            Some(Keyword::If) => {
                self.next();
                Ok(Node::If(self.branch(Keyword::If, pos)?))
            }
            Some(Keyword::Range) => {
                self.next();
                self.range_depth += 1;
                let branch = self.branch(Keyword::Range, pos);
                self.range_depth -= 1;
                Ok(Node::Range(branch?))
            }
            Some(Keyword::With) => {
                self.next();
                Ok(Node::With(self.branch(Keyword::With, pos)?))
            }
            Some(Keyword::Template) => {
                self.next();
                self.template_control(pos)
            }
            Some(keyword @ (Keyword::Break | Keyword::Continue)) => {
                self.next();
                if self.range_depth == 0 {
                    return Err(CheckerError::syntax(
                        pos,
                        format!("{{{{{}}}}} outside {{{{range}}}}", keyword.as_str()),
                    ));
                }
                self.expect_right_delim(keyword.as_str())?;
                Ok(match keyword {
                    Keyword::Break => Node::Break(pos),
                    _ => Node::Continue(pos),
                })
            }
            Some(keyword) => Err(CheckerError::syntax(
                pos,
                format!("{{{{{}}}}} is not supported", keyword.as_str()),
            )),
            None => {
                let pipe = self.pipeline("command", &TokenKind::RightDelim)?;
                Ok(Node::Action(ActionNode { pos, pipe }))
            }
        }
    }

    /// `if`, `range` and `with`: pipeline, body, optional else, `{{end}}`.
    fn branch(&mut self, keyword: Keyword, pos: Pos) -> Result<BranchNode> {
        self.enter(pos, "max control structure depth exceeded")?;
        let mark = self.vars.len();
        let result = self.branch_inner(keyword, pos);
        self.vars.truncate(mark);
        self.depth -= 1;
        result
    }

    fn enter(&mut self, pos: Pos, message: &str) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CheckerError::syntax(pos, message));
        }
        self.depth += 1;
        Ok(())
    }

    fn branch_inner(&mut self, keyword: Keyword, pos: Pos) -> Result<BranchNode> {
        let context = keyword.as_str();
        let pipe = self.pipeline(context, &TokenKind::RightDelim)?;
        let (list, end) = self.item_list()?;

        let else_list = match end {
            ListEnd::End(_) => None,
            ListEnd::Eof(eof) => {
                return Err(CheckerError::syntax(
                    eof,
                    format!("unexpected EOF, missing {{{{end}}}} for {{{{{context}}}}} at {pos}"),
                ));
            }
            ListEnd::Else(else_pos) => {
                let chained = matches!(keyword, Keyword::If | Keyword::With)
                    && self.peek().kind == TokenKind::Keyword(keyword);
                if chained {
                    // `{{else if x}}` is `{{else}}{{if x}}...{{end}}` sharing one `{{end}}`.
                    self.next();
                    let nested = self.branch(keyword, else_pos)?;
                    let node = match keyword {
                        Keyword::If => Node::If(nested),
                        _ => Node::With(nested),
                    };
                    Some(ListNode {
                        pos: else_pos,
                        nodes: vec![node],
                    })
                } else {
                    self.expect_right_delim("else")?;
                    let (else_list, end) = self.item_list()?;
                    match end {
                        ListEnd::End(_) => Some(else_list),
                        ListEnd::Else(pos) => {
                            return Err(CheckerError::syntax(
                                pos,
                                format!("expected {{{{end}}}}; found {{{{else}}}} in {{{{{context}}}}}"),
                            ));
                        }
                        ListEnd::Eof(eof) => {
                            return Err(CheckerError::syntax(
                                eof,
                                format!("unexpected EOF, missing {{{{end}}}} for {{{{{context}}}}} at {pos}"),
                            ));
                        }
                    }
                }
            }
        };

        Ok(BranchNode {
            pos,
            pipe,
            list,
            else_list,
        })
    }

    fn template_control(&mut self, pos: Pos) -> Result<Node> {
        let token = self.next();
        let TokenKind::String(name) = token.kind else {
            return Err(Self::unexpected(&token, "template clause"));
        };

        let pipe = if self.peek().kind == TokenKind::RightDelim {
            self.next();
            None
        } else {
            Some(self.pipeline("template clause", &TokenKind::RightDelim)?)
        };

        Ok(Node::Template(TemplateNode { pos, name, pipe }))
    }

    /// Declarations followed by `|`-separated commands, up to and including `end`.
    fn pipeline(&mut self, context: &str, end: &TokenKind) -> Result<PipeNode> {
        let pos = self.peek().pos;
        let (decls, is_assign) = self.declarations(context)?;

        if &self.peek().kind == end {
            let token = self.next();
            return Err(CheckerError::syntax(
                token.pos,
                format!("missing value for {context}"),
            ));
        }

        let mut cmds = Vec::new();
        loop {
            cmds.push(self.command(end)?);
            let token = self.next();
            match &token.kind {
                TokenKind::Pipe => continue,
                kind if kind == end => break,
                _ => return Err(Self::unexpected(&token, context)),
            }
        }

        Ok(PipeNode {
            pos,
            is_assign,
            decls,
            cmds,
        })
    }

    fn declarations(&mut self, context: &str) -> Result<(Vec<VariableNode>, bool)> {
        let mut decls = Vec::new();
        if !matches!(self.peek().kind, TokenKind::Variable(_)) {
            return Ok((decls, false));
        }

        let follows = self.peek_nth(1).map(|t| t.kind.clone());
        let (names, op) = match follows {
            Some(TokenKind::Declare | TokenKind::Assign) => {
                let var = self.next();
                let op = self.next();
                (vec![var], op)
            }
            Some(TokenKind::Comma) => {
                let first = self.next();
                self.next();
                let second = self.next();
                if !matches!(second.kind, TokenKind::Variable(_)) {
                    return Err(Self::unexpected(&second, context));
                }
                let op = self.next();
                if !matches!(op.kind, TokenKind::Declare | TokenKind::Assign) {
                    return Err(Self::unexpected(&op, context));
                }
                if context != "range" {
                    return Err(CheckerError::syntax(
                        first.pos,
                        format!("too many declarations in {context}"),
                    ));
                }
                (vec![first, second], op)
            }
            _ => return Ok((decls, false)),
        };

        let is_assign = op.kind == TokenKind::Assign;
        for token in names {
            let TokenKind::Variable(name) = token.kind else {
                continue;
            };
            if is_assign {
                self.use_var(&name, token.pos)?;
            } else {
                self.vars.push(name.clone());
            }
            decls.push(VariableNode {
                pos: token.pos,
                idents: vec![name],
            });
        }

        Ok((decls, is_assign))
    }

    fn use_var(&self, name: &str, pos: Pos) -> Result<()> {
        if self.vars.iter().any(|v| v == name) {
            Ok(())
        } else {
            Err(CheckerError::syntax(pos, format!("undefined variable {name:?}")))
        }
    }

    fn command(&mut self, end: &TokenKind) -> Result<CommandNode> {
        let pos = self.peek().pos;
        let mut args = Vec::new();

        loop {
            match self.operand()? {
                Some(arg) => args.push(arg),
                None => {
                    let token = self.peek().clone();
                    return Err(Self::unexpected(&token, "operand"));
                }
            }

            let token = self.peek();
            if &token.kind == end || token.kind == TokenKind::Pipe {
                break;
            }
            if !token.space_before {
                let token = token.clone();
                return Err(Self::unexpected(&token, "operand"));
            }
        }

        Ok(CommandNode { pos, args })
    }

    /// A term, possibly followed by a chain of field accesses.
    fn operand(&mut self) -> Result<Option<Arg>> {
        let Some(term) = self.term()? else {
            return Ok(None);
        };

        let mut fields = Vec::new();
        while let TokenKind::Field(name) = &self.peek().kind {
            if self.peek().space_before {
                break;
            }
            fields.push(name.clone());
            self.next();
        }
        if fields.is_empty() {
            return Ok(Some(term));
        }

        let operand = match term {
            Arg::Field(mut field) => {
                field.idents.extend(fields);
                Arg::Field(field)
            }
            Arg::Variable(mut variable) => {
                variable.idents.extend(fields);
                Arg::Variable(variable)
            }
            Arg::Dot(pos) | Arg::Bool(pos, _) | Arg::Nil(pos) => {
                return Err(CheckerError::syntax(
                    pos,
                    format!("unexpected . after term {}", term.kind_name()),
                ));
            }
            Arg::String(StringNode { pos, .. }) | Arg::Number(NumberNode { pos, .. }) => {
                return Err(CheckerError::syntax(
                    pos,
                    format!("unexpected . after term {}", term.kind_name()),
                ));
            }
            term => Arg::Chain(ChainNode {
                pos: term.pos(),
                node: Box::new(term),
                fields,
            }),
        };
        Ok(Some(operand))
    }

    fn term(&mut self) -> Result<Option<Arg>> {
        let pos = self.peek().pos;
        let arg = match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                if !funcs::is_defined(&name) {
                    return Err(CheckerError::syntax(
                        pos,
                        format!("function {name:?} not defined"),
                    ));
                }
                Arg::Identifier(IdentifierNode { pos, name })
            }
            TokenKind::Dot => Arg::Dot(pos),
            TokenKind::Nil => Arg::Nil(pos),
            TokenKind::Bool(value) => Arg::Bool(pos, value),
            TokenKind::Variable(name) => {
                self.use_var(&name, pos)?;
                Arg::Variable(VariableNode {
                    pos,
                    idents: vec![name],
                })
            }
            TokenKind::Field(name) => Arg::Field(FieldNode {
                pos,
                idents: vec![name],
            }),
            TokenKind::String(text) => Arg::String(StringNode { pos, text }),
            TokenKind::Number(text) => Arg::Number(NumberNode { pos, text }),
            TokenKind::LeftParen => {
                self.enter(pos, "max expression depth exceeded")?;
                self.next();
                let pipe = self.pipeline("parenthesized pipeline", &TokenKind::RightParen);
                self.depth -= 1;
                return Ok(Some(Arg::Pipe(Box::new(pipe?))));
            }
            _ => return Ok(None),
        };
        self.next();
        Ok(Some(arg))
    }
}
