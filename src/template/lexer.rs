//! Lexer for `{{ }}`-delimited templates.
//!
//! Produces a flat token stream: text between actions, and the tokens inside
//! each action bracketed by [`TokenKind::LeftDelim`] / [`TokenKind::RightDelim`].
//! Trim markers (`{{- ` and ` -}}`) are applied here, and comments are dropped.

use crate::error::{CheckerError, Result};

use super::ast::Pos;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

/// Keywords recognised at the start of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    End,
    Range,
    With,
    Define,
    Template,
    Block,
    Break,
    Continue,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "if" => Self::If,
            "else" => Self::Else,
            "end" => Self::End,
            "range" => Self::Range,
            "with" => Self::With,
            "define" => Self::Define,
            "template" => Self::Template,
            "block" => Self::Block,
            "break" => Self::Break,
            "continue" => Self::Continue,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Else => "else",
            Self::End => "end",
            Self::Range => "range",
            Self::With => "with",
            Self::Define => "define",
            Self::Template => "template",
            Self::Block => "block",
            Self::Break => "break",
            Self::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Plain text outside of actions.
    Text(String),
    LeftDelim,
    RightDelim,
    Keyword(Keyword),
    /// Bare identifier, always a function name.
    Identifier(String),
    /// `.Name`, stored without the leading dot.
    Field(String),
    /// `$` or `$name`, stored with the dollar sign.
    Variable(String),
    Dot,
    /// Quoted or raw string, stored unquoted.
    String(String),
    /// Numeric or character constant, stored as written.
    Number(String),
    Bool(bool),
    Nil,
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Text(_) => "text".to_string(),
            Self::LeftDelim => format!("\"{LEFT_DELIM}\""),
            Self::RightDelim => format!("\"{RIGHT_DELIM}\""),
            Self::Keyword(k) => format!("<{}>", k.as_str()),
            Self::Identifier(name) => format!("identifier {name:?}"),
            Self::Field(name) => format!("field .{name}"),
            Self::Variable(name) => format!("variable {name}"),
            Self::Dot => "<.>".to_string(),
            Self::String(s) => format!("string {s:?}"),
            Self::Number(n) => format!("number {n}"),
            Self::Bool(b) => format!("<{b}>"),
            Self::Nil => "<nil>".to_string(),
            Self::Pipe => "\"|\"".to_string(),
            Self::LeftParen => "\"(\"".to_string(),
            Self::RightParen => "\")\"".to_string(),
            Self::Declare => "\":=\"".to_string(),
            Self::Assign => "\"=\"".to_string(),
            Self::Comma => "\",\"".to_string(),
            Self::Eof => "EOF".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    /// Whitespace separated this token from the previous one inside an action.
    pub space_before: bool,
}

/// Character cursor tracking line and column.
struct Cursor<'src> {
    rest: &'src str,
    line: u32,
    column: u32,
}

impl<'src> Cursor<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            rest: source,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn is_eof(&self) -> bool {
        self.rest.is_empty()
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest.chars().nth(n)
    }

    fn check_str(&self, s: &str) -> bool {
        self.rest.starts_with(s)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.rest = &self.rest[ch.len_utf8()..];
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn advance_str(&mut self, s: &str) {
        for _ in s.chars() {
            self.advance();
        }
    }

    /// Consume characters while the predicate holds, returning the consumed slice.
    fn eat_while(&mut self, f: impl Fn(char) -> bool) -> &'src str {
        let start = self.rest;
        let mut len = 0;
        while let Some(ch) = self.peek() {
            if !f(ch) {
                break;
            }
            len += ch.len_utf8();
            self.advance();
        }
        &start[..len]
    }
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

fn is_alphanumeric(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// Tokenize a template source.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer<'src> {
    cursor: Cursor<'src>,
    tokens: Vec<Token>,
    /// The previous action ended with ` -}}`.
    trim_next_text: bool,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
            tokens: Vec::new(),
            trim_next_text: false,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while !self.cursor.is_eof() {
            self.lex_text();
            if self.cursor.check_str(LEFT_DELIM) {
                self.lex_action()?;
            }
        }

        let pos = self.cursor.pos();
        self.push(TokenKind::Eof, pos, false);
        Ok(self.tokens)
    }

    fn push(&mut self, kind: TokenKind, pos: Pos, space_before: bool) {
        self.tokens.push(Token {
            kind,
            pos,
            space_before,
        });
    }

    fn lex_text(&mut self) {
        let pos = self.cursor.pos();
        let mut text = String::new();
        while !self.cursor.is_eof() && !self.cursor.check_str(LEFT_DELIM) {
            if let Some(ch) = self.cursor.advance() {
                text.push(ch);
            }
        }

        if std::mem::take(&mut self.trim_next_text) {
            text = text.trim_start_matches(is_space).to_string();
        }

        if self.starts_with_left_trim() {
            text.truncate(text.trim_end_matches(is_space).len());
        }

        if !text.is_empty() {
            self.push(TokenKind::Text(text), pos, false);
        }
    }

    /// `{{-` followed by whitespace.
    fn starts_with_left_trim(&self) -> bool {
        self.cursor.check_str(LEFT_DELIM)
            && self.cursor.peek_nth(2) == Some('-')
            && self.cursor.peek_nth(3).is_some_and(is_space)
    }

    fn lex_action(&mut self) -> Result<()> {
        let open = self.cursor.pos();
        let trimmed = self.starts_with_left_trim();
        self.cursor.advance_str(LEFT_DELIM);
        if trimmed {
            self.cursor.advance();
        }

        let skipped = self.cursor.eat_while(is_space);
        if self.cursor.check_str(LEFT_COMMENT) {
            return self.lex_comment(open);
        }

        self.push(TokenKind::LeftDelim, open, false);
        let mut space_before = !skipped.is_empty();

        loop {
            let pos = self.cursor.pos();
            let Some(ch) = self.cursor.peek() else {
                return Err(CheckerError::syntax(open, "unclosed action"));
            };

            if is_space(ch) {
                self.cursor.eat_while(is_space);
                space_before = true;
                continue;
            }

            if space_before && self.cursor.check_str("-}}") {
                self.cursor.advance();
                self.cursor.advance_str(RIGHT_DELIM);
                self.trim_next_text = true;
                self.push(TokenKind::RightDelim, pos, true);
                return Ok(());
            }

            if self.cursor.check_str(RIGHT_DELIM) {
                self.cursor.advance_str(RIGHT_DELIM);
                self.push(TokenKind::RightDelim, pos, space_before);
                return Ok(());
            }

            let kind = self.lex_action_token(ch, pos)?;
            self.push(kind, pos, space_before);
            space_before = false;
        }
    }

    fn lex_comment(&mut self, open: Pos) -> Result<()> {
        self.cursor.advance_str(LEFT_COMMENT);
        loop {
            if self.cursor.is_eof() {
                return Err(CheckerError::syntax(open, "unclosed comment"));
            }
            if self.cursor.check_str(RIGHT_COMMENT) {
                self.cursor.advance_str(RIGHT_COMMENT);
                break;
            }
            self.cursor.advance();
        }

        let skipped = self.cursor.eat_while(is_space);
        if !skipped.is_empty() && self.cursor.check_str("-}}") {
            self.cursor.advance();
            self.trim_next_text = true;
        }
        if !self.cursor.check_str(RIGHT_DELIM) {
            return Err(CheckerError::syntax(
                open,
                "comment ends before closing delimiter",
            ));
        }
        self.cursor.advance_str(RIGHT_DELIM);
        Ok(())
    }

    fn lex_action_token(&mut self, ch: char, pos: Pos) -> Result<TokenKind> {
        let kind = match ch {
            '|' => {
                self.cursor.advance();
                TokenKind::Pipe
            }
            '(' => {
                self.cursor.advance();
                TokenKind::LeftParen
            }
            ')' => {
                self.cursor.advance();
                TokenKind::RightParen
            }
            ',' => {
                self.cursor.advance();
                TokenKind::Comma
            }
            '=' => {
                self.cursor.advance();
                TokenKind::Assign
            }
            ':' => {
                self.cursor.advance();
                if self.cursor.peek() != Some('=') {
                    return Err(CheckerError::syntax(pos, "expected :="));
                }
                self.cursor.advance();
                TokenKind::Declare
            }
            '"' => TokenKind::String(self.lex_quote(pos)?),
            '`' => TokenKind::String(self.lex_raw_quote(pos)?),
            '\'' => TokenKind::Number(self.lex_char(pos)?),
            '$' => {
                self.cursor.advance();
                let name = self.cursor.eat_while(is_alphanumeric);
                TokenKind::Variable(format!("${name}"))
            }
            '.' => {
                if self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                    TokenKind::Number(self.lex_number(pos)?)
                } else if self.cursor.peek_nth(1).is_some_and(is_alphanumeric) {
                    self.cursor.advance();
                    let name = self.cursor.eat_while(is_alphanumeric);
                    TokenKind::Field(name.to_string())
                } else {
                    self.cursor.advance();
                    TokenKind::Dot
                }
            }
            '+' | '-' | '0'..='9' => TokenKind::Number(self.lex_number(pos)?),
            c if c == '_' || c.is_alphabetic() => {
                let word = self.cursor.eat_while(is_alphanumeric);
                match word {
                    "true" => TokenKind::Bool(true),
                    "false" => TokenKind::Bool(false),
                    "nil" => TokenKind::Nil,
                    _ => match Keyword::from_ident(word) {
                        Some(keyword) => TokenKind::Keyword(keyword),
                        None => TokenKind::Identifier(word.to_string()),
                    },
                }
            }
            other => {
                return Err(CheckerError::syntax(
                    pos,
                    format!("unrecognized character in action: {other:?}"),
                ));
            }
        };
        Ok(kind)
    }

    fn lex_quote(&mut self, pos: Pos) -> Result<String> {
        self.cursor.advance();
        let mut value = String::new();
        loop {
            match self.cursor.advance() {
                None | Some('\n') => {
                    return Err(CheckerError::syntax(pos, "unterminated quoted string"));
                }
                Some('"') => return Ok(value),
                Some('\\') => value.push(self.lex_escape(pos)?),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn lex_escape(&mut self, pos: Pos) -> Result<char> {
        let escaped = match self.cursor.advance() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('a') => '\u{7}',
            Some('b') => '\u{8}',
            Some('f') => '\u{c}',
            Some('v') => '\u{b}',
            Some('0') => '\0',
            Some(c @ ('\\' | '"' | '\'')) => c,
            Some('x') => self.lex_hex_escape(pos, 2)?,
            Some('u') => self.lex_hex_escape(pos, 4)?,
            Some('U') => self.lex_hex_escape(pos, 8)?,
            _ => return Err(CheckerError::syntax(pos, "invalid escape in quoted string")),
        };
        Ok(escaped)
    }

    fn lex_hex_escape(&mut self, pos: Pos, digits: usize) -> Result<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .cursor
                .advance()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| CheckerError::syntax(pos, "invalid hex escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| CheckerError::syntax(pos, "invalid unicode escape"))
    }

    fn lex_raw_quote(&mut self, pos: Pos) -> Result<String> {
        self.cursor.advance();
        let value = self.cursor.eat_while(|c| c != '`').to_string();
        if self.cursor.advance() != Some('`') {
            return Err(CheckerError::syntax(pos, "unterminated raw quoted string"));
        }
        Ok(value)
    }

    fn lex_char(&mut self, pos: Pos) -> Result<String> {
        let mut text = String::from('\'');
        self.cursor.advance();
        loop {
            match self.cursor.advance() {
                None | Some('\n') => {
                    return Err(CheckerError::syntax(pos, "unterminated character constant"));
                }
                Some('\\') => {
                    text.push('\\');
                    if let Some(ch) = self.cursor.advance() {
                        text.push(ch);
                    }
                }
                Some('\'') => {
                    text.push('\'');
                    return Ok(text);
                }
                Some(ch) => text.push(ch),
            }
        }
    }

    fn lex_number(&mut self, pos: Pos) -> Result<String> {
        let mut text = String::new();
        if let Some(sign @ ('+' | '-')) = self.cursor.peek() {
            self.cursor.advance();
            text.push(sign);
        }

        let radix_prefix = self.cursor.peek() == Some('0')
            && matches!(
                self.cursor.peek_nth(1),
                Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')
            );

        if radix_prefix {
            text.push_str(self.cursor.eat_while(|c| c == '0'));
            if let Some(prefix) = self.cursor.advance() {
                text.push(prefix);
            }
            text.push_str(self.cursor.eat_while(|c| c == '_' || c.is_ascii_hexdigit()));
        } else {
            text.push_str(self.cursor.eat_while(|c| c == '_' || c.is_ascii_digit()));
            if self.cursor.peek() == Some('.') {
                self.cursor.advance();
                text.push('.');
                text.push_str(self.cursor.eat_while(|c| c == '_' || c.is_ascii_digit()));
            }
            if let Some(e @ ('e' | 'E')) = self.cursor.peek() {
                self.cursor.advance();
                text.push(e);
                if let Some(sign @ ('+' | '-')) = self.cursor.peek() {
                    self.cursor.advance();
                    text.push(sign);
                }
                text.push_str(self.cursor.eat_while(|c| c.is_ascii_digit()));
            }
        }

        if self.cursor.peek() == Some('i') {
            self.cursor.advance();
            text.push('i');
        }

        let digits = text.trim_start_matches(['+', '-']);
        let malformed = !digits.chars().any(|c| c.is_ascii_digit())
            || self.cursor.peek().is_some_and(is_alphanumeric);
        if malformed {
            let tail = self.cursor.eat_while(is_alphanumeric);
            return Err(CheckerError::syntax(
                pos,
                format!("bad number syntax: {text}{tail}"),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_text_and_field() {
        assert_eq!(
            kinds("Hello {{.Name}}!"),
            vec![
                TokenKind::Text("Hello ".to_string()),
                TokenKind::LeftDelim,
                TokenKind::Field("Name".to_string()),
                TokenKind::RightDelim,
                TokenKind::Text("!".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_field_chain_has_no_space() {
        let tokens = lex("{{.A.B .C}}").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Field("A".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::Field("B".to_string()));
        assert!(!tokens[2].space_before);
        assert_eq!(tokens[3].kind, TokenKind::Field("C".to_string()));
        assert!(tokens[3].space_before);
    }

    #[test]
    fn test_keywords_and_literals() {
        assert_eq!(
            kinds(r#"{{if eq .X "a\tb" 3 -1.5 true nil}}"#),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Keyword(Keyword::If),
                TokenKind::Identifier("eq".to_string()),
                TokenKind::Field("X".to_string()),
                TokenKind::String("a\tb".to_string()),
                TokenKind::Number("3".to_string()),
                TokenKind::Number("-1.5".to_string()),
                TokenKind::Bool(true),
                TokenKind::Nil,
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_declarations() {
        assert_eq!(
            kinds("{{range $i, $e := .Items}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Keyword(Keyword::Range),
                TokenKind::Variable("$i".to_string()),
                TokenKind::Comma,
                TokenKind::Variable("$e".to_string()),
                TokenKind::Declare,
                TokenKind::Field("Items".to_string()),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            kinds("a  {{- .X -}}\n  b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::LeftDelim,
                TokenKind::Field("X".to_string()),
                TokenKind::RightDelim,
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_negative_number_is_not_trim() {
        assert_eq!(
            kinds("{{-3}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Number("-3".to_string()),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(
            kinds("a{{/* note */}}b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = lex("line\n  {{.X}}").unwrap();
        assert_eq!(tokens[1].pos, Pos::new(2, 3));
        assert_eq!(tokens[2].pos, Pos::new(2, 5));
    }

    #[test]
    fn test_unclosed_action() {
        let err = lex("{{.X").unwrap_err();
        assert!(matches!(err, CheckerError::TemplateSyntax { line: 1, column: 1, .. }));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(lex(r#"{{printf "abc}}"#).is_err());
    }

    #[test]
    fn test_bad_number() {
        assert!(lex("{{3abc}}").is_err());
        assert!(lex("{{0x1F}}").is_ok());
    }

    #[test]
    fn test_unrecognized_character() {
        let err = lex("{{.X # y}}").unwrap_err();
        assert!(err.to_string().contains("unrecognized character"));
    }
}
