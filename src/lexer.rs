// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::exceptions::{raise, ExcType, ExceptionValue, Raised, Result, TracebackFrame};
use crate::Rc;

use core::fmt::{self, Debug, Formatter};
use std::collections::VecDeque;

// Reject pathological inputs early.
const MAX_FILE_BYTES: usize = 1_048_576;
const MAX_LINES: usize = 100_000;
const MAX_NESTING: usize = 200;

#[derive(Clone)]
struct SourceInternal {
    file: String,
    contents: String,
    // (start, end) byte offsets of each line, excluding the newline.
    lines: Vec<(u32, u32)>,
}

/// A script file: path plus contents, shared by every span that points
/// into it.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        if contents.len() > MAX_FILE_BYTES {
            return Err(raise(
                ExcType::ValueError,
                format!("{file}: script exceeds {MAX_FILE_BYTES} bytes"),
            ));
        }
        let mut lines = vec![];
        let mut prev = 0u32;
        for (offset, c) in contents.char_indices() {
            if c == '\n' {
                lines.push((prev, offset as u32));
                prev = offset as u32 + 1;
            }
        }
        lines.push((prev, contents.len() as u32));
        if lines.len() > MAX_LINES {
            return Err(raise(
                ExcType::ValueError,
                format!("{file}: script exceeds {MAX_LINES} lines"),
            ));
        }
        Ok(Source {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn get_path(&self) -> &String {
        &self.src.file
    }

    pub fn get_contents(&self) -> &String {
        &self.src.contents
    }

    /// The trimmed text of a 1-based line, for tracebacks.
    pub fn line_text(&self, line: u32) -> &str {
        match self.src.lines.get(line.saturating_sub(1) as usize) {
            Some((start, end)) => self
                .src
                .contents
                .get(*start as usize..*end as usize)
                .unwrap_or("")
                .trim(),
            None => "",
        }
    }

    /// Build a `SyntaxError` pointing at `line`, carrying a traceback
    /// frame for this source.
    pub fn error(&self, line: u32, msg: &str) -> Raised {
        let exc = ExceptionValue::with_message(ExcType::SyntaxError, msg);
        exc.push_frame(TracebackFrame {
            script: Rc::from(self.src.file.as_str()),
            line,
            text: self.line_text(line).to_string(),
        });
        Raised(exc)
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::ptr_eq(&self.src, &other.src)
    }
}

impl Eq for Source {}

/// Location of a token or expression in a script.
#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        self.source
            .get_contents()
            .get(self.start as usize..self.end as usize)
            .unwrap_or("<invalid-span>")
    }

    pub fn error(&self, msg: &str) -> Raised {
        self.source.error(self.line, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };
        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Str,
    Bytes,
    Symbol,
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// Decoded literal payload for `Int`/`Float`/`Str`/`Bytes` tokens.
#[derive(Debug, Clone, Default)]
pub enum Literal {
    #[default]
    None,
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub literal: Literal,
}

/// An indentation-aware lexer for the script subset.
///
/// Emits `Newline` at logical line ends, `Indent`/`Dedent` pairs as block
/// structure changes, and suppresses both inside bracketed expressions.
pub struct Lexer<'source> {
    source: Source,
    s: &'source str,
    pos: usize,
    line: u32,
    col: u32,
    indents: Vec<u32>,
    pending: VecDeque<Token>,
    paren_depth: usize,
    at_line_start: bool,
    emitted_eof_newline: bool,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            s: source.get_contents(),
            pos: 0,
            line: 1,
            col: 1,
            indents: vec![0],
            pending: VecDeque::new(),
            paren_depth: 0,
            at_line_start: true,
            emitted_eof_newline: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.s[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.s[self.pos..].chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn span_from(&self, start: usize, line: u32, col: u32) -> Span {
        Span {
            source: self.source.clone(),
            line,
            col,
            start: start as u32,
            end: self.pos as u32,
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: u32, col: u32) -> Token {
        Token {
            kind,
            span: self.span_from(start, line, col),
            literal: Literal::None,
        }
    }

    fn marker(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span {
                source: self.source.clone(),
                line: self.line,
                col: self.col,
                start: self.pos as u32,
                end: self.pos as u32,
            },
            literal: Literal::None,
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            if let Some(tok) = self.pending.pop_front() {
                return Ok(tok);
            }

            if self.at_line_start && self.paren_depth == 0 {
                self.handle_indentation()?;
                continue;
            }

            // Skip intra-line whitespace and comments.
            loop {
                match self.peek() {
                    Some(' ') | Some('\t') | Some('\r') => {
                        self.advance();
                    }
                    Some('#') => {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('\\') if self.peek_at(1) == Some('\n') => {
                        self.advance();
                        self.advance();
                    }
                    _ => break,
                }
            }

            match self.peek() {
                None => {
                    if !self.emitted_eof_newline {
                        self.emitted_eof_newline = true;
                        return Ok(self.marker(TokenKind::Newline));
                    }
                    while self.indents.len() > 1 {
                        self.indents.pop();
                        self.pending.push_back(self.marker(TokenKind::Dedent));
                    }
                    self.pending.push_back(self.marker(TokenKind::Eof));
                    continue;
                }
                Some('\n') => {
                    self.advance();
                    if self.paren_depth == 0 {
                        self.at_line_start = true;
                        return Ok(self.marker(TokenKind::Newline));
                    }
                    continue;
                }
                Some(c) => return self.lex_token(c),
            }
        }
    }

    fn handle_indentation(&mut self) -> Result<()> {
        let mut indent = 0u32;
        loop {
            match self.peek() {
                Some(' ') => {
                    indent += 1;
                    self.advance();
                }
                Some('\t') => {
                    indent = (indent / 8 + 1) * 8;
                    self.advance();
                }
                Some('\r') => {
                    self.advance();
                }
                _ => break,
            }
        }
        match self.peek() {
            // Blank or comment-only lines do not affect indentation.
            Some('\n') => {
                self.advance();
                return Ok(());
            }
            Some('#') => {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                return Ok(());
            }
            None => {
                self.at_line_start = false;
                return Ok(());
            }
            _ => {}
        }
        self.at_line_start = false;
        let current = *self.indents.last().unwrap_or(&0);
        if indent > current {
            self.indents.push(indent);
            if self.indents.len() > MAX_NESTING {
                return Err(self.source.error(self.line, "too many levels of indentation"));
            }
            self.pending.push_back(self.marker(TokenKind::Indent));
        } else if indent < current {
            while let Some(&top) = self.indents.last() {
                if top <= indent {
                    break;
                }
                self.indents.pop();
                self.pending.push_back(self.marker(TokenKind::Dedent));
            }
            if self.indents.last() != Some(&indent) {
                return Err(self.source.error(
                    self.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(())
    }

    fn lex_token(&mut self, c: char) -> Result<Token> {
        let (start, line, col) = (self.pos, self.line, self.col);
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.lex_number(start, line, col);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            // String prefixes: b'', r'', rb'', br''.
            let mut prefix_len = 0usize;
            let mut is_bytes = false;
            let mut is_raw = false;
            loop {
                match self.peek_at(prefix_len) {
                    Some('b') | Some('B') if !is_bytes => {
                        is_bytes = true;
                        prefix_len += 1;
                    }
                    Some('r') | Some('R') if !is_raw => {
                        is_raw = true;
                        prefix_len += 1;
                    }
                    Some('\'') | Some('"') if prefix_len > 0 => {
                        for _ in 0..prefix_len {
                            self.advance();
                        }
                        return self.lex_string(start, line, col, is_bytes, is_raw);
                    }
                    _ => break,
                }
            }
            return Ok(self.lex_ident(start, line, col));
        }
        if c == '\'' || c == '"' {
            return self.lex_string(start, line, col, false, false);
        }
        self.lex_symbol(c, start, line, col)
    }

    fn lex_ident(&mut self, start: usize, line: u32, col: u32) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.token(TokenKind::Ident, start, line, col)
    }

    fn lex_number(&mut self, start: usize, line: u32, col: u32) -> Result<Token> {
        let radix = if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('x') | Some('X') => 16,
                Some('o') | Some('O') => 8,
                Some('b') | Some('B') => 2,
                _ => 10,
            }
        } else {
            10
        };
        if radix != 10 {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c == '_' {
                    self.advance();
                } else if c.is_digit(radix) {
                    digits.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let span = self.span_from(start, line, col);
            if digits.is_empty() {
                return Err(span.error("invalid number literal"));
            }
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| span.error("integer literal too large"))?;
            return Ok(Token {
                kind: TokenKind::Int,
                span,
                literal: Literal::Int(value),
            });
        }

        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {
                    text.push(c);
                    self.advance();
                }
                '_' => {
                    self.advance();
                }
                '.' if !is_float && !text.contains('e') && !text.contains('E') => {
                    is_float = true;
                    text.push(c);
                    self.advance();
                }
                'e' | 'E' if !text.contains('e') && !text.contains('E') => {
                    is_float = true;
                    text.push(c);
                    self.advance();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.advance();
                    }
                }
                _ => break,
            }
        }
        let span = self.span_from(start, line, col);
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| span.error("invalid float literal"))?;
            Ok(Token {
                kind: TokenKind::Float,
                span,
                literal: Literal::Float(value),
            })
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| span.error("integer literal too large"))?;
            Ok(Token {
                kind: TokenKind::Int,
                span,
                literal: Literal::Int(value),
            })
        }
    }

    fn lex_string(
        &mut self,
        start: usize,
        line: u32,
        col: u32,
        is_bytes: bool,
        is_raw: bool,
    ) -> Result<Token> {
        let quote = self.advance().expect("quote present");
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        let mut out = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    return Err(self
                        .source
                        .error(line, "unterminated string literal"));
                }
            };
            if c == quote {
                if triple {
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.advance();
                        self.advance();
                        self.advance();
                        break;
                    }
                    out.push(c);
                    self.advance();
                    continue;
                }
                self.advance();
                break;
            }
            if c == '\n' && !triple {
                return Err(self.source.error(line, "unterminated string literal"));
            }
            if c == '\\' && !is_raw {
                self.advance();
                let esc = match self.peek() {
                    Some(e) => e,
                    None => {
                        return Err(self.source.error(line, "unterminated string literal"));
                    }
                };
                self.advance();
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    '\n' => {} // line continuation inside string
                    'x' => {
                        let hi = self.advance();
                        let lo = self.advance();
                        let (hi, lo) = match (hi, lo) {
                            (Some(h), Some(l)) => (h, l),
                            _ => return Err(self.source.error(line, "truncated \\x escape")),
                        };
                        let byte = u32::from_str_radix(&format!("{hi}{lo}"), 16)
                            .map_err(|_| self.source.error(line, "invalid \\x escape"))?;
                        match char::from_u32(byte) {
                            Some(c) => out.push(c),
                            None => return Err(self.source.error(line, "invalid \\x escape")),
                        }
                    }
                    'u' => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            match self.advance() {
                                Some(c) => code.push(c),
                                None => {
                                    return Err(self.source.error(line, "truncated \\u escape"))
                                }
                            }
                        }
                        let cp = u32::from_str_radix(&code, 16)
                            .map_err(|_| self.source.error(line, "invalid \\u escape"))?;
                        match char::from_u32(cp) {
                            Some(c) => out.push(c),
                            None => return Err(self.source.error(line, "invalid \\u escape")),
                        }
                    }
                    other => {
                        // Unknown escapes keep the backslash.
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
            self.advance();
        }
        let span = self.span_from(start, line, col);
        if is_bytes {
            if let Some(bad) = out.chars().find(|c| (*c as u32) > 0xff) {
                return Err(span.error(&format!(
                    "bytes can only contain ASCII literal characters, found {bad:?}"
                )));
            }
            let bytes: Vec<u8> = out.chars().map(|c| c as u8).collect();
            Ok(Token {
                kind: TokenKind::Bytes,
                span,
                literal: Literal::Bytes(bytes.into()),
            })
        } else {
            Ok(Token {
                kind: TokenKind::Str,
                span,
                literal: Literal::Str(Rc::from(out.as_str())),
            })
        }
    }

    fn lex_symbol(&mut self, c: char, start: usize, line: u32, col: u32) -> Result<Token> {
        self.advance();
        match c {
            '(' | '[' | '{' => self.paren_depth += 1,
            ')' | ']' | '}' => self.paren_depth = self.paren_depth.saturating_sub(1),
            _ => {}
        }
        let two = |l: &Self, second: char| l.peek() == Some(second);
        match c {
            '*' if two(self, '*') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
            }
            '/' if two(self, '/') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
            }
            '<' if two(self, '<') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
            }
            '>' if two(self, '>') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
            }
            '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '@' | ':' | '=' | '<' | '>' | '!'
                if two(self, '=') =>
            {
                self.advance();
            }
            '-' if two(self, '>') => {
                self.advance();
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' | ';' | '~' | '+' | '-' | '*' | '/'
            | '%' | '&' | '|' | '^' | '<' | '>' | '=' | ':' | '@' => {}
            '!' => {
                return Err(self
                    .span_from(start, line, col)
                    .error("invalid syntax"));
            }
            other => {
                return Err(self
                    .span_from(start, line, col)
                    .error(&format!("unexpected character {other:?}")));
            }
        }
        Ok(self.token(TokenKind::Symbol, start, line, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(code: &str) -> Vec<(TokenKind, String)> {
        let source = Source::from_contents("test.py".to_string(), code.to_string()).unwrap();
        let mut lexer = Lexer::new(&source);
        let mut out = vec![];
        loop {
            let tok = lexer.next_token().unwrap();
            let done = tok.kind == TokenKind::Eof;
            out.push((tok.kind, tok.span.text().to_string()));
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn tokens_and_newlines() {
        let toks = lex_all("x = 1 + 2\n");
        let kinds: Vec<TokenKind> = toks.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Symbol,
                TokenKind::Int,
                TokenKind::Symbol,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn indent_dedent() {
        let toks = lex_all("if x:\n    y = 1\nz = 2\n");
        let kinds: Vec<TokenKind> = toks.iter().map(|(k, _)| *k).collect();
        assert!(kinds.contains(&TokenKind::Indent));
        assert!(kinds.contains(&TokenKind::Dedent));
        let indent_pos = kinds.iter().position(|k| *k == TokenKind::Indent).unwrap();
        let dedent_pos = kinds.iter().position(|k| *k == TokenKind::Dedent).unwrap();
        assert!(indent_pos < dedent_pos);
    }

    #[test]
    fn brackets_suppress_newline() {
        let toks = lex_all("x = [1,\n 2]\n");
        let kinds: Vec<TokenKind> = toks.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
        assert!(!kinds.contains(&TokenKind::Indent));
    }

    #[test]
    fn string_escapes() {
        let source =
            Source::from_contents("t.py".to_string(), r#"'a\nb'"#.to_string()).unwrap();
        let mut lexer = Lexer::new(&source);
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Str);
        match tok.literal {
            Literal::Str(s) => assert_eq!(&*s, "a\nb"),
            other => panic!("unexpected literal {other:?}"),
        }
    }

    #[test]
    fn triple_quoted_string() {
        let source =
            Source::from_contents("t.py".to_string(), "\"\"\"a\nb\"\"\"\n".to_string()).unwrap();
        let mut lexer = Lexer::new(&source);
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Str);
        match tok.literal {
            Literal::Str(s) => assert_eq!(&*s, "a\nb"),
            other => panic!("unexpected literal {other:?}"),
        }
    }

    #[test]
    fn bytes_literal() {
        let source = Source::from_contents("t.py".to_string(), "b'ab'".to_string()).unwrap();
        let mut lexer = Lexer::new(&source);
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Bytes);
        match tok.literal {
            Literal::Bytes(b) => assert_eq!(&*b, b"ab"),
            other => panic!("unexpected literal {other:?}"),
        }
    }

    #[test]
    fn number_forms() {
        let source = Source::from_contents(
            "t.py".to_string(),
            "10 0x1f 0b101 1_000 2.5 1e3".to_string(),
        )
        .unwrap();
        let mut lexer = Lexer::new(&source);
        let mut literals = vec![];
        loop {
            let tok = lexer.next_token().unwrap();
            if tok.kind == TokenKind::Eof {
                break;
            }
            if !matches!(tok.literal, Literal::None) {
                literals.push(tok.literal);
            }
        }
        assert!(matches!(literals[0], Literal::Int(10)));
        assert!(matches!(literals[1], Literal::Int(31)));
        assert!(matches!(literals[2], Literal::Int(5)));
        assert!(matches!(literals[3], Literal::Int(1000)));
        assert!(matches!(literals[4], Literal::Float(f) if f == 2.5));
        assert!(matches!(literals[5], Literal::Float(f) if f == 1000.0));
    }

    #[test]
    fn bad_dedent_is_syntax_error() {
        let source = Source::from_contents(
            "t.py".to_string(),
            "if x:\n        y = 1\n    z = 2\n".to_string(),
        )
        .unwrap();
        let mut lexer = Lexer::new(&source);
        let mut result = Ok(());
        loop {
            match lexer.next_token() {
                Ok(tok) if tok.kind == TokenKind::Eof => break,
                Ok(_) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        let err = result.unwrap_err();
        let exc = &err;
        assert_eq!(exc.class(), ExcType::SyntaxError);
    }
}
