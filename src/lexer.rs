//! Lexer for `.flv` source.
//!
//! Produces a flat token stream with explicit NL/INDENT/DEDENT tokens.
//! Indentation is tracked with a stack of column widths; only spaces count.
//! While bracket depth is non-zero, newlines and indentation are ignored so
//! that calls and type argument lists may wrap freely.

use crate::diagnostics::Diagnostic;
use crate::span::Span;
use crate::token::{keyword, Token, TokenKind};
use std::sync::Arc;

pub fn lex(file: &str, src: &str) -> Result<Vec<Token>, Diagnostic> {
    let mut source = String::from(src);
    if !source.ends_with('\n') {
        source.push('\n');
    }
    Lexer::new(Arc::from(file), source).run()
}

struct Lexer {
    file: Arc<str>,
    src: String,
    i: usize,
    line: usize,
    col: usize,

    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    bracket_depth: usize,
    at_line_start: bool,
    expects_indent: bool,
    line_ends_with_colon: bool,
}

impl Lexer {
    fn new(file: Arc<str>, src: String) -> Self {
        Lexer {
            file,
            src,
            i: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            indent_stack: vec![0],
            bracket_depth: 0,
            at_line_start: true,
            expects_indent: false,
            line_ends_with_colon: false,
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.i..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.i..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.i += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn err_here(&self, msg: impl Into<String>) -> Diagnostic {
        self.err_at(msg, self.i, self.line, self.col)
    }

    fn err_at(&self, msg: impl Into<String>, start: usize, line: usize, col: usize) -> Diagnostic {
        let end = (start + 1).max(self.i);
        Diagnostic::lex(msg, Span::new(self.file.clone(), start, end, line, col))
    }

    fn emit(&mut self, kind: TokenKind, text: impl Into<String>, start: usize, line: usize, col: usize) {
        let span = Span::new(self.file.clone(), start, self.i, line, col);
        self.tokens.push(Token::new(kind, text, span));
        if !matches!(kind, TokenKind::Nl | TokenKind::Indent | TokenKind::Dedent) {
            self.line_ends_with_colon = kind == TokenKind::Colon;
        }
    }

    fn skip_line_comment(&mut self) -> Result<(), Diagnostic> {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            if ch == '\t' {
                return Err(self.err_here("Tab is not allowed"));
            }
            self.bump();
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> Result<(), Diagnostic> {
        let mut depth = 0usize;
        loop {
            if self.peek() == Some('/') && self.peek_nth(1) == Some('*') {
                depth += 1;
                self.bump();
                self.bump();
                continue;
            }
            if self.peek() == Some('*') && self.peek_nth(1) == Some('/') {
                depth -= 1;
                self.bump();
                self.bump();
                if depth == 0 {
                    return Ok(());
                }
                continue;
            }
            if self.eof() {
                return Err(self.err_here("Unterminated block comment"));
            }
            if self.peek() == Some('\t') {
                return Err(self.err_here("Tab is not allowed"));
            }
            self.bump();
        }
    }

    /// Measure indentation and adjust the indent stack at the start of a
    /// line. Blank and comment-only lines are consumed without touching the
    /// stack. Returns true when the caller should restart its loop.
    fn handle_line_start(&mut self) -> Result<bool, Diagnostic> {
        if !(self.at_line_start && self.bracket_depth == 0) {
            return Ok(false);
        }

        let start = self.i;
        let mut k = 0usize;
        while self.peek() == Some(' ') {
            self.bump();
            k += 1;
        }
        if self.peek() == Some('\t') {
            return Err(self.err_here("Tab is not allowed"));
        }

        loop {
            if self.peek() == Some('/') && self.peek_nth(1) == Some('/') {
                self.skip_line_comment()?;
                break;
            }
            if self.peek() == Some('/') && self.peek_nth(1) == Some('*') {
                self.skip_block_comment()?;
                continue;
            }
            break;
        }

        if self.peek() == Some('\n') {
            self.bump();
            self.at_line_start = true;
            return Ok(true);
        }

        if self.expects_indent {
            if k <= *self.indent_stack.last().unwrap_or(&0) {
                return Err(self.err_at("IndentationError: expected indent", start, self.line, 1));
            }
            self.indent_stack.push(k);
            let span = Span::new(self.file.clone(), start, start, self.line, 1);
            self.tokens.push(Token::new(TokenKind::Indent, "", span));
            self.expects_indent = false;
        } else {
            let top = *self.indent_stack.last().unwrap_or(&0);
            if k == top {
                // Same depth; nothing to do.
            } else if k > top {
                return Err(self.err_at("IndentationError: unexpected indent", start, self.line, 1));
            } else {
                while self
                    .indent_stack
                    .last()
                    .map(|&t| k < t)
                    .unwrap_or(false)
                {
                    self.indent_stack.pop();
                    let span = Span::new(self.file.clone(), start, start, self.line, 1);
                    self.tokens.push(Token::new(TokenKind::Dedent, "", span));
                }
                if self.indent_stack.last() != Some(&k) {
                    return Err(self.err_at("IndentationError: unaligned dedent", start, self.line, 1));
                }
            }
        }

        self.at_line_start = false;
        Ok(false)
    }

    fn run(mut self) -> Result<Vec<Token>, Diagnostic> {
        while !self.eof() {
            if self.peek() == Some('\t') {
                return Err(self.err_here("Tab is not allowed"));
            }

            if self.handle_line_start()? {
                continue;
            }

            let ch = match self.peek() {
                Some(c) => c,
                None => break,
            };

            if ch == ' ' || ch == '\r' {
                self.bump();
                continue;
            }

            if ch == '\n' {
                let (start, line, col) = (self.i, self.line, self.col);
                self.bump();
                if self.bracket_depth == 0 {
                    self.emit(TokenKind::Nl, "\n", start, line, col);
                    if self.line_ends_with_colon {
                        self.expects_indent = true;
                    }
                    self.at_line_start = true;
                }
                continue;
            }

            if ch == '/' && self.peek_nth(1) == Some('/') {
                self.skip_line_comment()?;
                continue;
            }
            if ch == '/' && self.peek_nth(1) == Some('*') {
                self.skip_block_comment()?;
                continue;
            }

            let (start, line, col) = (self.i, self.line, self.col);

            if ch == 'b' && self.peek_nth(1) == Some('"') {
                self.bump();
                self.lex_string(start, line, col, true)?;
                continue;
            }

            if ch.is_alphabetic() || ch == '_' {
                let mut ident = String::new();
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let kind = keyword(&ident).unwrap_or(TokenKind::Ident);
                self.emit(kind, ident, start, line, col);
                continue;
            }

            if ch.is_ascii_digit() {
                self.lex_number(start, line, col)?;
                continue;
            }

            if ch == '"' {
                self.lex_string(start, line, col, false)?;
                continue;
            }

            if let Some((kind, text)) = self.match_two_char() {
                self.bump();
                self.bump();
                self.emit(kind, text, start, line, col);
                continue;
            }

            let one = match ch {
                '(' => {
                    self.bracket_depth += 1;
                    Some((TokenKind::LParen, "("))
                }
                ')' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    Some((TokenKind::RParen, ")"))
                }
                '[' => {
                    self.bracket_depth += 1;
                    Some((TokenKind::LBracket, "["))
                }
                ']' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    Some((TokenKind::RBracket, "]"))
                }
                '{' => {
                    self.bracket_depth += 1;
                    Some((TokenKind::LBrace, "{"))
                }
                '}' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    Some((TokenKind::RBrace, "}"))
                }
                ',' => Some((TokenKind::Comma, ",")),
                '.' => Some((TokenKind::Dot, ".")),
                ':' => Some((TokenKind::Colon, ":")),
                '@' => Some((TokenKind::At, "@")),
                '|' => Some((TokenKind::Bar, "|")),
                '=' => Some((TokenKind::Eq, "=")),
                '+' => Some((TokenKind::Plus, "+")),
                '-' => Some((TokenKind::Minus, "-")),
                '*' => Some((TokenKind::Star, "*")),
                '/' => Some((TokenKind::Slash, "/")),
                '<' => Some((TokenKind::Lt, "<")),
                '>' => Some((TokenKind::Gt, ">")),
                '?' => Some((TokenKind::Qmark, "?")),
                _ => None,
            };
            match one {
                Some((kind, text)) => {
                    self.bump();
                    self.emit(kind, text, start, line, col);
                }
                None => {
                    return Err(self.err_at(
                        format!("Unexpected character: {:?}", ch),
                        start,
                        line,
                        col,
                    ));
                }
            }
        }

        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            let span = Span::new(self.file.clone(), self.i, self.i, self.line, self.col);
            self.tokens.push(Token::new(TokenKind::Dedent, "", span));
        }
        let span = Span::new(self.file.clone(), self.i, self.i, self.line, self.col);
        self.tokens.push(Token::new(TokenKind::Eof, "", span));
        Ok(self.tokens)
    }

    fn match_two_char(&self) -> Option<(TokenKind, &'static str)> {
        let a = self.peek()?;
        let b = self.peek_nth(1)?;
        let pair = match (a, b) {
            ('-', '>') => (TokenKind::Arrow, "->"),
            ('+', '=') => (TokenKind::PlusEq, "+="),
            ('-', '=') => (TokenKind::MinusEq, "-="),
            ('*', '=') => (TokenKind::StarEq, "*="),
            ('*', '*') => (TokenKind::StarStar, "**"),
            ('/', '=') => (TokenKind::SlashEq, "/="),
            ('=', '=') => (TokenKind::EqEq, "=="),
            ('!', '=') => (TokenKind::Neq, "!="),
            ('<', '=') => (TokenKind::Lte, "<="),
            ('>', '=') => (TokenKind::Gte, ">="),
            ('|', '>') => (TokenKind::Pipe, "|>"),
            _ => return None,
        };
        Some(pair)
    }

    /// Digits in `allowed` with `_` separators. Underscores must sit between
    /// digits, never leading, trailing or doubled.
    fn read_digits(
        &mut self,
        allowed: &str,
        start: usize,
        line: usize,
        col: usize,
    ) -> Result<String, Diagnostic> {
        let mut s = String::new();
        let mut prev_us = false;
        loop {
            match self.peek() {
                Some('_') => {
                    if s.is_empty() || prev_us {
                        return Err(self.err_at("Invalid numeric literal", start, line, col));
                    }
                    prev_us = true;
                    s.push('_');
                    self.bump();
                }
                Some(c) if allowed.contains(c) => {
                    prev_us = false;
                    s.push(c);
                    self.bump();
                }
                _ => break,
            }
        }
        if s.ends_with('_') {
            return Err(self.err_at("Invalid numeric literal", start, line, col));
        }
        Ok(s)
    }

    fn lex_number(&mut self, start: usize, line: usize, col: usize) -> Result<(), Diagnostic> {
        // Base-prefixed int: 0x / 0o / 0b. Token text carries the decimal value.
        if self.peek() == Some('0') {
            if let Some(base_ch) = self.peek_nth(1) {
                let (radix, allowed) = match base_ch {
                    'x' => (16, "0123456789abcdefABCDEF"),
                    'o' => (8, "01234567"),
                    'b' => (2, "01"),
                    _ => (0, ""),
                };
                if radix != 0 {
                    self.bump();
                    self.bump();
                    let digs = self.read_digits(allowed, start, line, col)?;
                    if digs.is_empty() {
                        return Err(self.err_at("Invalid numeric literal", start, line, col));
                    }
                    let clean: String = digs.chars().filter(|&c| c != '_').collect();
                    let val = u128::from_str_radix(&clean, radix)
                        .map_err(|_| self.err_at("Invalid numeric literal", start, line, col))?;
                    self.emit(TokenKind::Int, val.to_string(), start, line, col);
                    return Ok(());
                }
            }
        }

        let int_part = self.read_digits("0123456789", start, line, col)?;
        if self.peek() == Some('.') && self.peek_nth(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            self.bump();
            let frac_part = self.read_digits("0123456789", start, line, col)?;
            let text = format!(
                "{}.{}",
                int_part.chars().filter(|&c| c != '_').collect::<String>(),
                frac_part.chars().filter(|&c| c != '_').collect::<String>()
            );
            self.emit(TokenKind::Float, text, start, line, col);
        } else {
            let text: String = int_part.chars().filter(|&c| c != '_').collect();
            self.emit(TokenKind::Int, text, start, line, col);
        }
        Ok(())
    }

    fn lex_string(
        &mut self,
        start: usize,
        line: usize,
        col: usize,
        bytes: bool,
    ) -> Result<(), Diagnostic> {
        let literal_kind = if bytes { "bytes" } else { "string" };
        let unterminated = |lx: &Lexer| {
            Diagnostic::lex(
                format!("Unterminated {} literal", literal_kind),
                Span::new(lx.file.clone(), start, lx.i, line, col),
            )
        };

        self.bump(); // opening quote
        let mut out = String::new();

        let push = |lx: &Lexer, out: &mut String, ch: char| -> Result<(), Diagnostic> {
            if bytes && (ch as u32) > 255 {
                return Err(lx.err_at(
                    "Bytes literal supports only byte-range characters",
                    start,
                    line,
                    col,
                ));
            }
            out.push(ch);
            Ok(())
        };

        loop {
            let ch = match self.peek() {
                None => return Err(unterminated(self)),
                Some('\n') => return Err(unterminated(self)),
                Some(c) => c,
            };
            if ch == '"' {
                self.bump();
                break;
            }
            if ch == '\t' {
                return Err(self.err_here("Tab is not allowed"));
            }
            if ch == '\\' {
                self.bump();
                let esc = match self.peek() {
                    None | Some('\n') => return Err(unterminated(self)),
                    Some(c) => c,
                };
                if esc == 'x' {
                    self.bump();
                    let h1 = self.peek();
                    let h2 = self.peek_nth(1);
                    let hex_ok = |c: Option<char>| c.map(|c| c.is_ascii_hexdigit()).unwrap_or(false);
                    if !hex_ok(h1) || !hex_ok(h2) {
                        let at = self.i;
                        return Err(Diagnostic::lex(
                            format!(
                                "Invalid hex escape in {} literal: expected two hex digits after \\x",
                                literal_kind
                            ),
                            Span::new(self.file.clone(), at, at + 2, self.line, self.col),
                        ));
                    }
                    let byte = (h1.unwrap().to_digit(16).unwrap() * 16
                        + h2.unwrap().to_digit(16).unwrap()) as u8;
                    self.bump();
                    self.bump();
                    push(self, &mut out, byte as char)?;
                    continue;
                }
                let mapped = match esc {
                    '"' => Some('"'),
                    '\\' => Some('\\'),
                    'n' => Some('\n'),
                    'r' => Some('\r'),
                    't' => Some('\t'),
                    '0' => Some('\0'),
                    'a' => Some('\x07'),
                    'b' => Some('\x08'),
                    'f' => Some('\x0c'),
                    'v' => Some('\x0b'),
                    _ => None,
                };
                match mapped {
                    Some(c) => {
                        self.bump();
                        push(self, &mut out, c)?;
                    }
                    None => {
                        // Unknown escapes pass through verbatim (keeps "\d"
                        // usable in regex strings).
                        push(self, &mut out, '\\')?;
                        let c = self.bump().unwrap_or('\\');
                        push(self, &mut out, c)?;
                    }
                }
                continue;
            }
            self.bump();
            push(self, &mut out, ch)?;
        }

        let kind = if bytes { TokenKind::Bytes } else { TokenKind::Str };
        self.emit(kind, out, start, line, col);
        Ok(())
    }
}
