//! Streaming lexer for class-definition source text.
//!
//! The [`Lexer`] consumes bytes from any [`std::io::Read`] source and
//! implements [`Iterator`] over [`Token`]s, tracking byte offset, line and
//! column for every token it produces.
//!
//! # Comment syntax
//!
//! | Syntax         | Kind          | Notes                        |
//! |----------------|---------------|------------------------------|
//! | `// …`         | Line comment  | Runs to end of line          |
//! | `/* … */`      | Block comment | **Nestable** (`/* /* */ */`) |
//!
//! # Literals
//!
//! Strings use double quotes, symbols a leading `#` (`#foo`, `#at:put:`,
//! `#+`) and characters a leading `$` (`$a`).
use std::io::Read;

use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

// ═══════════════════════════════════════════════════════════════════
// Operator character set
// ═══════════════════════════════════════════════════════════════════

/// Characters that may appear in binary operators.
///
/// `|` is included so that `||` lexes as an operator; a lone `|` is the
/// temporaries delimiter. `/` only starts an operator when it does not
/// start a comment.
fn is_op_char(c: u8) -> bool {
    matches!(
        c,
        b'!' | b'@'
            | b'%'
            | b'&'
            | b'*'
            | b'-'
            | b'+'
            | b'='
            | b'~'
            | b'/'
            | b'?'
            | b'<'
            | b'>'
            | b','
            | b'|'
            | b'\\'
    )
}

// ═══════════════════════════════════════════════════════════════════
// Read buffer
// ═══════════════════════════════════════════════════════════════════

/// Lookahead window. Two maximal UTF-8 characters fit.
const LOOKAHEAD: usize = 8;

struct ReadBuf<R: Read> {
    reader: R,
    buf: [u8; LOOKAHEAD],
    /// How many valid bytes are in `buf` starting from index 0.
    filled: usize,
    reader_eof: bool,
    offset: usize,
    line: usize,
    column: usize,
}

impl<R: Read> ReadBuf<R> {
    fn new(reader: R) -> Self {
        let mut rb = Self {
            reader,
            buf: [0u8; LOOKAHEAD],
            filled: 0,
            reader_eof: false,
            offset: 0,
            line: 1,
            column: 1,
        };
        rb.fill();
        rb
    }

    fn fill(&mut self) {
        while !self.reader_eof && self.filled < LOOKAHEAD {
            let mut one = [0u8; 1];
            match self.reader.read(&mut one) {
                Ok(0) | Err(_) => self.reader_eof = true,
                Ok(_) => {
                    self.buf[self.filled] = one[0];
                    self.filled += 1;
                }
            }
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.offset, self.line, self.column)
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        (n < self.filled).then(|| self.buf[n])
    }

    fn advance(&mut self) -> Option<u8> {
        if self.filled == 0 {
            return None;
        }
        let b = self.buf[0];
        self.buf.copy_within(1..self.filled, 0);
        self.filled -= 1;
        self.fill();

        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    /// Decode the leading UTF-8 character without consuming it. Invalid
    /// sequences decode as U+FFFD with length 1.
    fn peek_char(&self) -> Option<(char, usize)> {
        if self.filled == 0 {
            return None;
        }
        let b0 = self.buf[0];
        let (len, first_bits) = match b0 {
            0x00..=0x7F => return Some((b0 as char, 1)),
            0xC0..=0xDF => (2, (b0 & 0x1F) as u32),
            0xE0..=0xEF => (3, (b0 & 0x0F) as u32),
            0xF0..=0xF7 => (4, (b0 & 0x07) as u32),
            _ => return Some(('\u{FFFD}', 1)),
        };
        if len > self.filled {
            return Some(('\u{FFFD}', 1));
        }
        let mut codepoint = first_bits;
        for &cont in &self.buf[1..len] {
            if cont & 0xC0 != 0x80 {
                return Some(('\u{FFFD}', 1));
            }
            codepoint = (codepoint << 6) | (cont & 0x3F) as u32;
        }
        Some(match char::from_u32(codepoint) {
            Some(ch) => (ch, len),
            None => ('\u{FFFD}', 1),
        })
    }

    fn advance_char(&mut self) -> Option<(char, usize)> {
        let (ch, len) = self.peek_char()?;
        for _ in 0..len {
            self.advance();
        }
        Some((ch, len))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

/// A streaming lexer over any [`Read`].
///
/// ```rust
/// use parser::{Lexer, TokenKind};
///
/// let kinds: Vec<_> = Lexer::from_str("x := 3").map(|t| t.kind).collect();
/// assert_eq!(kinds[1], TokenKind::Assign);
/// ```
pub struct Lexer<R: Read> {
    rb: ReadBuf<R>,
    emitted_eof: bool,
    /// The last non-comment token could end an operand.
    after_operand: bool,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            rb: ReadBuf::new(reader),
            emitted_eof: false,
            after_operand: false,
        }
    }
}

impl<'a> Lexer<&'a [u8]> {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    fn pos(&self) -> Pos {
        self.rb.pos()
    }

    fn peek(&self) -> Option<u8> {
        self.rb.peek_ahead(0)
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.rb.peek_ahead(n)
    }

    fn advance(&mut self) -> Option<u8> {
        self.rb.advance()
    }

    fn token_from(&self, start: Pos, kind: TokenKind, raw: impl Into<String>) -> Token {
        Token::new(kind, Span::new(start, self.pos()), raw)
    }

    fn single(&mut self, kind: TokenKind, raw: &str) -> Token {
        let start = self.pos();
        self.advance();
        self.token_from(start, kind, raw)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) = self.peek() {
            self.advance();
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Comments
    // ───────────────────────────────────────────────────────────

    fn lex_line_comment(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        self.advance();
        let mut text = String::new();
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            text.push(b as char);
            self.advance();
        }
        let raw = format!("//{}", text);
        self.token_from(start, TokenKind::LineComment(text), raw)
    }

    fn lex_block_comment(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        self.advance();
        let mut text = String::new();
        let mut depth: usize = 1;

        loop {
            match self.peek() {
                None => {
                    return self.token_from(
                        start,
                        TokenKind::Error("unterminated block comment".into()),
                        format!("/*{}", text),
                    );
                }
                Some(b'/') if self.peek_ahead(1) == Some(b'*') => {
                    depth += 1;
                    text.push_str("/*");
                    self.advance();
                    self.advance();
                }
                Some(b'*') if self.peek_ahead(1) == Some(b'/') => {
                    depth -= 1;
                    self.advance();
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    text.push_str("*/");
                }
                Some(b) => {
                    text.push(b as char);
                    self.advance();
                }
            }
        }
        let raw = format!("/*{}*/", text);
        self.token_from(start, TokenKind::BlockComment(text), raw)
    }

    // ───────────────────────────────────────────────────────────
    //  Strings, symbols, characters
    // ───────────────────────────────────────────────────────────

    /// Escapes: `\\`, `\"`, `\n`, `\t`, `\r`, `\0`.
    fn lex_string(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        let mut value = Vec::new();
        let mut raw = String::from("\"");
        loop {
            match self.advance() {
                Some(b'"') => {
                    raw.push('"');
                    break;
                }
                Some(b'\\') => {
                    raw.push('\\');
                    let escaped = match self.advance() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => b'\0',
                        Some(b) => b,
                        None => {
                            return self.token_from(
                                start,
                                TokenKind::Error("unterminated string escape".into()),
                                raw,
                            );
                        }
                    };
                    raw.push(escaped as char);
                    value.push(escaped);
                }
                Some(b) => {
                    raw.push(b as char);
                    value.push(b);
                }
                None => {
                    return self.token_from(
                        start,
                        TokenKind::Error("unterminated string".into()),
                        raw,
                    );
                }
            }
        }
        let value = String::from_utf8_lossy(&value).into_owned();
        self.token_from(start, TokenKind::String(value), raw)
    }

    /// `#name`, `#at:put:` or `#+`.
    fn lex_symbol(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        let mut name = String::new();

        if self.peek() == Some(b'(') {
            self.advance();
            return self.token_from(start, TokenKind::HashParen, "#(");
        }

        match self.rb.peek_char() {
            Some((ch, _)) if ch.is_alphabetic() || ch == '_' => {
                while let Some((ch, _)) = self.rb.peek_char() {
                    if ch.is_alphanumeric() || ch == '_' || ch == ':' {
                        self.rb.advance_char();
                        name.push(ch);
                    } else {
                        break;
                    }
                }
            }
            Some(_) if self.peek().is_some_and(is_op_char) => {
                while let Some(b) = self.peek().filter(|b| is_op_char(*b)) {
                    name.push(b as char);
                    self.advance();
                }
            }
            _ => {
                return self.token_from(
                    start,
                    TokenKind::Error("expected symbol name after `#`".into()),
                    "#",
                );
            }
        }

        let raw = format!("#{}", name);
        self.token_from(start, TokenKind::Symbol(name), raw)
    }

    fn lex_character(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        match self.rb.advance_char() {
            Some((ch, _)) => {
                self.token_from(start, TokenKind::Character(ch), format!("${}", ch))
            }
            None => self.token_from(
                start,
                TokenKind::Error("expected character after `$`".into()),
                "$",
            ),
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Numbers
    // ───────────────────────────────────────────────────────────

    fn digit_value(b: u8) -> Option<u32> {
        match b {
            b'0'..=b'9' => Some((b - b'0') as u32),
            b'a'..=b'z' => Some(10 + (b - b'a') as u32),
            b'A'..=b'Z' => Some(10 + (b - b'A') as u32),
            _ => None,
        }
    }

    fn take_digits(&mut self, raw: &mut String) {
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || b == b'_' {
                raw.push(b as char);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Integer (decimal or `<base>r<digits>`) or float. A leading `-` is
    /// consumed only when the caller saw a digit right after it.
    fn lex_number(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        let negative = self.peek() == Some(b'-');
        if negative {
            raw.push('-');
            self.advance();
        }
        self.take_digits(&mut raw);

        if matches!(self.peek(), Some(b'r' | b'R')) {
            return self.lex_radix_tail(start, raw, negative);
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_ahead(1).is_some_and(|d| d.is_ascii_digit()) {
            raw.push('.');
            self.advance();
            self.take_digits(&mut raw);
            is_float = true;
        }

        let exp_follows = match (self.peek_ahead(1), self.peek_ahead(2)) {
            (Some(d), _) if d.is_ascii_digit() => true,
            (Some(b'+' | b'-'), Some(d)) => d.is_ascii_digit(),
            _ => false,
        };
        if matches!(self.peek(), Some(b'e' | b'E')) && exp_follows {
            raw.push('e');
            self.advance();
            if let Some(sign @ (b'+' | b'-')) = self.peek() {
                raw.push(sign as char);
                self.advance();
            }
            self.take_digits(&mut raw);
            is_float = true;
        }

        let normalized: String = raw.chars().filter(|c| *c != '_').collect();
        let kind = if is_float {
            match normalized.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(e) => TokenKind::Error(format!("invalid float: {}", e)),
            }
        } else {
            match normalized.parse::<i64>() {
                Ok(v) => TokenKind::Integer(v),
                Err(e) => TokenKind::Error(format!("invalid integer: {}", e)),
            }
        };
        self.token_from(start, kind, raw)
    }

    fn lex_radix_tail(&mut self, start: Pos, mut raw: String, negative: bool) -> Token {
        let base_digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let base = match base_digits.parse::<u32>() {
            Ok(b) if (2..=36).contains(&b) => b,
            _ => {
                self.advance();
                return self.token_from(
                    start,
                    TokenKind::Error(format!("invalid number base: {}", base_digits)),
                    raw,
                );
            }
        };
        raw.push('r');
        self.advance();

        let mut value: i64 = 0;
        let mut saw_digit = false;
        while let Some(b) = self.peek() {
            if b == b'_' {
                raw.push('_');
                self.advance();
                continue;
            }
            let Some(digit) = Self::digit_value(b) else {
                break;
            };
            raw.push(b as char);
            self.advance();
            if digit >= base {
                return self.token_from(
                    start,
                    TokenKind::Error("invalid digit for radix literal".into()),
                    raw,
                );
            }
            saw_digit = true;
            value = match value
                .checked_mul(base as i64)
                .and_then(|v| v.checked_add(digit as i64))
            {
                Some(v) => v,
                None => {
                    return self.token_from(
                        start,
                        TokenKind::Error("radix literal overflow".into()),
                        raw,
                    );
                }
            };
        }

        if !saw_digit {
            return self.token_from(
                start,
                TokenKind::Error("missing digits for radix literal".into()),
                raw,
            );
        }
        let value = if negative { -value } else { value };
        self.token_from(start, TokenKind::Integer(value), raw)
    }

    // ───────────────────────────────────────────────────────────
    //  Identifiers, keywords, reserved words
    // ───────────────────────────────────────────────────────────

    fn lex_identifier_or_keyword(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        while let Some((ch, _)) = self.rb.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.rb.advance_char();
                raw.push(ch);
            } else {
                break;
            }
        }

        // `x:=` is an assignment, not the keyword `x:`.
        if self.peek() == Some(b':') && self.peek_ahead(1) != Some(b'=') {
            raw.push(':');
            self.advance();
            return self.token_from(start, TokenKind::Keyword(raw.clone()), raw);
        }

        let kind = match raw.as_str() {
            "self" => TokenKind::SelfKw,
            "super" => TokenKind::SuperKw,
            "nil" => TokenKind::NilKw,
            "true" => TokenKind::TrueKw,
            "false" => TokenKind::FalseKw,
            _ => TokenKind::Identifier(raw.clone()),
        };
        self.token_from(start, kind, raw)
    }

    /// `:=`, `:name` or a lone `:`.
    fn lex_colon(&mut self) -> Token {
        let start = self.pos();
        if self.peek_ahead(1) == Some(b'=') {
            self.advance();
            self.advance();
            return self.token_from(start, TokenKind::Assign, ":=");
        }
        self.advance();
        match self.rb.peek_char() {
            Some((ch, _)) if ch.is_alphabetic() || ch == '_' => {}
            _ => return self.token_from(start, TokenKind::Colon, ":"),
        }
        let mut name = String::new();
        while let Some((ch, _)) = self.rb.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.rb.advance_char();
                name.push(ch);
            } else {
                break;
            }
        }
        let raw = format!(":{}", name);
        self.token_from(start, TokenKind::ArgName(name), raw)
    }

    fn lex_operator(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        while let Some(b) = self.peek().filter(|b| is_op_char(*b)) {
            // Don't swallow a `/` that starts a comment.
            if b == b'/' && !raw.is_empty() && matches!(self.peek_ahead(1), Some(b'/' | b'*')) {
                break;
            }
            raw.push(b as char);
            self.advance();
        }
        self.token_from(start, TokenKind::Operator(raw.clone()), raw)
    }

    // ───────────────────────────────────────────────────────────
    //  Main dispatch
    // ───────────────────────────────────────────────────────────

    /// Produce the next token from the stream.
    pub fn next_token(&mut self) -> Token {
        let tok = self.scan_token();
        if !tok.is_comment() {
            self.after_operand = tok.kind.ends_operand();
        }
        tok
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.pos();
        let Some(b) = self.peek() else {
            self.emitted_eof = true;
            return Token::new(TokenKind::Eof, Span::point(start), "");
        };

        match b {
            b'/' if self.peek_ahead(1) == Some(b'/') => self.lex_line_comment(),
            b'/' if self.peek_ahead(1) == Some(b'*') => self.lex_block_comment(),

            b'"' => self.lex_string(),
            b'#' => self.lex_symbol(),
            b'$' => self.lex_character(),

            b'(' => self.single(TokenKind::LParen, "("),
            b')' => self.single(TokenKind::RParen, ")"),
            b'[' => self.single(TokenKind::LBracket, "["),
            b']' => self.single(TokenKind::RBracket, "]"),
            b'.' => self.single(TokenKind::Dot, "."),
            b';' => self.single(TokenKind::Semicolon, ";"),
            b'^' => self.single(TokenKind::Caret, "^"),

            b'|' if !self.peek_ahead(1).is_some_and(is_op_char) => {
                self.single(TokenKind::Pipe, "|")
            }

            b'-' if !self.after_operand
                && self.peek_ahead(1).is_some_and(|d| d.is_ascii_digit()) =>
            {
                self.lex_number()
            }
            b'0'..=b'9' => self.lex_number(),

            b':' => self.lex_colon(),

            _ if is_op_char(b) => self.lex_operator(),

            _ => match self.rb.peek_char() {
                Some((ch, _)) if ch.is_alphabetic() || ch == '_' => {
                    self.lex_identifier_or_keyword()
                }
                _ => {
                    let raw = self
                        .rb
                        .advance_char()
                        .map(|(ch, _)| ch.to_string())
                        .unwrap_or_default();
                    let message = format!("unexpected character: {:?}", raw);
                    self.token_from(start, TokenKind::Error(message), raw)
                }
            },
        }
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        let tok = self.next_token();
        if tok.is_eof() {
            self.emitted_eof = true;
        }
        Some(tok)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════
