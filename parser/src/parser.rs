use crate::ast::{
    AstArena, ClassDecl, CompilationUnit, ExprId, ExprKind, ExprNode, MethodDecl, VarDecl,
};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// Recursive-descent parser over a token stream.
///
/// Iterating a `Parser` yields one [`ClassDecl`] at a time; the method
/// bodies of every class parsed so far live in [`Parser::arena`].
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: std::iter::Peekable<I>,
    arena: AstArena,
    last_span: Span,
    at_eof: bool,
    op_precedence: HashMap<String, u8>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        let mut op_precedence = HashMap::new();
        for op in ["*", "/", "\\\\"] {
            op_precedence.insert(op.to_string(), 2);
        }
        Self {
            tokens: tokens.peekable(),
            arena: AstArena::default(),
            last_span: Span::point(Pos::origin()),
            at_eof: false,
            op_precedence,
        }
    }

    pub fn arena(&self) -> &AstArena {
        &self.arena
    }

    pub fn into_arena(self) -> AstArena {
        self.arena
    }

    /// Parse every class declaration up to end of input.
    pub fn parse_compilation_unit(mut self) -> Result<CompilationUnit, ParseError> {
        let mut classes = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Eof) {
            classes.push(self.parse_class()?);
        }
        Ok(CompilationUnit {
            arena: self.arena,
            classes,
        })
    }

    fn alloc_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.arena.alloc(ExprNode { kind, span })
    }

    fn span_of(&self, id: ExprId) -> Span {
        self.arena.span(id)
    }

    fn peek_kind(&mut self) -> &TokenKind {
        self.skip_comments();
        match self.tokens.peek() {
            Some(tok) => &tok.kind,
            None => &TokenKind::Eof,
        }
    }

    fn peek_span(&mut self) -> Span {
        self.skip_comments();
        match self.tokens.peek() {
            Some(tok) => tok.span,
            None => self.last_span,
        }
    }

    fn skip_comments(&mut self) {
        while let Some(tok) = self.tokens.next_if(|tok| tok.kind.is_comment()) {
            self.last_span = tok.span;
        }
    }

    fn advance(&mut self) -> Token {
        self.skip_comments();
        match self.tokens.next() {
            Some(tok) => {
                self.last_span = tok.span;
                if matches!(tok.kind, TokenKind::Eof) {
                    self.at_eof = true;
                }
                tok
            }
            None => {
                self.at_eof = true;
                Token::new(TokenKind::Eof, self.last_span, "")
            }
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, ParseError> {
        let tok = self.advance();
        if std::mem::discriminant(&tok.kind) == std::mem::discriminant(expected) {
            Ok(tok)
        } else {
            Err(unexpected(&tok, expected.name()))
        }
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn expect_identifier(&mut self, what: &str) -> Result<VarDecl, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Identifier(name) => Ok(VarDecl::new(name, tok.span)),
            _ => Err(unexpected(&tok, what)),
        }
    }

    // ── Declarations ────────────────────────────────────────────────

    /// `Name : Super [ | ivars | class | cvars | methods ]`
    pub fn parse_class(&mut self) -> Result<ClassDecl, ParseError> {
        let head = self.advance();
        let (name, start) = match head.kind {
            TokenKind::Identifier(name) => {
                self.expect(&TokenKind::Colon)?;
                (name, head.span)
            }
            // `Name: Super` lexes the name as a keyword part.
            TokenKind::Keyword(kw) => (kw.trim_end_matches(':').to_string(), head.span),
            _ => return Err(unexpected(&head, "class name")),
        };

        let super_tok = self.advance();
        let super_name = match super_tok.kind {
            TokenKind::Identifier(name) => Some(name),
            TokenKind::NilKw => None,
            _ => return Err(unexpected(&super_tok, "superclass name or `nil`")),
        };

        self.expect(&TokenKind::LBracket)?;

        let mut class = ClassDecl {
            name,
            super_name,
            super_span: super_tok.span,
            instance_vars: Vec::new(),
            class_vars: Vec::new(),
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
            span: start,
        };

        loop {
            match self.peek_kind().clone() {
                TokenKind::RBracket => break,
                TokenKind::Pipe | TokenKind::Operator(_) if self.at_empty_or_var_list() => {
                    let vars = self.parse_var_list()?;
                    class.instance_vars.extend(vars);
                }
                TokenKind::Identifier(word) if word == "class" => {
                    let class_tok = self.advance();
                    match self.peek_kind() {
                        TokenKind::Pipe => {
                            let vars = self.parse_var_list()?;
                            class.class_vars.extend(vars);
                        }
                        TokenKind::Operator(op) if op == "||" => {
                            self.advance();
                        }
                        // A unary instance method that happens to be named `class`.
                        TokenKind::LBracket => {
                            let method = self.parse_method_body(
                                false,
                                "class".to_string(),
                                Vec::new(),
                                class_tok.span,
                            )?;
                            class.instance_methods.push(method);
                        }
                        _ => {
                            let method = self.parse_method(true, class_tok.span)?;
                            class.class_methods.push(method);
                        }
                    }
                }
                _ => {
                    let start = self.peek_span();
                    let method = self.parse_method(false, start)?;
                    class.instance_methods.push(method);
                }
            }
        }

        let end = self.expect(&TokenKind::RBracket)?;
        class.span = start.merge(end.span);
        Ok(class)
    }

    fn at_empty_or_var_list(&mut self) -> bool {
        match self.peek_kind() {
            TokenKind::Pipe => true,
            TokenKind::Operator(op) => op == "||",
            _ => false,
        }
    }

    /// `| a b c |`, or `||` for an empty list.
    fn parse_var_list(&mut self) -> Result<Vec<VarDecl>, ParseError> {
        if let TokenKind::Operator(op) = self.peek_kind() {
            if op == "||" {
                self.advance();
                return Ok(Vec::new());
            }
        }
        self.expect(&TokenKind::Pipe)?;
        let mut vars = Vec::new();
        while !self.check(&TokenKind::Pipe) {
            vars.push(self.expect_identifier("variable name or `|`")?);
        }
        self.advance();
        Ok(vars)
    }

    /// A message pattern followed by a bracketed body.
    fn parse_method(
        &mut self,
        is_class_method: bool,
        start: Span,
    ) -> Result<MethodDecl, ParseError> {
        let tok = self.advance();
        let (selector, params) = match tok.kind {
            TokenKind::Identifier(name) => (name, Vec::new()),
            TokenKind::Operator(op) => {
                let param = self.expect_identifier("binary method parameter")?;
                (op, vec![param])
            }
            TokenKind::Keyword(first) => {
                let mut selector = first;
                let mut params = vec![self.expect_identifier("keyword method parameter")?];
                while let TokenKind::Keyword(kw) = self.peek_kind().clone() {
                    self.advance();
                    selector.push_str(&kw);
                    params.push(self.expect_identifier("keyword method parameter")?);
                }
                (selector, params)
            }
            _ => return Err(unexpected(&tok, "method pattern")),
        };
        self.parse_method_body(is_class_method, selector, params, start)
    }

    fn parse_method_body(
        &mut self,
        is_class_method: bool,
        selector: String,
        params: Vec<VarDecl>,
        start: Span,
    ) -> Result<MethodDecl, ParseError> {
        self.expect(&TokenKind::LBracket)?;
        let temps = if self.at_empty_or_var_list() {
            self.parse_var_list()?
        } else {
            Vec::new()
        };
        let body = self.parse_statements()?;
        let end = self.expect(&TokenKind::RBracket)?;
        Ok(MethodDecl {
            is_class_method,
            selector,
            params,
            temps,
            body,
            span: start.merge(end.span),
        })
    }

    // ── Statements ──────────────────────────────────────────────────

    /// Statements separated by `.` up to (not including) the closing `]`.
    fn parse_statements(&mut self) -> Result<Vec<ExprId>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            while self.check(&TokenKind::Dot) {
                self.advance();
            }
            if self.check(&TokenKind::RBracket) {
                return Ok(stmts);
            }
            stmts.push(self.parse_statement()?);
            match self.peek_kind() {
                TokenKind::Dot | TokenKind::RBracket => {}
                _ => {
                    let tok = self.advance();
                    return Err(unexpected(&tok, "`.` or `]`"));
                }
            }
        }
    }

    fn parse_statement(&mut self) -> Result<ExprId, ParseError> {
        if self.check(&TokenKind::Caret) {
            let caret = self.advance();
            let value = self.parse_expression()?;
            let span = caret.span.merge(self.span_of(value));
            return Ok(self.alloc_expr(ExprKind::Return(value), span));
        }
        self.parse_expression()
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> Result<ExprId, ParseError> {
        let left = self.parse_cascade_level()?;
        self.parse_assignment_tail(left)
    }

    fn parse_assignment_tail(&mut self, target: ExprId) -> Result<ExprId, ParseError> {
        if !self.check(&TokenKind::Assign) {
            return Ok(target);
        }
        let assign = self.advance();
        if !matches!(self.arena.kind(target), ExprKind::Ident(_)) {
            return Err(ParseError::new(
                "assignment target must be a variable name",
                self.span_of(target).merge(assign.span),
            ));
        }
        let value = self.parse_expression()?;
        let span = self.span_of(target).merge(self.span_of(value));
        Ok(self.alloc_expr(ExprKind::Assign { target, value }, span))
    }

    fn parse_cascade_level(&mut self) -> Result<ExprId, ParseError> {
        let expr = self.parse_keyword_level()?;
        self.parse_cascade_tail(expr)
    }

    fn parse_cascade_tail(&mut self, expr: ExprId) -> Result<ExprId, ParseError> {
        if !self.check(&TokenKind::Semicolon) {
            return Ok(expr);
        }

        let receiver = match self.arena.kind(expr) {
            ExprKind::Send { receiver, .. } => *receiver,
            _ => {
                return Err(ParseError::new(
                    "expected cascade message",
                    self.span_of(expr),
                ));
            }
        };
        let mut messages = vec![expr];

        while self.check(&TokenKind::Semicolon) {
            self.advance();
            let msg = self.parse_cascade_message(receiver)?;
            messages.push(msg);
        }

        let start = self.span_of(receiver);
        let end = messages
            .last()
            .map(|m| self.span_of(*m))
            .unwrap_or(start);
        Ok(self.alloc_expr(ExprKind::Cascade { receiver, messages }, start.merge(end)))
    }

    /// One message of a cascade, sent to the cascade's receiver.
    fn parse_cascade_message(&mut self, receiver: ExprId) -> Result<ExprId, ParseError> {
        let expr = match self.peek_kind() {
            TokenKind::Identifier(_) => {
                let expr = self.parse_unary_tail(receiver);
                self.parse_binary_with_left(expr, 0)?
            }
            TokenKind::Operator(_) => self.parse_binary_with_left(receiver, 0)?,
            TokenKind::Keyword(_) => receiver,
            _ => {
                return Err(ParseError::new(
                    "expected cascade message",
                    self.peek_span(),
                ));
            }
        };
        if matches!(self.peek_kind(), TokenKind::Keyword(_)) {
            self.parse_keyword_tail(expr)
        } else {
            Ok(expr)
        }
    }

    fn parse_keyword_level(&mut self) -> Result<ExprId, ParseError> {
        let recv = self.parse_binary_level()?;
        if matches!(self.peek_kind(), TokenKind::Keyword(_)) {
            self.parse_keyword_tail(recv)
        } else {
            Ok(recv)
        }
    }

    fn parse_keyword_tail(&mut self, receiver: ExprId) -> Result<ExprId, ParseError> {
        let start = self.span_of(receiver);
        let mut selector = String::new();
        let mut args = Vec::new();

        while let TokenKind::Keyword(kw) = self.peek_kind().clone() {
            self.advance();
            selector.push_str(&kw);
            args.push(self.parse_binary_level()?);
        }

        let end = args.last().map(|a| self.span_of(*a)).unwrap_or(start);
        Ok(self.alloc_expr(
            ExprKind::Send {
                receiver,
                selector,
                args,
            },
            start.merge(end),
        ))
    }

    fn parse_binary_level(&mut self) -> Result<ExprId, ParseError> {
        self.parse_binary_with_min_precedence(0)
    }

    fn parse_binary_with_min_precedence(&mut self, min_prec: u8) -> Result<ExprId, ParseError> {
        let left = self.parse_unary_level()?;
        self.parse_binary_with_left(left, min_prec)
    }

    fn parse_binary_with_left(
        &mut self,
        mut left: ExprId,
        min_prec: u8,
    ) -> Result<ExprId, ParseError> {
        while let TokenKind::Operator(op) = self.peek_kind().clone() {
            let prec = self.operator_precedence(&op);
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary_with_min_precedence(prec + 1)?;
            let span = self.span_of(left).merge(self.span_of(right));
            left = self.alloc_expr(
                ExprKind::Send {
                    receiver: left,
                    selector: op,
                    args: vec![right],
                },
                span,
            );
        }
        Ok(left)
    }

    fn operator_precedence(&self, op: &str) -> u8 {
        *self.op_precedence.get(op).unwrap_or(&1)
    }

    fn parse_unary_level(&mut self) -> Result<ExprId, ParseError> {
        let expr = self.parse_primary()?;
        Ok(self.parse_unary_tail(expr))
    }

    fn parse_unary_tail(&mut self, mut expr: ExprId) -> ExprId {
        while let TokenKind::Identifier(_) = self.peek_kind() {
            let tok = self.advance();
            let TokenKind::Identifier(selector) = tok.kind else {
                unreachable!()
            };
            let span = self.span_of(expr).merge(tok.span);
            expr = self.alloc_expr(
                ExprKind::Send {
                    receiver: expr,
                    selector,
                    args: Vec::new(),
                },
                span,
            );
        }
        expr
    }

    fn parse_primary(&mut self) -> Result<ExprId, ParseError> {
        if self.check(&TokenKind::LBracket) {
            return self.parse_block();
        }
        if self.check(&TokenKind::HashParen) {
            return self.parse_array();
        }
        if self.check(&TokenKind::LParen) {
            let open = self.advance();
            let inner = self.parse_expression()?;
            let close = self.expect(&TokenKind::RParen)?;
            return Ok(self.alloc_expr(ExprKind::Paren(inner), open.span.merge(close.span)));
        }

        let tok = self.advance();
        let kind = match tok.kind {
            TokenKind::Integer(v) => ExprKind::Integer(v),
            TokenKind::Float(v) => ExprKind::Float(v),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::Symbol(s) => ExprKind::Symbol(s),
            TokenKind::Character(c) => ExprKind::Character(c),
            TokenKind::NilKw => ExprKind::Nil,
            TokenKind::TrueKw => ExprKind::True,
            TokenKind::FalseKw => ExprKind::False,
            TokenKind::SelfKw => ExprKind::Ident("self".into()),
            TokenKind::SuperKw => ExprKind::Ident("super".into()),
            TokenKind::Identifier(name) => ExprKind::Ident(name),
            TokenKind::Error(message) => return Err(ParseError::new(message, tok.span)),
            _ => return Err(unexpected(&tok, "expression")),
        };
        Ok(self.alloc_expr(kind, tok.span))
    }

    /// `#(e1. e2. e3)`, with an optional trailing `.`.
    fn parse_array(&mut self) -> Result<ExprId, ParseError> {
        let open = self.expect(&TokenKind::HashParen)?;
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RParen) {
            elements.push(self.parse_expression()?);
            if !self.check(&TokenKind::Dot) {
                break;
            }
            self.advance();
        }
        let close = self.expect(&TokenKind::RParen)?;
        Ok(self.alloc_expr(ExprKind::Array(elements), open.span.merge(close.span)))
    }

    /// `[:a :b | | t | statements]`
    fn parse_block(&mut self) -> Result<ExprId, ParseError> {
        let open = self.expect(&TokenKind::LBracket)?;

        let mut params = Vec::new();
        while let TokenKind::ArgName(_) = self.peek_kind() {
            let tok = self.advance();
            let TokenKind::ArgName(name) = tok.kind else {
                unreachable!()
            };
            params.push(VarDecl::new(name, tok.span));
        }

        let mut temps = Vec::new();
        if !params.is_empty() {
            // `[:a || t | ...]` closes the parameters and opens the temporaries.
            if matches!(self.peek_kind(), TokenKind::Operator(op) if op == "||") {
                self.advance();
                while !self.check(&TokenKind::Pipe) {
                    temps.push(self.expect_identifier("variable name or `|`")?);
                }
                self.advance();
            } else {
                self.expect(&TokenKind::Pipe)?;
            }
        }
        if temps.is_empty() && self.at_empty_or_var_list() {
            temps = self.parse_var_list()?;
        }

        let body = self.parse_statements()?;
        let close = self.expect(&TokenKind::RBracket)?;
        Ok(self.alloc_expr(
            ExprKind::Block {
                params,
                temps,
                body,
            },
            open.span.merge(close.span),
        ))
    }
}

fn unexpected(tok: &Token, expected: &str) -> ParseError {
    match &tok.kind {
        TokenKind::Error(message) => ParseError::new(message.clone(), tok.span),
        kind => ParseError::new(
            format!("expected {}, found {}", expected, kind.name()),
            tok.span,
        ),
    }
}

impl<I: Iterator<Item = Token>> Iterator for Parser<I> {
    type Item = Result<ClassDecl, ParseError>;

    fn next(&mut self) -> Option<Result<ClassDecl, ParseError>> {
        if self.at_eof || matches!(self.peek_kind(), TokenKind::Eof) {
            self.at_eof = true;
            return None;
        }
        let result = self.parse_class();
        if result.is_err() {
            self.at_eof = true;
        }
        Some(result)
    }
}
