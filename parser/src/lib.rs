//! # Parser
//!
//! A streaming lexer and recursive-descent parser for class definitions.
//!
//! ## Architecture
//!
//! ```text
//!  impl Read (file, &[u8], …)
//!      │
//!      ▼
//!  ┌────────┐    Token stream     ┌────────┐    ClassDecl stream
//!  │ Lexer  │ ──────────────────▶ │ Parser │ ──────────────────▶
//!  └────────┘  (impl Iterator)    └────────┘  (impl Iterator)
//! ```
//!
//! Method bodies are allocated into an [`AstArena`]; the whole result of
//! one source text is a [`CompilationUnit`].
//!
//! ```rust
//! use parser::{parse_source, ExprKind};
//!
//! let unit = parse_source("Counter : nil [ | n | bump [ n := n + 1 ] ]").unwrap();
//! let bump = &unit.classes[0].instance_methods[0];
//! assert!(matches!(unit.arena.kind(bump.body[0]), ExprKind::Assign { .. }));
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod visit;

pub use ast::{
    AstArena, ClassDecl, CompilationUnit, ExprId, ExprKind, ExprNode, MethodDecl, VarDecl,
};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};
pub use visit::Visitor;

/// Lex and parse a whole source text.
pub fn parse_source(source: &str) -> Result<CompilationUnit, ParseError> {
    Parser::new(Lexer::from_str(source)).parse_compilation_unit()
}

/// Parse from any reader, e.g. an open file.
pub fn parse_reader<R: std::io::Read>(reader: R) -> Result<CompilationUnit, ParseError> {
    Parser::new(Lexer::new(reader)).parse_compilation_unit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_source_and_reader_agree() {
        let src = "A : nil [ | a | m: x [ ^ a + x ] ]";
        let from_str = parse_source(src).expect("parse failed");
        let from_reader = parse_reader(std::io::Cursor::new(src.as_bytes())).expect("parse failed");
        assert_eq!(from_str, from_reader);
    }

    #[test]
    fn empty_source_is_an_empty_unit() {
        let unit = parse_source("  // nothing\n").expect("parse failed");
        assert!(unit.classes.is_empty());
        assert!(unit.arena.is_empty());
    }

    #[test]
    fn spans_cover_class_declaration() {
        let unit = parse_source("A : nil [\n  m [ ^ 1 ]\n]").expect("parse failed");
        let class = &unit.classes[0];
        assert_eq!(class.span.start, Pos::new(0, 1, 1));
        assert_eq!(class.span.end.line, 3);
        assert_eq!(class.instance_methods[0].span.start.line, 2);
    }
}
