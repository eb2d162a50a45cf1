//! Token types produced by the lexer.
use crate::span::Span;

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal, e.g. `42`, `-7`, `16rFF`.
    Integer(i64),
    /// Floating-point literal, e.g. `3.14`, `1.5e10`.
    Float(f64),
    /// String literal (contents without surrounding quotes).
    String(String),
    /// Symbol literal (contents without the leading `#`), e.g. `#at:put:`.
    Symbol(String),
    /// Character literal (contents without the leading `$`), e.g. `$a`.
    Character(char),

    /// An identifier, e.g. `factorial`, `Point`, `x`.
    Identifier(String),
    /// A keyword part (identifier + colon), e.g. `at:`, `ifTrue:`.
    Keyword(String),
    /// A block parameter name (colon + identifier), e.g. `:each`.
    ArgName(String),

    /// `self`
    SelfKw,
    /// `super`
    SuperKw,
    /// `nil`
    NilKw,
    /// `true`
    TrueKw,
    /// `false`
    FalseKw,

    /// A binary operator composed of op-chars, e.g. `+`, `<=`, `->`.
    Operator(String),
    /// Assignment operator `:=`.
    Assign,
    /// `:` on its own, separating a class name from its superclass.
    Colon,

    /// `#(` opening an array literal.
    HashParen,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `|` delimiting temporaries and block parameters.
    Pipe,
    /// `.` statement separator.
    Dot,
    /// `;` cascade separator.
    Semicolon,
    /// `^` return.
    Caret,

    /// A line comment: `// ...` (text excludes the leading `//`).
    LineComment(String),
    /// A nestable block comment: `/* ... */` (text excludes delimiters).
    BlockComment(String),

    /// End of input.
    Eof,
    /// An unrecognized character or malformed token.
    Error(String),
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Character(_) => "character",
            Self::Identifier(_) => "identifier",
            Self::Keyword(_) => "keyword",
            Self::ArgName(_) => "argument name",
            Self::SelfKw => "`self`",
            Self::SuperKw => "`super`",
            Self::NilKw => "`nil`",
            Self::TrueKw => "`true`",
            Self::FalseKw => "`false`",
            Self::Operator(_) => "operator",
            Self::Assign => "`:=`",
            Self::Colon => "`:`",
            Self::HashParen => "`#(`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::Pipe => "`|`",
            Self::Dot => "`.`",
            Self::Semicolon => "`;`",
            Self::Caret => "`^`",
            Self::LineComment(_) => "line comment",
            Self::BlockComment(_) => "block comment",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment(_) | Self::BlockComment(_))
    }

    /// Whether this token can be the last token of an operand, so that a
    /// following `-` is a binary operator rather than a literal sign.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            Self::Integer(_)
                | Self::Float(_)
                | Self::String(_)
                | Self::Symbol(_)
                | Self::Character(_)
                | Self::Identifier(_)
                | Self::SelfKw
                | Self::SuperKw
                | Self::NilKw
                | Self::TrueKw
                | Self::FalseKw
                | Self::RParen
                | Self::RBracket
        )
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// The original source text of this token.
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_comment(&self) -> bool {
        self.kind.is_comment()
    }
}
