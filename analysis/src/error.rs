use parser::Span;

use crate::variable::VarKind;

/// Everything that makes a compilation unit invalid. All of these are
/// fatal: the first one aborts the whole unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    /// A superclass name that names no class of the unit.
    UnresolvedSuperclass { class: String, super_name: String },
    /// An identifier that no enclosing scope declares.
    UndeclaredName(String),
    /// An assignment whose target is not writable.
    InvalidAssignment { name: String, kind: VarKind },
    DuplicateClass(String),
    DuplicateDeclaration(String),
    CyclicInheritance(String),
}

impl std::fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedSuperclass { class, super_name } => {
                write!(f, "superclass `{}` of `{}` is not declared", super_name, class)
            }
            Self::UndeclaredName(name) => write!(f, "reference to undeclared name `{}`", name),
            Self::InvalidAssignment { name, kind } => {
                write!(f, "cannot assign to {} `{}`", kind, name)
            }
            Self::DuplicateClass(name) => write!(f, "class `{}` is declared more than once", name),
            Self::DuplicateDeclaration(name) => {
                write!(f, "`{}` is declared more than once", name)
            }
            Self::CyclicInheritance(name) => {
                write!(f, "cyclic superclass chain through `{}`", name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub span: Option<Span>,
}

impl AnalysisError {
    pub fn new(kind: AnalysisErrorKind) -> Self {
        Self { kind, span: None }
    }

    /// Attach a source location unless one is already known.
    pub fn at(mut self, span: Span) -> Self {
        self.span.get_or_insert(span);
        self
    }
}

impl From<AnalysisErrorKind> for AnalysisError {
    fn from(kind: AnalysisErrorKind) -> Self {
        Self::new(kind)
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} at {}", self.kind, span),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::Pos;

    #[test]
    fn display_with_and_without_span() {
        let err = AnalysisError::new(AnalysisErrorKind::UndeclaredName("x".into()));
        assert_eq!(err.to_string(), "reference to undeclared name `x`");

        let span = Span::new(Pos::new(4, 1, 5), Pos::new(5, 1, 6));
        let err = err.at(span);
        assert_eq!(err.to_string(), "reference to undeclared name `x` at 1:5-1:6");
    }

    #[test]
    fn at_keeps_the_first_span() {
        let first = Span::point(Pos::new(1, 1, 2));
        let second = Span::point(Pos::new(9, 2, 1));
        let err = AnalysisError::new(AnalysisErrorKind::DuplicateClass("A".into()))
            .at(first)
            .at(second);
        assert_eq!(err.span, Some(first));
    }

    #[test]
    fn invalid_assignment_names_the_kind() {
        let err = AnalysisError::new(AnalysisErrorKind::InvalidAssignment {
            name: "a".into(),
            kind: VarKind::Argument,
        });
        assert_eq!(err.to_string(), "cannot assign to argument `a`");
    }
}
