//! Named bindings and their capture classification.
use parser::Span;

use crate::scope::ScopeId;

/// Handle to a [`Variable`] in a [`crate::scope::ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Argument,
    Local,
    /// An argument or local promoted to heap storage.
    Heapvar,
    /// A surface name declared by an inlined block; see [`Variable::alias_of`].
    InlinedBlockLocal,
    InstanceVariable,
    NamespaceMember,
    /// `self` (and `super`) of an instance scope.
    SelfRef,
}

impl std::fmt::Display for VarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Argument => "argument",
            Self::Local => "local",
            Self::Heapvar => "heap variable",
            Self::InlinedBlockLocal => "inlined block local",
            Self::InstanceVariable => "instance variable",
            Self::NamespaceMember => "namespace member",
            Self::SelfRef => "self",
        };
        f.write_str(s)
    }
}

/// How a variable is reached from scopes other than its own.
///
/// Ordered so that escalation is a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RemoteAccess {
    #[default]
    None,
    ReadRemotely,
    WrittenRemotely,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// The scope that owns this variable.
    pub scope: ScopeId,
    pub kind: VarKind,
    /// `kind` at declaration time. For an inlined block local this is
    /// `Argument` or `Local` depending on what the alias stands for.
    pub declared_as: VarKind,
    pub remote_access: RemoteAccess,
    /// For an inlined block local, the real slot it stands for.
    pub alias_of: Option<VarId>,
    /// Slot index of an instance variable, superclass variables first.
    pub index: Option<usize>,
    pub span: Option<Span>,
}

impl Variable {
    pub fn new(name: impl Into<String>, scope: ScopeId, kind: VarKind) -> Self {
        Self {
            name: name.into(),
            scope,
            kind,
            declared_as: kind,
            remote_access: RemoteAccess::None,
            alias_of: None,
            index: None,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Escalate the remote-access level. Never lowers it.
    pub fn mark_remote_access(&mut self, for_write: bool) {
        let level = if for_write {
            RemoteAccess::WrittenRemotely
        } else {
            RemoteAccess::ReadRemotely
        };
        self.remote_access = self.remote_access.max(level);
    }

    pub fn is_writable(&self) -> bool {
        match self.kind {
            VarKind::Local | VarKind::Heapvar | VarKind::InstanceVariable => true,
            VarKind::InlinedBlockLocal => self.declared_as == VarKind::Local,
            VarKind::Argument | VarKind::NamespaceMember | VarKind::SelfRef => false,
        }
    }

    /// Whether this variable was declared as a parameter, including
    /// parameters of inlined blocks and promoted arguments.
    pub fn is_parameter(&self) -> bool {
        self.declared_as == VarKind::Argument
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(kind: VarKind) -> Variable {
        Variable::new("v", ScopeId(0), kind)
    }

    #[test]
    fn escalation_is_monotonic() {
        let mut v = var(VarKind::Local);
        v.mark_remote_access(false);
        assert_eq!(v.remote_access, RemoteAccess::ReadRemotely);
        v.mark_remote_access(true);
        assert_eq!(v.remote_access, RemoteAccess::WrittenRemotely);
        v.mark_remote_access(false);
        assert_eq!(v.remote_access, RemoteAccess::WrittenRemotely);
    }

    #[test]
    fn writable_kinds() {
        assert!(var(VarKind::Local).is_writable());
        assert!(var(VarKind::Heapvar).is_writable());
        assert!(var(VarKind::InstanceVariable).is_writable());
        assert!(!var(VarKind::Argument).is_writable());
        assert!(!var(VarKind::SelfRef).is_writable());
        assert!(!var(VarKind::NamespaceMember).is_writable());
    }

    #[test]
    fn inlined_alias_writability_follows_declaration() {
        let mut temp = var(VarKind::InlinedBlockLocal);
        temp.declared_as = VarKind::Local;
        assert!(temp.is_writable());

        let mut param = var(VarKind::InlinedBlockLocal);
        param.declared_as = VarKind::Argument;
        assert!(!param.is_writable());
        assert!(param.is_parameter());
    }
}
