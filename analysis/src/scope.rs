//! Lexical scopes and name lookup.
//!
//! Scopes and variables live in one [`ScopeTree`] and refer to each other
//! through [`ScopeId`] and [`VarId`] handles. A scope's `outer` link
//! points to its lexical parent; the namespace scope is the root.
use log::trace;
use parser::VarDecl;

use crate::error::{AnalysisError, AnalysisErrorKind};
use crate::variable::{VarId, VarKind, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Global names; currently only classes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceScope {
    pub members: Vec<VarId>,
}

/// One side (instance or class) of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceScope {
    pub class_index: usize,
    pub class_side: bool,
    pub self_var: VarId,
    /// All instance variables in slot order, inherited ones first.
    pub instance_vars: Vec<VarId>,
}

/// Storage and capture data of a method or block activation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeScope {
    pub arguments: Vec<VarId>,
    pub locals: Vec<VarId>,
    pub heapvars: Vec<VarId>,
    /// Surface names declared by this scope when it is an inlined block.
    pub inlined: Vec<VarId>,
    pub needs_heap_context: bool,
    /// Scopes whose heapvar records this scope must be handed.
    pub using_heapvars_from: Vec<ScopeId>,
    /// Read-only captures carried into this scope by value.
    pub copying_vars: Vec<VarId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeKind {
    Namespace(NamespaceScope),
    Class(InstanceScope),
    Method(CodeScope),
    Block(CodeScope),
    OptimisedBlock(CodeScope),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub outer: Option<ScopeId>,
    pub kind: ScopeKind,
}

impl Scope {
    pub fn code(&self) -> Option<&CodeScope> {
        match &self.kind {
            ScopeKind::Method(c) | ScopeKind::Block(c) | ScopeKind::OptimisedBlock(c) => Some(c),
            _ => None,
        }
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeScope> {
        match &mut self.kind {
            ScopeKind::Method(c) | ScopeKind::Block(c) | ScopeKind::OptimisedBlock(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, ScopeKind::Method(_))
    }

    /// A block realised as a closure object.
    pub fn is_true_block(&self) -> bool {
        matches!(self.kind, ScopeKind::Block(_))
    }

    pub fn is_optimised(&self) -> bool {
        matches!(self.kind, ScopeKind::OptimisedBlock(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ScopeKind::Namespace(_) => "namespace",
            ScopeKind::Class(_) => "class",
            ScopeKind::Method(_) => "method",
            ScopeKind::Block(_) => "block",
            ScopeKind::OptimisedBlock(_) => "optimised block",
        }
    }
}

/// Arena of every scope and variable of a compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    vars: Vec<Variable>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scope(&mut self, outer: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope { outer, kind });
        id
    }

    /// One side of a class, with its own `self`.
    pub fn add_instance_scope(
        &mut self,
        outer: ScopeId,
        class_index: usize,
        class_side: bool,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let self_var = self.add_var(Variable::new("self", id, VarKind::SelfRef));
        self.add_scope(
            Some(outer),
            ScopeKind::Class(InstanceScope {
                class_index,
                class_side,
                self_var,
                instance_vars: Vec::new(),
            }),
        )
    }

    pub fn add_var(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.index()]
    }

    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId(i as u32), v))
    }

    pub fn code(&self, id: ScopeId) -> Option<&CodeScope> {
        self.scope(id).code()
    }

    pub fn code_mut(&mut self, id: ScopeId) -> Option<&mut CodeScope> {
        self.scope_mut(id).code_mut()
    }

    /// Lexical ancestors of `id`, starting with `id` itself.
    pub fn chain(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(id), |s| self.scope(*s).outer)
    }

    /// The nearest scope, starting at `id`, that is not an inlined block.
    pub fn real_scope(&self, id: ScopeId) -> ScopeId {
        self.chain(id)
            .find(|s| !self.scope(*s).is_optimised())
            .unwrap_or(id)
    }

    /// The method scope `id` belongs to, if it is inside one.
    pub fn method_of(&self, id: ScopeId) -> Option<ScopeId> {
        self.chain(id).find(|s| self.scope(*s).is_method())
    }

    /// Follow an inlined block local to the slot it stands for.
    pub fn real_var(&self, id: VarId) -> VarId {
        let mut id = id;
        while let Some(real) = self.var(id).alias_of {
            id = real;
        }
        id
    }

    fn find_named(&self, list: &[VarId], name: &str) -> Option<VarId> {
        list.iter().copied().find(|v| self.var(*v).name == name)
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Resolve `name` from `scope` outwards.
    ///
    /// Within a code scope heapvars are searched first, then arguments,
    /// locals and inlined aliases. Once the search leaves a true block,
    /// every variable found further out is accessed remotely and gets its
    /// remote-access level escalated; an inlined alias escalates the slot
    /// it stands for instead of itself.
    pub fn lookup(
        &mut self,
        scope: ScopeId,
        name: &str,
        for_write: bool,
        is_remote: bool,
    ) -> Result<VarId, AnalysisError> {
        let mut current = Some(scope);
        let mut remote = is_remote;

        while let Some(id) = current {
            let s = self.scope(id);
            match &s.kind {
                ScopeKind::Method(code)
                | ScopeKind::Block(code)
                | ScopeKind::OptimisedBlock(code) => {
                    let found = self
                        .find_named(&code.heapvars, name)
                        .or_else(|| self.find_named(&code.arguments, name))
                        .or_else(|| self.find_named(&code.locals, name))
                        .or_else(|| self.find_named(&code.inlined, name));
                    if let Some(var) = found {
                        if remote {
                            let real = self.real_var(var);
                            self.var_mut(real).mark_remote_access(for_write);
                        }
                        trace!(
                            "lookup `{}` from {} found {:?} in {} (remote: {})",
                            name,
                            scope,
                            var,
                            id,
                            remote
                        );
                        return Ok(var);
                    }
                    remote = remote || s.is_true_block();
                }
                ScopeKind::Class(instance) => {
                    if name == "self" || name == "super" {
                        return Ok(instance.self_var);
                    }
                    if let Some(var) = self.find_named(&instance.instance_vars, name) {
                        trace!(
                            "lookup `{}` from {} found instance variable {:?}",
                            name,
                            scope,
                            var
                        );
                        return Ok(var);
                    }
                }
                ScopeKind::Namespace(ns) => {
                    if let Some(var) = self.find_named(&ns.members, name) {
                        trace!("lookup `{}` from {} found namespace member {:?}", name, scope, var);
                        return Ok(var);
                    }
                }
            }
            current = s.outer;
        }

        Err(AnalysisErrorKind::UndeclaredName(name.to_string()).into())
    }

    // ── Declaration ─────────────────────────────────────────────────

    pub fn add_argument(&mut self, scope: ScopeId, decl: &VarDecl) -> Result<VarId, AnalysisError> {
        self.declare(scope, decl, VarKind::Argument)
    }

    pub fn add_local(&mut self, scope: ScopeId, decl: &VarDecl) -> Result<VarId, AnalysisError> {
        self.declare(scope, decl, VarKind::Local)
    }

    fn declare(
        &mut self,
        scope: ScopeId,
        decl: &VarDecl,
        kind: VarKind,
    ) -> Result<VarId, AnalysisError> {
        if self.scope(scope).is_optimised() {
            return self.add_inlined_block_local(scope, decl, kind == VarKind::Argument);
        }
        let Some(code) = self.code(scope) else {
            return Err(AnalysisErrorKind::UndeclaredName(decl.name.clone()).into());
        };
        if self.find_named(&code.arguments, &decl.name).is_some()
            || self.find_named(&code.locals, &decl.name).is_some()
        {
            return Err(AnalysisError::new(AnalysisErrorKind::DuplicateDeclaration(
                decl.name.clone(),
            ))
            .at(decl.span));
        }

        let var = self.add_var(Variable::new(decl.name.clone(), scope, kind).with_span(decl.span));
        if let Some(code) = self.code_mut(scope) {
            match kind {
                VarKind::Argument => code.arguments.push(var),
                _ => code.locals.push(var),
            }
        }
        Ok(var)
    }

    /// Declare `decl` inside an inlined block.
    ///
    /// The storage is a fresh local of the nearest real scope under a
    /// name no source identifier can spell; the inlined block itself only
    /// records an alias under the surface name.
    pub fn add_inlined_block_local(
        &mut self,
        scope: ScopeId,
        decl: &VarDecl,
        is_param: bool,
    ) -> Result<VarId, AnalysisError> {
        let Some(code) = self.code(scope) else {
            return Err(AnalysisErrorKind::UndeclaredName(decl.name.clone()).into());
        };
        if self.find_named(&code.inlined, &decl.name).is_some() {
            return Err(AnalysisError::new(AnalysisErrorKind::DuplicateDeclaration(
                decl.name.clone(),
            ))
            .at(decl.span));
        }

        let real_scope = self.real_scope(scope);
        let slot_count = self
            .code(real_scope)
            .map(|c| c.arguments.len() + c.locals.len())
            .unwrap_or(0);
        let slot_name = format!("{}#{}", decl.name, slot_count);
        let real =
            self.add_var(Variable::new(slot_name, real_scope, VarKind::Local).with_span(decl.span));
        if let Some(code) = self.code_mut(real_scope) {
            code.locals.push(real);
        }

        let mut alias = Variable::new(decl.name.clone(), scope, VarKind::InlinedBlockLocal)
            .with_span(decl.span);
        alias.declared_as = if is_param {
            VarKind::Argument
        } else {
            VarKind::Local
        };
        alias.alias_of = Some(real);
        let alias = self.add_var(alias);
        if let Some(code) = self.code_mut(scope) {
            code.inlined.push(alias);
        }
        trace!(
            "inlined block local `{}` in {} backed by {:?} in {}",
            decl.name,
            scope,
            real,
            real_scope
        );
        Ok(alias)
    }

    // ── Closure conversion support ──────────────────────────────────

    /// Move every argument and local written from a remote scope into
    /// the heapvars of `scope`. Returns the promoted variables.
    pub fn promote_written_remotely(&mut self, scope: ScopeId) -> Vec<VarId> {
        let Some(code) = self.code(scope) else {
            return Vec::new();
        };
        let is_written = |v: &VarId| {
            self.var(*v).remote_access == crate::variable::RemoteAccess::WrittenRemotely
        };
        let promoted: Vec<VarId> = code
            .arguments
            .iter()
            .chain(code.locals.iter())
            .copied()
            .filter(is_written)
            .collect();
        if promoted.is_empty() {
            return promoted;
        }

        for var in &promoted {
            self.var_mut(*var).kind = VarKind::Heapvar;
        }
        if let Some(code) = self.code_mut(scope) {
            code.arguments.retain(|v| !promoted.contains(v));
            code.locals.retain(|v| !promoted.contains(v));
            for var in &promoted {
                if !code.heapvars.contains(var) {
                    code.heapvars.push(*var);
                }
            }
        }
        promoted
    }

    /// Add `from` to the heapvar sources of `scope` if not already there.
    pub fn add_using_heapvars_from(&mut self, scope: ScopeId, from: ScopeId) {
        if let Some(code) = self.code_mut(scope) {
            if !code.using_heapvars_from.contains(&from) {
                code.using_heapvars_from.push(from);
            }
        }
    }

    /// Add `var` to the copied captures of `scope` if not already there.
    pub fn add_copying_var(&mut self, scope: ScopeId, var: VarId) {
        if let Some(code) = self.code_mut(scope) {
            if !code.copying_vars.contains(&var) {
                code.copying_vars.push(var);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::RemoteAccess;
    use parser::Span;

    fn decl(name: &str) -> VarDecl {
        VarDecl::new(name, Span::default())
    }

    /// namespace <- instance side <- method <- block
    fn method_and_block(tree: &mut ScopeTree) -> (ScopeId, ScopeId, ScopeId) {
        let ns = tree.add_scope(None, ScopeKind::Namespace(NamespaceScope::default()));
        let self_var = tree.add_var(Variable::new("self", ScopeId(1), VarKind::SelfRef));
        let class = tree.add_scope(
            Some(ns),
            ScopeKind::Class(InstanceScope {
                class_index: 0,
                class_side: false,
                self_var,
                instance_vars: Vec::new(),
            }),
        );
        let method = tree.add_scope(Some(class), ScopeKind::Method(CodeScope::default()));
        let block = tree.add_scope(Some(method), ScopeKind::Block(CodeScope::default()));
        (class, method, block)
    }

    #[test]
    fn local_lookup_is_not_remote() {
        let mut tree = ScopeTree::new();
        let (_, method, _) = method_and_block(&mut tree);
        let x = tree.add_local(method, &decl("x")).unwrap();
        assert_eq!(tree.lookup(method, "x", true, false).unwrap(), x);
        assert_eq!(tree.var(x).remote_access, RemoteAccess::None);
    }

    #[test]
    fn lookup_across_block_marks_remote() {
        let mut tree = ScopeTree::new();
        let (_, method, block) = method_and_block(&mut tree);
        let x = tree.add_local(method, &decl("x")).unwrap();
        assert_eq!(tree.lookup(block, "x", false, false).unwrap(), x);
        assert_eq!(tree.var(x).remote_access, RemoteAccess::ReadRemotely);
        tree.lookup(block, "x", true, false).unwrap();
        assert_eq!(tree.var(x).remote_access, RemoteAccess::WrittenRemotely);
        tree.lookup(block, "x", false, false).unwrap();
        assert_eq!(tree.var(x).remote_access, RemoteAccess::WrittenRemotely);
    }

    #[test]
    fn block_own_variable_is_not_remote() {
        let mut tree = ScopeTree::new();
        let (_, _, block) = method_and_block(&mut tree);
        let t = tree.add_local(block, &decl("t")).unwrap();
        tree.lookup(block, "t", true, false).unwrap();
        assert_eq!(tree.var(t).remote_access, RemoteAccess::None);
    }

    #[test]
    fn inner_declaration_shadows_outer() {
        let mut tree = ScopeTree::new();
        let (_, method, block) = method_and_block(&mut tree);
        let outer = tree.add_local(method, &decl("x")).unwrap();
        let inner = tree.add_argument(block, &decl("x")).unwrap();
        assert_eq!(tree.lookup(block, "x", false, false).unwrap(), inner);
        assert_eq!(tree.var(outer).remote_access, RemoteAccess::None);
    }

    #[test]
    fn self_and_super_resolve_to_the_same_variable() {
        let mut tree = ScopeTree::new();
        let (class, _, block) = method_and_block(&mut tree);
        let ScopeKind::Class(instance) = &tree.scope(class).kind else {
            panic!("expected class scope");
        };
        let self_var = instance.self_var;
        assert_eq!(tree.lookup(block, "self", false, false).unwrap(), self_var);
        assert_eq!(tree.lookup(block, "super", false, false).unwrap(), self_var);
        assert_eq!(tree.var(self_var).remote_access, RemoteAccess::None);
    }

    #[test]
    fn undeclared_name_fails() {
        let mut tree = ScopeTree::new();
        let (_, _, block) = method_and_block(&mut tree);
        let err = tree.lookup(block, "nope", false, false).unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::UndeclaredName("nope".into()));
    }

    #[test]
    fn duplicate_declaration_in_one_scope() {
        let mut tree = ScopeTree::new();
        let (_, method, _) = method_and_block(&mut tree);
        tree.add_argument(method, &decl("a")).unwrap();
        let err = tree.add_local(method, &decl("a")).unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::DuplicateDeclaration("a".into()));
    }

    #[test]
    fn inlined_locals_live_in_the_real_scope() {
        let mut tree = ScopeTree::new();
        let (_, method, _) = method_and_block(&mut tree);
        let opt = tree.add_scope(Some(method), ScopeKind::OptimisedBlock(CodeScope::default()));
        let nested = tree.add_scope(Some(opt), ScopeKind::OptimisedBlock(CodeScope::default()));

        let i = tree.add_argument(nested, &decl("i")).unwrap();
        let real = tree.real_var(i);

        assert_eq!(tree.var(i).kind, VarKind::InlinedBlockLocal);
        assert!(tree.var(i).is_parameter());
        assert_eq!(tree.var(real).scope, method);
        assert_eq!(tree.var(real).kind, VarKind::Local);
        assert!(tree.code(method).unwrap().locals.contains(&real));
        assert!(tree.code(nested).unwrap().arguments.is_empty());
        assert!(tree.code(nested).unwrap().locals.is_empty());
        assert_eq!(tree.lookup(nested, "i", false, false).unwrap(), i);
    }

    #[test]
    fn remote_access_through_alias_marks_real_slot() {
        let mut tree = ScopeTree::new();
        let (_, method, _) = method_and_block(&mut tree);
        let opt = tree.add_scope(Some(method), ScopeKind::OptimisedBlock(CodeScope::default()));
        let block = tree.add_scope(Some(opt), ScopeKind::Block(CodeScope::default()));
        let t = tree.add_local(opt, &decl("t")).unwrap();

        tree.lookup(opt, "t", true, false).unwrap();
        assert_eq!(tree.var(tree.real_var(t)).remote_access, RemoteAccess::None);

        tree.lookup(block, "t", true, false).unwrap();
        assert_eq!(tree.var(t).remote_access, RemoteAccess::None);
        assert_eq!(tree.var(tree.real_var(t)).remote_access, RemoteAccess::WrittenRemotely);
    }

    #[test]
    fn promotion_moves_written_variables_only() {
        let mut tree = ScopeTree::new();
        let (_, method, block) = method_and_block(&mut tree);
        let w = tree.add_local(method, &decl("w")).unwrap();
        let r = tree.add_local(method, &decl("r")).unwrap();
        tree.lookup(block, "w", true, false).unwrap();
        tree.lookup(block, "r", false, false).unwrap();

        let promoted = tree.promote_written_remotely(method);
        assert_eq!(promoted, vec![w]);
        let code = tree.code(method).unwrap();
        assert_eq!(code.heapvars, vec![w]);
        assert_eq!(code.locals, vec![r]);
        assert_eq!(tree.var(w).kind, VarKind::Heapvar);
        assert_eq!(tree.var(w).declared_as, VarKind::Local);
        assert_eq!(tree.lookup(block, "w", false, false).unwrap(), w);
    }

    #[test]
    fn capture_sets_do_not_repeat() {
        let mut tree = ScopeTree::new();
        let (_, method, block) = method_and_block(&mut tree);
        let x = tree.add_local(method, &decl("x")).unwrap();
        tree.add_using_heapvars_from(block, method);
        tree.add_using_heapvars_from(block, method);
        tree.add_copying_var(block, x);
        tree.add_copying_var(block, x);
        let code = tree.code(block).unwrap();
        assert_eq!(code.using_heapvars_from, vec![method]);
        assert_eq!(code.copying_vars, vec![x]);
    }

    #[test]
    fn chain_helpers() {
        let mut tree = ScopeTree::new();
        let (class, method, block) = method_and_block(&mut tree);
        let opt = tree.add_scope(Some(block), ScopeKind::OptimisedBlock(CodeScope::default()));
        assert_eq!(tree.real_scope(opt), block);
        assert_eq!(tree.method_of(opt), Some(method));
        assert_eq!(tree.method_of(class), None);
        assert_eq!(tree.chain(block).collect::<Vec<_>>(), vec![block, method, class, ScopeId(0)]);
    }
}
