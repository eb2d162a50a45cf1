//! Second pass: closure conversion.
//!
//! Runs only after the first pass has seen the whole unit, so every
//! remote-access level it reads is final. On entry to each method or
//! block, variables written remotely are promoted to heapvars. Every
//! reference to a heapvar then threads the declaring scope's heapvar
//! record through the true blocks between the use and the declaration;
//! every reference to a remotely read variable threads the variable
//! itself by value. Returns crossing a true block are non-local and
//! force their method to keep a heap context.
use std::convert::Infallible;

use log::debug;
use parser::visit::walk_return;
use parser::{AstArena, ClassDecl, CompilationUnit, ExprId, ExprKind, MethodDecl, Visitor};

use crate::scope::ScopeId;
use crate::variable::{RemoteAccess, VarId, VarKind};
use crate::{Analysis, ReturnKind};

pub fn run(unit: &CompilationUnit, analysis: &mut Analysis) {
    for (index, class) in unit.classes.iter().enumerate() {
        debug!("closure conversion of class {}", class.name);
        let mut pass = ClosureConversion {
            analysis: &mut *analysis,
            class: index,
            scope: None,
        };
        if let Err(never) = pass.visit_class(&unit.arena, class) {
            match never {}
        }
    }
}

struct ClosureConversion<'a> {
    analysis: &'a mut Analysis,
    class: usize,
    scope: Option<ScopeId>,
}

impl ClosureConversion<'_> {
    fn enter<'ast>(&mut self, arena: &'ast AstArena, scope: ScopeId, body: &'ast [ExprId]) {
        for var in self.analysis.scopes.promote_written_remotely(scope) {
            debug!("promoted `{}` to a heapvar of {}", self.analysis.scopes.var(var).name, scope);
        }
        let saved = self.scope.replace(scope);
        for stmt in body {
            if let Err(never) = self.visit_expr(arena, *stmt) {
                match never {}
            }
        }
        self.scope = saved;
    }

    fn enter_method<'ast>(
        &mut self,
        arena: &'ast AstArena,
        method: &'ast MethodDecl,
        scope: ScopeId,
    ) {
        self.scope = None;
        self.enter(arena, scope, &method.body);
    }

    /// Scopes from the current one outwards, stopping before `end`.
    fn chain_until(&self, end: ScopeId) -> Vec<ScopeId> {
        match self.scope {
            Some(scope) => self
                .analysis
                .scopes
                .chain(scope)
                .take_while(|s| *s != end)
                .collect(),
            None => Vec::new(),
        }
    }

    fn true_blocks_until(&self, end: ScopeId) -> Vec<ScopeId> {
        self.chain_until(end)
            .into_iter()
            .filter(|s| self.analysis.scopes.scope(*s).is_true_block())
            .collect()
    }

    fn capture(&mut self, var: VarId) {
        let real = self.analysis.scopes.real_var(var);
        let v = self.analysis.scopes.var(real);
        let declaring = v.scope;
        match (v.kind, v.remote_access) {
            (VarKind::Heapvar, _) => {
                for block in self.true_blocks_until(declaring) {
                    self.analysis.scopes.add_using_heapvars_from(block, declaring);
                }
            }
            (VarKind::Argument | VarKind::Local, RemoteAccess::ReadRemotely) => {
                for block in self.true_blocks_until(declaring) {
                    self.analysis.scopes.add_copying_var(block, real);
                }
            }
            _ => {}
        }
    }
}

impl<'ast> Visitor<'ast> for ClosureConversion<'_> {
    type Error = Infallible;

    fn visit_class(
        &mut self,
        arena: &'ast AstArena,
        class: &'ast ClassDecl,
    ) -> Result<(), Infallible> {
        let info = &self.analysis.classes[self.class];
        let scopes: Vec<ScopeId> = info
            .instance_methods
            .iter()
            .chain(info.class_methods.iter())
            .copied()
            .collect();
        for (method, scope) in class.methods().zip(scopes) {
            self.enter_method(arena, method, scope);
        }
        Ok(())
    }

    fn visit_block(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Infallible> {
        let (Some(scope), ExprKind::Block { body, .. }) =
            (self.analysis.block_scopes.get(&id).copied(), arena.kind(id))
        else {
            return Ok(());
        };
        self.enter(arena, scope, body);
        Ok(())
    }

    fn visit_ident(
        &mut self,
        _arena: &'ast AstArena,
        id: ExprId,
        _name: &'ast str,
    ) -> Result<(), Infallible> {
        if let Some(var) = self.analysis.bindings.get(&id).copied() {
            self.capture(var);
        }
        Ok(())
    }

    fn visit_return(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Infallible> {
        if let Some(scope) = self.scope {
            let method = self.analysis.scopes.method_of(scope);
            let crosses_block = method.is_some_and(|m| !self.true_blocks_until(m).is_empty());
            let kind = if crosses_block {
                ReturnKind::NonLocal
            } else {
                ReturnKind::Local
            };
            self.analysis.returns.insert(id, kind);

            if let (ReturnKind::NonLocal, Some(method)) = (kind, method) {
                if let Some(code) = self.analysis.scopes.code_mut(method) {
                    if !code.needs_heap_context {
                        debug!(
                            "non-local return at {}: {} needs a heap context",
                            arena.span(id),
                            method
                        );
                    }
                    code.needs_heap_context = true;
                }
            }
        }
        walk_return(self, arena, id)
    }
}
