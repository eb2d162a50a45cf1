//! First pass: build method and block scopes, resolve every name and
//! classify how each variable is reached across block boundaries.
use log::{debug, trace};
use parser::visit::{walk_cascade, walk_send};
use parser::{AstArena, ClassDecl, CompilationUnit, ExprId, ExprKind, MethodDecl, VarDecl, Visitor};

use crate::error::{AnalysisError, AnalysisErrorKind};
use crate::intrinsic::{SendShape, classify};
use crate::scope::{CodeScope, ScopeId, ScopeKind};
use crate::variable::VarKind;
use crate::Analysis;

/// Run the pass over every class of the unit.
pub fn run(unit: &CompilationUnit, analysis: &mut Analysis) -> Result<(), AnalysisError> {
    for (index, class) in unit.classes.iter().enumerate() {
        debug!("resolving names in class {}", class.name);
        let mut pass = RemoteAccessPass {
            analysis: &mut *analysis,
            class: index,
            scope: None,
        };
        pass.visit_class(&unit.arena, class)?;
    }
    Ok(())
}

struct RemoteAccessPass<'a> {
    analysis: &'a mut Analysis,
    class: usize,
    /// The innermost code scope being visited.
    scope: Option<ScopeId>,
}

impl RemoteAccessPass<'_> {
    fn current(&self) -> ScopeId {
        self.scope.unwrap_or(self.analysis.classes[self.class].instance_scope)
    }

    /// Declare `params` and `temps` in `scope`, then visit `body` inside it.
    fn enter<'ast>(
        &mut self,
        arena: &'ast AstArena,
        scope: ScopeId,
        params: &'ast [VarDecl],
        temps: &'ast [VarDecl],
        body: &'ast [ExprId],
    ) -> Result<(), AnalysisError> {
        let saved = self.scope.replace(scope);
        for decl in params {
            self.analysis.scopes.add_argument(scope, decl)?;
        }
        for decl in temps {
            self.analysis.scopes.add_local(scope, decl)?;
        }
        for stmt in body {
            self.visit_expr(arena, *stmt)?;
        }
        self.scope = saved;
        Ok(())
    }

    fn enter_block<'ast>(
        &mut self,
        arena: &'ast AstArena,
        id: ExprId,
        kind: fn(CodeScope) -> ScopeKind,
    ) -> Result<(), AnalysisError> {
        let ExprKind::Block {
            params,
            temps,
            body,
        } = arena.kind(id)
        else {
            return self.visit_expr(arena, id);
        };
        let outer = self.current();
        let scope = self
            .analysis
            .scopes
            .add_scope(Some(outer), kind(CodeScope::default()));
        self.analysis.block_scopes.insert(id, scope);
        self.enter(arena, scope, params, temps, body)
    }
}

impl<'ast> Visitor<'ast> for RemoteAccessPass<'_> {
    type Error = AnalysisError;

    fn visit_class(
        &mut self,
        arena: &'ast AstArena,
        class: &'ast ClassDecl,
    ) -> Result<(), AnalysisError> {
        for method in class.methods() {
            self.visit_method(arena, method)?;
        }
        Ok(())
    }

    fn visit_method(
        &mut self,
        arena: &'ast AstArena,
        method: &'ast MethodDecl,
    ) -> Result<(), AnalysisError> {
        let info = &self.analysis.classes[self.class];
        let side = if method.is_class_method {
            info.class_scope
        } else {
            info.instance_scope
        };
        debug!("method {}>>{}", info.name, method.selector);

        let scope = self
            .analysis
            .scopes
            .add_scope(Some(side), ScopeKind::Method(CodeScope::default()));
        let info = &mut self.analysis.classes[self.class];
        if method.is_class_method {
            info.class_methods.push(scope);
        } else {
            info.instance_methods.push(scope);
        }

        self.scope = None;
        self.enter(arena, scope, &method.params, &method.temps, &method.body)
    }

    fn visit_block(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), AnalysisError> {
        self.enter_block(arena, id, ScopeKind::Block)
    }

    fn visit_inlined_block(
        &mut self,
        arena: &'ast AstArena,
        id: ExprId,
    ) -> Result<(), AnalysisError> {
        self.enter_block(arena, id, ScopeKind::OptimisedBlock)
    }

    fn visit_send(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), AnalysisError> {
        let shape = classify(arena, id).unwrap_or(SendShape::Plain);
        self.analysis.sends.insert(id, shape);

        let (SendShape::Inlined(intrinsic), ExprKind::Send { receiver, args, .. }) =
            (shape, arena.kind(id))
        else {
            return walk_send(self, arena, id);
        };

        trace!("inlining {} at {}", intrinsic.selector(), arena.span(id));
        self.visit_expr(arena, *receiver)?;
        for (position, arg) in args.iter().enumerate() {
            if intrinsic.inlined_args().contains(&position) {
                self.visit_inlined_block(arena, *arg)?;
            } else {
                self.visit_expr(arena, *arg)?;
            }
        }
        Ok(())
    }

    fn visit_cascade(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), AnalysisError> {
        if let ExprKind::Cascade { messages, .. } = arena.kind(id) {
            for message in messages {
                self.analysis.sends.insert(*message, SendShape::Plain);
            }
        }
        walk_cascade(self, arena, id)
    }

    fn visit_assign(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), AnalysisError> {
        let ExprKind::Assign { target, value } = arena.kind(id) else {
            return Ok(());
        };
        let ExprKind::Ident(name) = arena.kind(*target) else {
            return self.visit_expr(arena, *value);
        };
        let span = arena.span(*target);

        let scope = self.current();
        let var_id = self
            .analysis
            .scopes
            .lookup(scope, name, true, false)
            .map_err(|e| e.at(span))?;
        let var = self.analysis.scopes.var(var_id);
        if !var.is_writable() {
            let kind = match var.kind {
                VarKind::InlinedBlockLocal => var.declared_as,
                kind => kind,
            };
            return Err(AnalysisError::new(AnalysisErrorKind::InvalidAssignment {
                name: name.clone(),
                kind,
            })
            .at(span));
        }
        self.analysis.bindings.insert(*target, var_id);

        self.visit_expr(arena, *value)
    }

    fn visit_ident(
        &mut self,
        arena: &'ast AstArena,
        id: ExprId,
        name: &'ast str,
    ) -> Result<(), AnalysisError> {
        let scope = self.current();
        let var = self
            .analysis
            .scopes
            .lookup(scope, name, false, false)
            .map_err(|e| e.at(arena.span(id)))?;
        self.analysis.bindings.insert(id, var);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar;
    use crate::variable::RemoteAccess;
    use parser::parse_source;

    fn first_pass(src: &str) -> Result<(CompilationUnit, Analysis), AnalysisError> {
        let unit = parse_source(src).expect("parse failed");
        let mut analysis = registrar::register(&unit)?;
        registrar::link(&unit, &mut analysis)?;
        run(&unit, &mut analysis)?;
        Ok((unit, analysis))
    }

    fn method_var(a: &Analysis, name: &str) -> crate::variable::VarId {
        a.scopes
            .vars()
            .find(|(_, v)| v.name == name && matches!(v.kind, VarKind::Local | VarKind::Argument))
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no variable {}", name))
    }

    #[test]
    fn read_inside_block_is_read_remotely() {
        let (_, a) = first_pass("A : nil [ m [ | x | [ x ] ] ]").unwrap();
        assert_eq!(a.scopes.var(method_var(&a, "x")).remote_access, RemoteAccess::ReadRemotely);
    }

    #[test]
    fn write_inside_block_is_written_remotely() {
        let (_, a) = first_pass("A : nil [ m [ | x | [ x := 1 ] ] ]").unwrap();
        assert_eq!(a.scopes.var(method_var(&a, "x")).remote_access, RemoteAccess::WrittenRemotely);
    }

    #[test]
    fn use_after_block_definition_still_counts() {
        let (_, a) = first_pass("A : nil [ m [ | x b | b := [ x ]. x := 2. ^ b ] ]").unwrap();
        assert_eq!(a.scopes.var(method_var(&a, "x")).remote_access, RemoteAccess::ReadRemotely);
    }

    #[test]
    fn inlined_blocks_are_not_remote() {
        let (_, a) =
            first_pass("A : nil [ m: c [ | x | c ifTrue: [ x := 1 ] ifFalse: [ x ] ] ]").unwrap();
        assert_eq!(a.scopes.var(method_var(&a, "x")).remote_access, RemoteAccess::None);
        let kinds: Vec<_> = a
            .block_scopes
            .values()
            .map(|s| a.scopes.scope(*s).kind_name())
            .collect();
        assert_eq!(kinds, vec!["optimised block", "optimised block"]);
    }

    #[test]
    fn true_block_inside_inlined_block_is_remote() {
        let (_, a) =
            first_pass("A : nil [ m: c [ | x | c ifTrue: [ [ x ] ] ifFalse: [ nil ] ] ]").unwrap();
        assert_eq!(a.scopes.var(method_var(&a, "x")).remote_access, RemoteAccess::ReadRemotely);
    }

    #[test]
    fn every_identifier_is_bound() {
        let (unit, a) =
            first_pass("A : nil [ | iv | m: p [ | t | t := p + iv. ^ self foo: t ] ]").unwrap();
        for (id, node) in unit.arena.iter() {
            if let ExprKind::Ident(_) = node.kind {
                assert!(a.bindings.contains_key(&id), "unbound identifier {}", id);
            }
        }
    }

    #[test]
    fn sends_get_shapes_and_cascades_stay_plain() {
        let (_, a) =
            first_pass("A : nil [ m: c [ c foo. c ifTrue: [ 1 ] ifFalse: [ 2 ]; bar ] ]").unwrap();
        assert!(a.sends.values().all(|s| *s == SendShape::Plain));
        assert_eq!(a.sends.len(), 3);
        assert!(a.block_scopes.values().all(|s| a.scopes.scope(*s).is_true_block()));
    }

    #[test]
    fn undeclared_name_is_reported_with_span() {
        let err = first_pass("A : nil [ m [ ^ y ] ]").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::UndeclaredName("y".into()));
        assert_eq!(err.span.map(|s| s.start.column), Some(17));
    }

    #[test]
    fn undeclared_assignment_target() {
        let err = first_pass("A : nil [ m [ y := 1 ] ]").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::UndeclaredName("y".into()));
    }

    #[test]
    fn arguments_cannot_be_assigned() {
        let err = first_pass("A : nil [ m: a [ a := 1 ] ]").unwrap_err();
        assert_eq!(
            err.kind,
            AnalysisErrorKind::InvalidAssignment {
                name: "a".into(),
                kind: VarKind::Argument
            }
        );
    }

    #[test]
    fn self_class_names_and_loop_counters_cannot_be_assigned() {
        let err = first_pass("A : nil [ m [ self := 1 ] ]").unwrap_err();
        assert!(matches!(
            err.kind,
            AnalysisErrorKind::InvalidAssignment { kind: VarKind::SelfRef, .. }
        ));

        let err = first_pass("A : nil [ m [ A := 1 ] ]").unwrap_err();
        assert!(matches!(
            err.kind,
            AnalysisErrorKind::InvalidAssignment { kind: VarKind::NamespaceMember, .. }
        ));

        let err = first_pass("A : nil [ m [ 1 to: 3 do: [:i | i := 2 ] ] ]").unwrap_err();
        assert_eq!(
            err.kind,
            AnalysisErrorKind::InvalidAssignment {
                name: "i".into(),
                kind: VarKind::Argument
            }
        );
    }

    #[test]
    fn instance_and_inlined_temporaries_are_writable() {
        let src = "A : nil [ | iv | m [ iv := 1. 1 to: 3 do: [:i | | t | t := i ] ] ]";
        assert!(first_pass(src).is_ok());
    }

    #[test]
    fn class_methods_see_class_side_variables_only() {
        assert!(first_pass("A : nil [ | iv | class | cv | class m [ ^ cv ] ]").is_ok());
        let err = first_pass("A : nil [ | iv | class | cv | class m [ ^ iv ] ]").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::UndeclaredName("iv".into()));
    }

    #[test]
    fn method_scopes_recorded_per_side() {
        let (_, a) = first_pass("A : nil [ i [ ] class c [ ] j [ ] ]").unwrap();
        assert_eq!(a.classes[0].instance_methods.len(), 2);
        assert_eq!(a.classes[0].class_methods.len(), 1);
        let c = a.classes[0].class_methods[0];
        assert_eq!(a.scopes.scope(c).outer, Some(a.classes[0].class_scope));
    }

    #[test]
    fn duplicate_block_parameter() {
        let err = first_pass("A : nil [ m [ [:a :a | a ] ] ]").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::DuplicateDeclaration("a".into()));
    }
}
