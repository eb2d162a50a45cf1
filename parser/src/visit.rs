//! Fallible AST visitor.
//!
//! Every `visit_*` method has a default that calls the corresponding
//! `walk_*` free function, which recurses into child nodes. Override a
//! method to intercept a node; call `walk_*` from the override to keep
//! descending. The first `Err` stops the traversal.
use crate::ast::{AstArena, ClassDecl, CompilationUnit, ExprId, ExprKind, MethodDecl, VarDecl};

pub trait Visitor<'ast> {
    type Error;

    fn visit_unit(&mut self, unit: &'ast CompilationUnit) -> Result<(), Self::Error> {
        walk_unit(self, unit)
    }

    fn visit_class(
        &mut self,
        arena: &'ast AstArena,
        class: &'ast ClassDecl,
    ) -> Result<(), Self::Error> {
        walk_class(self, arena, class)
    }

    fn visit_method(
        &mut self,
        arena: &'ast AstArena,
        method: &'ast MethodDecl,
    ) -> Result<(), Self::Error> {
        walk_method(self, arena, method)
    }

    fn visit_var_decl(&mut self, _decl: &'ast VarDecl) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_expr(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Self::Error> {
        walk_expr(self, arena, id)
    }

    fn visit_block(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Self::Error> {
        walk_block(self, arena, id)
    }

    /// A block literal compiled in place by its enclosing activation.
    /// Nothing in the tree marks these; visitors that know the inlining
    /// decisions call this instead of [`Visitor::visit_block`].
    fn visit_inlined_block(
        &mut self,
        arena: &'ast AstArena,
        id: ExprId,
    ) -> Result<(), Self::Error> {
        self.visit_block(arena, id)
    }

    fn visit_send(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Self::Error> {
        walk_send(self, arena, id)
    }

    fn visit_cascade(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Self::Error> {
        walk_cascade(self, arena, id)
    }

    fn visit_assign(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Self::Error> {
        walk_assign(self, arena, id)
    }

    fn visit_return(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Self::Error> {
        walk_return(self, arena, id)
    }

    fn visit_ident(
        &mut self,
        _arena: &'ast AstArena,
        _id: ExprId,
        _name: &'ast str,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// walk_* free functions
// ---------------------------------------------------------------------------

pub fn walk_unit<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    unit: &'ast CompilationUnit,
) -> Result<(), V::Error> {
    for class in &unit.classes {
        visitor.visit_class(&unit.arena, class)?;
    }
    Ok(())
}

pub fn walk_class<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    class: &'ast ClassDecl,
) -> Result<(), V::Error> {
    for method in class.methods() {
        visitor.visit_method(arena, method)?;
    }
    Ok(())
}

pub fn walk_method<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    method: &'ast MethodDecl,
) -> Result<(), V::Error> {
    for decl in method.params.iter().chain(method.temps.iter()) {
        visitor.visit_var_decl(decl)?;
    }
    for stmt in &method.body {
        visitor.visit_expr(arena, *stmt)?;
    }
    Ok(())
}

pub fn walk_expr<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    id: ExprId,
) -> Result<(), V::Error> {
    match arena.kind(id) {
        ExprKind::Integer(_)
        | ExprKind::Float(_)
        | ExprKind::String(_)
        | ExprKind::Symbol(_)
        | ExprKind::Character(_)
        | ExprKind::Nil
        | ExprKind::True
        | ExprKind::False => Ok(()),
        ExprKind::Ident(name) => visitor.visit_ident(arena, id, name),
        ExprKind::Assign { .. } => visitor.visit_assign(arena, id),
        ExprKind::Send { .. } => visitor.visit_send(arena, id),
        ExprKind::Cascade { .. } => visitor.visit_cascade(arena, id),
        ExprKind::Block { .. } => visitor.visit_block(arena, id),
        ExprKind::Paren(inner) => visitor.visit_expr(arena, *inner),
        ExprKind::Array(elements) => {
            for element in elements {
                visitor.visit_expr(arena, *element)?;
            }
            Ok(())
        }
        ExprKind::Return(_) => visitor.visit_return(arena, id),
    }
}

pub fn walk_block<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    id: ExprId,
) -> Result<(), V::Error> {
    if let ExprKind::Block {
        params,
        temps,
        body,
    } = arena.kind(id)
    {
        for decl in params.iter().chain(temps.iter()) {
            visitor.visit_var_decl(decl)?;
        }
        for stmt in body {
            visitor.visit_expr(arena, *stmt)?;
        }
    }
    Ok(())
}

pub fn walk_send<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    id: ExprId,
) -> Result<(), V::Error> {
    if let ExprKind::Send { receiver, args, .. } = arena.kind(id) {
        visitor.visit_expr(arena, *receiver)?;
        for arg in args {
            visitor.visit_expr(arena, *arg)?;
        }
    }
    Ok(())
}

/// The shared receiver is visited once, then each message's arguments.
pub fn walk_cascade<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    id: ExprId,
) -> Result<(), V::Error> {
    if let ExprKind::Cascade { receiver, messages } = arena.kind(id) {
        visitor.visit_expr(arena, *receiver)?;
        for message in messages {
            if let ExprKind::Send { args, .. } = arena.kind(*message) {
                for arg in args {
                    visitor.visit_expr(arena, *arg)?;
                }
            }
        }
    }
    Ok(())
}

pub fn walk_assign<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    id: ExprId,
) -> Result<(), V::Error> {
    if let ExprKind::Assign { target, value } = arena.kind(id) {
        visitor.visit_expr(arena, *target)?;
        visitor.visit_expr(arena, *value)?;
    }
    Ok(())
}

pub fn walk_return<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    arena: &'ast AstArena,
    id: ExprId,
) -> Result<(), V::Error> {
    if let ExprKind::Return(value) = arena.kind(id) {
        visitor.visit_expr(arena, *value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    /// Records identifiers in visiting order.
    #[derive(Default)]
    struct NameCollector {
        names: Vec<String>,
        blocks: usize,
    }

    impl<'ast> Visitor<'ast> for NameCollector {
        type Error = ();

        fn visit_ident(
            &mut self,
            _arena: &'ast AstArena,
            _id: ExprId,
            name: &'ast str,
        ) -> Result<(), ()> {
            self.names.push(name.to_string());
            Ok(())
        }

        fn visit_block(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), ()> {
            self.blocks += 1;
            walk_block(self, arena, id)
        }
    }

    fn collect(src: &str) -> NameCollector {
        let unit = parse_source(src).expect("parse failed");
        let mut collector = NameCollector::default();
        collector.visit_unit(&unit).expect("visit failed");
        collector
    }

    #[test]
    fn walks_send_receiver_before_arguments() {
        let c = collect("A : nil [ m [ a at: b put: c ] ]");
        assert_eq!(c.names, vec!["a", "b", "c"]);
    }

    #[test]
    fn walks_assignment_target_then_value() {
        let c = collect("A : nil [ m [ | x | x := y ] ]");
        assert_eq!(c.names, vec!["x", "y"]);
    }

    #[test]
    fn cascade_receiver_visited_once() {
        let c = collect("A : nil [ m [ r foo: a; bar: b; baz ] ]");
        assert_eq!(c.names, vec!["r", "a", "b"]);
    }

    #[test]
    fn instance_methods_walk_before_class_methods() {
        let c = collect("A : nil [ class k [ ^ b ] i [ ^ a ] ]");
        assert_eq!(c.names, vec!["a", "b"]);
    }

    #[test]
    fn blocks_and_parens_are_entered() {
        let c = collect("A : nil [ m [ [:x | (x + y)] value: 1 ] ]");
        assert_eq!(c.blocks, 1);
        assert_eq!(c.names, vec!["x", "y"]);
    }

    #[test]
    fn array_elements_are_walked_in_order() {
        let c = collect("A : nil [ m [ ^ #(a. [ b ]. c d) ] ]");
        assert_eq!(c.blocks, 1);
        assert_eq!(c.names, vec!["a", "b", "c"]);
    }

    #[test]
    fn inlined_block_defaults_to_block() {
        struct Inliner {
            blocks: usize,
        }
        impl<'ast> Visitor<'ast> for Inliner {
            type Error = ();
            fn visit_block(&mut self, _arena: &'ast AstArena, _id: ExprId) -> Result<(), ()> {
                self.blocks += 1;
                Ok(())
            }
        }
        let unit = parse_source("A : nil [ m [ [ 1 ] ] ]").expect("parse failed");
        let mut v = Inliner { blocks: 0 };
        let ret = unit.classes[0].instance_methods[0].body[0];
        v.visit_inlined_block(&unit.arena, ret).expect("visit failed");
        assert_eq!(v.blocks, 1);
    }

    #[test]
    fn error_stops_the_walk() {
        struct FailOnB {
            seen: Vec<String>,
        }
        impl<'ast> Visitor<'ast> for FailOnB {
            type Error = String;
            fn visit_ident(
                &mut self,
                _arena: &'ast AstArena,
                _id: ExprId,
                name: &'ast str,
            ) -> Result<(), String> {
                self.seen.push(name.to_string());
                if name == "b" {
                    Err(name.to_string())
                } else {
                    Ok(())
                }
            }
        }
        let unit = parse_source("A : nil [ m [ a. b. c ] ]").expect("parse failed");
        let mut v = FailOnB { seen: vec![] };
        assert_eq!(v.visit_unit(&unit), Err("b".to_string()));
        assert_eq!(v.seen, vec!["a", "b"]);
    }
}
