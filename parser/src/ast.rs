//! Abstract syntax tree for class definitions.
//!
//! Expressions are allocated in an [`AstArena`] and referred to by
//! [`ExprId`] handles, so later passes can attach side tables keyed by
//! node identity without touching the tree itself. Declarations
//! (classes, methods, variables) are plain owned structs.
//!
//! # Message tiers
//!
//! Unary, binary and keyword sends all become [`ExprKind::Send`]; the
//! tier only matters to the parser. A cascade keeps its receiver once and
//! lists each message as a `Send` whose receiver is that shared node.
use std::fmt::Write as _;

use crate::span::Span;

/// Handle to an expression node in an [`AstArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub span: Span,
}

/// The different forms an expression can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Character(char),
    Nil,
    True,
    False,

    /// A name reference, including `self` and `super`.
    Ident(String),

    /// `target := value`. The target is always an [`ExprKind::Ident`].
    Assign { target: ExprId, value: ExprId },

    /// Any message send. `selector` is the full selector (`at:put:`, `+`).
    Send {
        receiver: ExprId,
        selector: String,
        args: Vec<ExprId>,
    },

    /// `receiver m1; m2; m3`. Every message is a `Send` on `receiver`.
    Cascade {
        receiver: ExprId,
        messages: Vec<ExprId>,
    },

    /// `[:p1 :p2 | | t1 t2 | statements]`
    Block {
        params: Vec<VarDecl>,
        temps: Vec<VarDecl>,
        body: Vec<ExprId>,
    },

    Paren(ExprId),

    /// `#(e1. e2)`, an array built from each element's value.
    Array(Vec<ExprId>),

    /// `^ value`, only ever found in statement position.
    Return(ExprId),
}

/// Owns every expression node of a compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AstArena {
    nodes: Vec<ExprNode>,
}

impl AstArena {
    pub fn alloc(&mut self, node: ExprNode) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.get(id).kind
    }

    pub fn span(&self, id: ExprId) -> Span {
        self.get(id).span
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &ExprNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ExprId(i as u32), node))
    }
}

// ── Declarations ────────────────────────────────────────────────────

/// A declared name: parameter, temporary, instance or class variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub span: Span,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub is_class_method: bool,
    pub selector: String,
    pub params: Vec<VarDecl>,
    pub temps: Vec<VarDecl>,
    pub body: Vec<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    /// `None` when the superclass is written as `nil`.
    pub super_name: Option<String>,
    pub super_span: Span,
    pub instance_vars: Vec<VarDecl>,
    pub class_vars: Vec<VarDecl>,
    pub instance_methods: Vec<MethodDecl>,
    pub class_methods: Vec<MethodDecl>,
    pub span: Span,
}

impl ClassDecl {
    /// Instance methods first, then class methods.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.instance_methods.iter().chain(self.class_methods.iter())
    }
}

/// The parser's output: every class of one source text plus the arena
/// their method bodies live in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilationUnit {
    pub arena: AstArena,
    pub classes: Vec<ClassDecl>,
}

// ── Graphviz dump ───────────────────────────────────────────────────

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn expr_label(kind: &ExprKind) -> String {
    match kind {
        ExprKind::Integer(v) => v.to_string(),
        ExprKind::Float(v) => v.to_string(),
        ExprKind::String(s) => format!("{:?}", s),
        ExprKind::Symbol(s) => format!("#{}", s),
        ExprKind::Character(c) => format!("${}", c),
        ExprKind::Nil => "nil".into(),
        ExprKind::True => "true".into(),
        ExprKind::False => "false".into(),
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Assign { .. } => ":=".into(),
        ExprKind::Send { selector, .. } => format!("send {}", selector),
        ExprKind::Cascade { .. } => "cascade".into(),
        ExprKind::Block { params, temps, .. } => {
            let names = |decls: &[VarDecl]| {
                decls
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            format!("block [{}] | {} |", names(params), names(temps))
        }
        ExprKind::Paren(_) => "( )".into(),
        ExprKind::Array(elements) => format!("#( ) [{}]", elements.len()),
        ExprKind::Return(_) => "^".into(),
    }
}

fn expr_children(kind: &ExprKind) -> Vec<ExprId> {
    match kind {
        ExprKind::Assign { target, value } => vec![*target, *value],
        ExprKind::Send { receiver, args, .. } => {
            std::iter::once(*receiver).chain(args.iter().copied()).collect()
        }
        ExprKind::Cascade { receiver, messages } => {
            std::iter::once(*receiver).chain(messages.iter().copied()).collect()
        }
        ExprKind::Block { body, .. } => body.clone(),
        ExprKind::Array(elements) => elements.clone(),
        ExprKind::Paren(inner) | ExprKind::Return(inner) => vec![*inner],
        _ => Vec::new(),
    }
}

impl CompilationUnit {
    /// Render the unit as a Graphviz `digraph`.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph ast {\n  node [shape=box];\n");
        let mut emitted = vec![false; self.arena.len()];

        for (ci, class) in self.classes.iter().enumerate() {
            let super_name = class.super_name.as_deref().unwrap_or("nil");
            let _ = writeln!(
                out,
                "  c{} [label=\"class {} : {}\"];",
                ci,
                escape_label(&class.name),
                escape_label(super_name)
            );
            for (mi, method) in class.methods().enumerate() {
                let prefix = if method.is_class_method { "class " } else { "" };
                let _ = writeln!(
                    out,
                    "  c{}m{} [label=\"{}{}\"];\n  c{} -> c{}m{};",
                    ci,
                    mi,
                    prefix,
                    escape_label(&method.selector),
                    ci,
                    ci,
                    mi
                );
                for stmt in &method.body {
                    let _ = writeln!(out, "  c{}m{} -> {};", ci, mi, stmt);
                    self.dot_expr(*stmt, &mut emitted, &mut out);
                }
            }
        }

        out.push_str("}\n");
        out
    }

    fn dot_expr(&self, id: ExprId, emitted: &mut [bool], out: &mut String) {
        if emitted[id.index()] {
            return;
        }
        emitted[id.index()] = true;
        let kind = self.arena.kind(id);
        let _ = writeln!(out, "  {} [label=\"{}\"];", id, escape_label(&expr_label(kind)));
        for child in expr_children(kind) {
            let _ = writeln!(out, "  {} -> {};", id, child);
            self.dot_expr(child, emitted, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Pos;

    fn node(kind: ExprKind) -> ExprNode {
        ExprNode {
            kind,
            span: Span::point(Pos::origin()),
        }
    }

    #[test]
    fn arena_hands_out_sequential_ids() {
        let mut arena = AstArena::default();
        let a = arena.alloc(node(ExprKind::Nil));
        let b = arena.alloc(node(ExprKind::Integer(3)));
        assert_eq!(a, ExprId(0));
        assert_eq!(b, ExprId(1));
        assert_eq!(arena.kind(b), &ExprKind::Integer(3));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn arena_get_mut_updates_in_place() {
        let mut arena = AstArena::default();
        let a = arena.alloc(node(ExprKind::Nil));
        arena.get_mut(a).kind = ExprKind::True;
        assert_eq!(arena.kind(a), &ExprKind::True);
    }

    #[test]
    fn dot_output_lists_classes_methods_and_nodes() {
        let mut arena = AstArena::default();
        let recv = arena.alloc(node(ExprKind::Ident("self".into())));
        let send = arena.alloc(node(ExprKind::Send {
            receiver: recv,
            selector: "foo".into(),
            args: vec![],
        }));
        let ret = arena.alloc(node(ExprKind::Return(send)));
        let span = Span::default();
        let unit = CompilationUnit {
            arena,
            classes: vec![ClassDecl {
                name: "A".into(),
                super_name: None,
                super_span: span,
                instance_vars: vec![],
                class_vars: vec![],
                instance_methods: vec![MethodDecl {
                    is_class_method: false,
                    selector: "bar".into(),
                    params: vec![],
                    temps: vec![],
                    body: vec![ret],
                    span,
                }],
                class_methods: vec![],
                span,
            }],
        };

        let dot = unit.to_dot();
        assert!(dot.starts_with("digraph ast {"));
        assert!(dot.contains("c0 [label=\"class A : nil\"];"));
        assert!(dot.contains("c0m0 -> e2;"));
        assert!(dot.contains("e1 [label=\"send foo\"];"));
        assert!(dot.contains("e1 -> e0;"));
    }
}
