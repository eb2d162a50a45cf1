//! What a code generator needs from the analysis, with names attached.
//!
//! Methods are named `_i_<Class>__<selector>` (instance side) or
//! `_c_<Class>__<selector>` (class side) with every `:` of the selector
//! replaced by `_`. A true block is named after its method's entry point
//! plus the `M`/`B` path from the method down to the block and its
//! position among the method's blocks. Inlined blocks have no frame of
//! their own. A scope's heapvar record is named `<scope name>_heapvars`.
use std::collections::HashMap;
use std::convert::Infallible;

use parser::visit::{walk_block, walk_cascade, walk_send};
use parser::{AstArena, CompilationUnit, ExprId, ExprKind, MethodDecl, Visitor};

use crate::scope::{ScopeId, ScopeKind};
use crate::variable::VarId;
use crate::Analysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Method,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub scope: ScopeId,
    pub name: String,
    pub kind: FrameKind,
    pub needs_heap_context: bool,
    /// Stack-resident arguments.
    pub arguments: Vec<String>,
    /// Stack-resident locals, including slots of inlined block locals.
    pub locals: Vec<String>,
    pub heapvars: Vec<String>,
    /// Name of this frame's heapvar record, if it has heapvars.
    pub heapvars_name: Option<String>,
    /// Heapvar records handed to this frame at creation.
    pub using_heapvars_from: Vec<String>,
    /// Captured values, qualified by their declaring frame's name.
    pub copying_vars: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    pub selector: String,
    pub entry_point: String,
}

/// Everything the runtime needs to link a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    pub super_name: Option<String>,
    pub instance_size: usize,
    pub class_size: usize,
    pub instance_methods: Vec<MethodEntry>,
    pub class_methods: Vec<MethodEntry>,
    /// Distinct selectors of dispatched sends, in first-use order.
    pub symbol_references: Vec<String>,
    /// Every method and true-block frame of the class.
    pub frames: Vec<FrameLayout>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub classes: Vec<ClassDescriptor>,
}

pub fn entry_point(class: &str, method: &MethodDecl) -> String {
    let side = if method.is_class_method { "_c_" } else { "_i_" };
    format!("{}{}__{}", side, class, method.selector.replace(':', "_"))
}

impl Layout {
    pub fn build(unit: &CompilationUnit, analysis: &Analysis) -> Layout {
        let classes = unit
            .classes
            .iter()
            .zip(&analysis.classes)
            .map(|(decl, info)| {
                let mut instance_methods = Vec::new();
                let mut class_methods = Vec::new();
                let mut symbol_references: Vec<String> = Vec::new();
                let mut frames = Vec::new();

                let scopes = info.instance_methods.iter().chain(info.class_methods.iter());
                for (method, scope) in decl.methods().zip(scopes) {
                    let entry = entry_point(&decl.name, method);
                    let table = if method.is_class_method {
                        &mut class_methods
                    } else {
                        &mut instance_methods
                    };
                    table.push(MethodEntry {
                        selector: method.selector.clone(),
                        entry_point: entry.clone(),
                    });

                    let mut walker = FrameWalker {
                        analysis,
                        blocks: Vec::new(),
                        selectors: Vec::new(),
                    };
                    for stmt in &method.body {
                        if let Err(never) = walker.visit_expr(&unit.arena, *stmt) {
                            match never {}
                        }
                    }
                    for selector in walker.selectors {
                        if !symbol_references.contains(&selector) {
                            symbol_references.push(selector);
                        }
                    }

                    let mut names = HashMap::new();
                    names.insert(*scope, entry.clone());
                    for (ordinal, block) in walker.blocks.iter().enumerate() {
                        let path = scope_path(analysis, *block);
                        names.insert(*block, format!("{}_{}{}", entry, path, ordinal));
                    }
                    frames.push(frame(analysis, *scope, &names));
                    for block in &walker.blocks {
                        frames.push(frame(analysis, *block, &names));
                    }
                }

                ClassDescriptor {
                    name: decl.name.clone(),
                    super_name: info.super_class.map(|s| analysis.classes[s].name.clone()),
                    instance_size: info.instance_vars.len(),
                    class_size: info.class_vars.len(),
                    instance_methods,
                    class_methods,
                    symbol_references,
                    frames,
                }
            })
            .collect();
        Layout { classes }
    }
}

/// `M` and `B` letters from the method down to `scope`.
fn scope_path(analysis: &Analysis, scope: ScopeId) -> String {
    let mut letters: Vec<char> = analysis
        .scopes
        .chain(scope)
        .filter_map(|s| match analysis.scopes.scope(s).kind {
            ScopeKind::Method(_) => Some('M'),
            ScopeKind::Block(_) => Some('B'),
            _ => None,
        })
        .collect();
    letters.reverse();
    letters.into_iter().collect()
}

fn frame(analysis: &Analysis, scope: ScopeId, names: &HashMap<ScopeId, String>) -> FrameLayout {
    let s = analysis.scopes.scope(scope);
    let kind = if s.is_method() {
        FrameKind::Method
    } else {
        FrameKind::Block
    };
    let name = names.get(&scope).cloned().unwrap_or_else(|| scope.to_string());
    let scope_name = |id: &ScopeId| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    let var_names = |vars: &[VarId]| -> Vec<String> {
        vars.iter().map(|v| analysis.scopes.var(*v).name.clone()).collect()
    };

    let Some(code) = s.code() else {
        return FrameLayout {
            scope,
            name,
            kind,
            needs_heap_context: false,
            arguments: Vec::new(),
            locals: Vec::new(),
            heapvars: Vec::new(),
            heapvars_name: None,
            using_heapvars_from: Vec::new(),
            copying_vars: Vec::new(),
        };
    };

    let heapvars = var_names(&code.heapvars);
    let heapvars_name = (!heapvars.is_empty()).then(|| format!("{}_heapvars", name));

    FrameLayout {
        scope,
        kind,
        needs_heap_context: code.needs_heap_context,
        arguments: var_names(&code.arguments),
        locals: var_names(&code.locals),
        heapvars,
        heapvars_name,
        using_heapvars_from: code
            .using_heapvars_from
            .iter()
            .map(|s| format!("{}_heapvars", scope_name(s)))
            .collect(),
        copying_vars: code
            .copying_vars
            .iter()
            .map(|v| {
                let var = analysis.scopes.var(*v);
                format!("{}{}", scope_name(&var.scope), var.name)
            })
            .collect(),
        name,
    }
}

/// Collects a method's true blocks (pre-order) and dispatched selectors.
struct FrameWalker<'a> {
    analysis: &'a Analysis,
    blocks: Vec<ScopeId>,
    selectors: Vec<String>,
}

impl<'ast> Visitor<'ast> for FrameWalker<'_> {
    type Error = Infallible;

    fn visit_block(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Infallible> {
        if let Some(scope) = self.analysis.block_scope(id) {
            if self.analysis.scopes.scope(scope).is_true_block() {
                self.blocks.push(scope);
            }
        }
        walk_block(self, arena, id)
    }

    fn visit_send(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Infallible> {
        if let (Some(shape), ExprKind::Send { selector, .. }) =
            (self.analysis.send_shape(id), arena.kind(id))
        {
            if !shape.is_inlined() {
                self.selectors.push(selector.clone());
            }
        }
        walk_send(self, arena, id)
    }

    fn visit_cascade(&mut self, arena: &'ast AstArena, id: ExprId) -> Result<(), Infallible> {
        if let ExprKind::Cascade { messages, .. } = arena.kind(id) {
            for message in messages {
                if let ExprKind::Send { selector, .. } = arena.kind(*message) {
                    self.selectors.push(selector.clone());
                }
            }
        }
        walk_cascade(self, arena, id)
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for class in &self.classes {
            writeln!(
                f,
                "class {} : {} (instance size {}, class size {})",
                class.name,
                class.super_name.as_deref().unwrap_or("nil"),
                class.instance_size,
                class.class_size
            )?;
            for (label, table) in [
                ("instance methods", &class.instance_methods),
                ("class methods", &class.class_methods),
            ] {
                if table.is_empty() {
                    continue;
                }
                writeln!(f, "  {}:", label)?;
                for entry in table {
                    writeln!(f, "    {} -> {}", entry.selector, entry.entry_point)?;
                }
            }
            if !class.symbol_references.is_empty() {
                writeln!(f, "  symbols: {}", class.symbol_references.join(" "))?;
            }
            for frame in &class.frames {
                let kind = match frame.kind {
                    FrameKind::Method => "method",
                    FrameKind::Block => "block",
                };
                writeln!(f, "  frame {} ({})", frame.name, kind)?;
                writeln!(
                    f,
                    "    stack: args [{}] locals [{}]",
                    frame.arguments.join(", "),
                    frame.locals.join(", ")
                )?;
                if let Some(record) = &frame.heapvars_name {
                    writeln!(f, "    heapvars {}: [{}]", record, frame.heapvars.join(", "))?;
                }
                if !frame.using_heapvars_from.is_empty() {
                    writeln!(f, "    using: [{}]", frame.using_heapvars_from.join(", "))?;
                }
                if !frame.copying_vars.is_empty() {
                    writeln!(f, "    copying: [{}]", frame.copying_vars.join(", "))?;
                }
                if frame.needs_heap_context {
                    writeln!(f, "    needs heap context")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;
    use parser::parse_source;

    fn layout(src: &str) -> Layout {
        let unit = parse_source(src).expect("parse failed");
        let analysis = analyze(&unit).expect("analysis failed");
        Layout::build(&unit, &analysis)
    }

    #[test]
    fn entry_points_escape_selectors() {
        let l = layout("Point : nil [ x: a y: b [ ] class new [ ] + p [ ] ]");
        let class = &l.classes[0];
        let entries: Vec<_> = class
            .instance_methods
            .iter()
            .map(|e| e.entry_point.as_str())
            .collect();
        assert_eq!(entries, vec!["_i_Point__x_y_", "_i_Point__+"]);
        assert_eq!(class.class_methods[0].entry_point, "_c_Point__new");
    }

    #[test]
    fn class_sizes_include_inherited_slots() {
        let l = layout("A : nil [ | a | class | ca | ] B : A [ | b c | ]");
        let b = &l.classes[1];
        assert_eq!(b.super_name.as_deref(), Some("A"));
        assert_eq!(b.instance_size, 3);
        assert_eq!(b.class_size, 1);
        assert_eq!(l.classes[0].super_name, None);
    }

    #[test]
    fn block_frames_are_named_by_path() {
        let l = layout("A : nil [ m: c [ ^ [ [ 1 ] ]. c ifTrue: [ [ 2 ] ] ifFalse: [ 3 ] ] ]");
        let names: Vec<_> = l.classes[0].frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["_i_A__m_", "_i_A__m__MB0", "_i_A__m__MBB1", "_i_A__m__MB2"]);
    }

    #[test]
    fn captured_arguments_stay_on_the_stack() {
        let l = layout("A : nil [ m: a [ ^ [ a ] ] ]");
        let method = &l.classes[0].frames[0];
        assert_eq!(method.arguments, vec!["a"]);
        assert!(method.heapvars.is_empty() && method.heapvars_name.is_none());
        assert_eq!(l.classes[0].frames[1].copying_vars, vec!["_i_A__m_a"]);

        let unit = parse_source("A : nil [ m: a [ ^ [ a := 1 ] ] ]").expect("parse failed");
        assert!(matches!(
            analyze(&unit).unwrap_err().kind,
            crate::AnalysisErrorKind::InvalidAssignment { .. }
        ));
    }

    #[test]
    fn heapvar_records_and_copies_are_named() {
        let l = layout("A : nil [ m [ | w r | r := 1. ^ [ w := r ] ] ]");
        let frames = &l.classes[0].frames;
        let method = &frames[0];
        assert_eq!(method.kind, FrameKind::Method);
        assert_eq!(method.locals, vec!["r"]);
        assert_eq!(method.heapvars_name.as_deref(), Some("_i_A__m_heapvars"));
        assert_eq!(method.heapvars, vec!["w"]);

        let block = &frames[1];
        assert_eq!(block.kind, FrameKind::Block);
        assert_eq!(block.using_heapvars_from, vec!["_i_A__m_heapvars"]);
        assert_eq!(block.copying_vars, vec!["_i_A__mr"]);
        assert_eq!(block.heapvars_name, None);
    }

    #[test]
    fn symbol_references_skip_inlined_sends() {
        let l = layout(
            "A : nil [ m: c [ c ifTrue: [ c foo ] ifFalse: [ c bar: 1 ]. \
             c foo. 1 to: 2 do: [:i | i + 1 ] ]
                       n: c [ c baz; qux ] ]",
        );
        assert_eq!(l.classes[0].symbol_references, vec!["foo", "bar:", "+", "baz", "qux"]);
    }

    #[test]
    fn report_mentions_frames_and_heap_context() {
        let l = layout("A : nil [ m: c [ c do: [:e | ^ e ] ] ]");
        let text = l.to_string();
        assert!(text.contains("class A : nil (instance size 0, class size 0)"));
        assert!(text.contains("m: -> _i_A__m_"));
        assert!(text.contains("frame _i_A__m_ (method)"));
        assert!(text.contains("needs heap context"));
        assert!(text.contains("symbols: do:"));
    }
}
