//! # Analysis
//!
//! Scope resolution and closure conversion for parsed class definitions.
//!
//! ```text
//!  CompilationUnit
//!      │
//!      ▼
//!  Registrar ─▶ Linkup ─▶ remote-access pass ─▶ closure conversion
//!   (names)    (supers)    (every class)          (every class)
//!      │
//!      ▼
//!  Analysis ─▶ Layout
//! ```
//!
//! The remote-access pass must finish on the whole unit before closure
//! conversion starts on any class: whether a variable is captured is only
//! known once every block that could mention it has been seen.
//!
//! ```rust
//! use analysis::analyze;
//! use parser::parse_source;
//!
//! let unit = parse_source("Counter : nil [ make [ | n | ^ [ n := n + 1 ] ] ]").unwrap();
//! let analysis = analyze(&unit).unwrap();
//! let make = analysis.classes[0].instance_methods[0];
//! assert_eq!(analysis.scopes.code(make).unwrap().heapvars.len(), 1);
//! ```

pub mod closure;
pub mod error;
pub mod intrinsic;
pub mod layout;
pub mod registrar;
pub mod remote;
pub mod scope;
pub mod variable;


use std::collections::BTreeMap;
use std::fmt::Write as _;

use log::info;
use parser::{CompilationUnit, ExprId};

pub use error::{AnalysisError, AnalysisErrorKind};
pub use intrinsic::{Intrinsic, SendShape};
pub use layout::Layout;
pub use scope::{CodeScope, InstanceScope, NamespaceScope, Scope, ScopeId, ScopeKind, ScopeTree};
pub use variable::{RemoteAccess, VarId, VarKind, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// Returns from the activation it is written in.
    Local,
    /// Returns from the enclosing method out of a true block.
    NonLocal,
}

/// Per-class results, parallel to `CompilationUnit::classes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub super_class: Option<usize>,
    /// The namespace member naming this class.
    pub member: VarId,
    pub instance_scope: ScopeId,
    pub class_scope: ScopeId,
    pub instance_methods: Vec<ScopeId>,
    pub class_methods: Vec<ScopeId>,
    /// Instance variables in slot order, inherited first.
    pub instance_vars: Vec<VarId>,
    pub class_vars: Vec<VarId>,
}

/// The frozen result of analysing one compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub scopes: ScopeTree,
    pub namespace: ScopeId,
    pub classes: Vec<ClassInfo>,
    /// Resolved variable of every identifier and assignment target.
    pub bindings: BTreeMap<ExprId, VarId>,
    /// Scope of every block literal, inlined or not.
    pub block_scopes: BTreeMap<ExprId, ScopeId>,
    pub sends: BTreeMap<ExprId, SendShape>,
    pub returns: BTreeMap<ExprId, ReturnKind>,
}

impl Analysis {
    pub fn new(scopes: ScopeTree, namespace: ScopeId, classes: Vec<ClassInfo>) -> Self {
        Self {
            scopes,
            namespace,
            classes,
            bindings: BTreeMap::new(),
            block_scopes: BTreeMap::new(),
            sends: BTreeMap::new(),
            returns: BTreeMap::new(),
        }
    }

    pub fn block_scope(&self, id: ExprId) -> Option<ScopeId> {
        self.block_scopes.get(&id).copied()
    }

    pub fn send_shape(&self, id: ExprId) -> Option<SendShape> {
        self.sends.get(&id).copied()
    }

    pub fn return_kind(&self, id: ExprId) -> Option<ReturnKind> {
        self.returns.get(&id).copied()
    }

    pub fn class_named(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Render the scope tree, one scope per line, children indented.
    pub fn dump_scopes(&self) -> String {
        let mut children: BTreeMap<ScopeId, Vec<ScopeId>> = BTreeMap::new();
        for (id, scope) in self.scopes.scopes() {
            if let Some(outer) = scope.outer {
                children.entry(outer).or_default().push(id);
            }
        }
        let mut out = String::new();
        self.dump_scope(self.namespace, 0, &children, &mut out);
        out
    }

    fn dump_scope(
        &self,
        id: ScopeId,
        depth: usize,
        children: &BTreeMap<ScopeId, Vec<ScopeId>>,
        out: &mut String,
    ) {
        let scope = self.scopes.scope(id);
        let names = |vars: &[VarId]| {
            vars.iter()
                .map(|v| describe_var(self.scopes.var(*v)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = write!(out, "{:indent$}{} {}", "", id, scope.kind_name(), indent = depth * 2);
        match &scope.kind {
            ScopeKind::Namespace(ns) => {
                let _ = write!(out, ": {}", names(&ns.members));
            }
            ScopeKind::Class(instance) => {
                let side = if instance.class_side { "class side" } else { "instance side" };
                let _ = write!(
                    out,
                    " {} ({}): {}",
                    self.classes[instance.class_index].name,
                    side,
                    names(&instance.instance_vars)
                );
            }
            ScopeKind::Method(code) | ScopeKind::Block(code) | ScopeKind::OptimisedBlock(code) => {
                let _ = write!(
                    out,
                    ": args [{}] locals [{}] heapvars [{}]",
                    names(&code.arguments),
                    names(&code.locals),
                    names(&code.heapvars)
                );
                if !code.inlined.is_empty() {
                    let _ = write!(out, " inlined [{}]", names(&code.inlined));
                }
                if !code.using_heapvars_from.is_empty() {
                    let from: Vec<String> =
                        code.using_heapvars_from.iter().map(|s| s.to_string()).collect();
                    let _ = write!(out, " using heapvars from [{}]", from.join(", "));
                }
                if !code.copying_vars.is_empty() {
                    let _ = write!(out, " copying [{}]", names(&code.copying_vars));
                }
                if code.needs_heap_context {
                    out.push_str(" needs heap context");
                }
            }
        }
        out.push('\n');
        for child in children.get(&id).into_iter().flatten() {
            self.dump_scope(*child, depth + 1, children, out);
        }
    }
}

fn describe_var(var: &Variable) -> String {
    let remote = match var.remote_access {
        RemoteAccess::None => "",
        RemoteAccess::ReadRemotely => " read remotely",
        RemoteAccess::WrittenRemotely => " written remotely",
    };
    match var.index {
        Some(index) if var.kind == VarKind::InstanceVariable => format!("{}@{}", var.name, index),
        _ => format!("{}{}", var.name, remote),
    }
}

/// Run every analysis stage over `unit`.
///
/// Fails on the first error; nothing of a failed unit is returned.
pub fn analyze(unit: &CompilationUnit) -> Result<Analysis, AnalysisError> {
    info!("analysing global names");
    let mut analysis = registrar::register(unit)?;
    registrar::link(unit, &mut analysis)?;

    info!("semantic analysis");
    remote::run(unit, &mut analysis)?;

    info!("closure analysis");
    closure::run(unit, &mut analysis);

    Ok(analysis)
}
