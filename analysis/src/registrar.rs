//! Registrar and Linkup: the class-level passes that run before any
//! method body is looked at.
use log::debug;
use parser::{ClassDecl, CompilationUnit, VarDecl};

use crate::error::{AnalysisError, AnalysisErrorKind};
use crate::scope::{NamespaceScope, ScopeId, ScopeKind, ScopeTree};
use crate::variable::{VarId, VarKind, Variable};
use crate::{Analysis, ClassInfo};

/// Enter every class into a fresh namespace scope and give each its
/// instance-side and class-side scopes.
pub fn register(unit: &CompilationUnit) -> Result<Analysis, AnalysisError> {
    let mut scopes = ScopeTree::new();
    let namespace = scopes.add_scope(None, ScopeKind::Namespace(NamespaceScope::default()));
    let mut classes: Vec<ClassInfo> = Vec::with_capacity(unit.classes.len());

    for (index, class) in unit.classes.iter().enumerate() {
        if classes.iter().any(|c| c.name == class.name) {
            return Err(
                AnalysisError::new(AnalysisErrorKind::DuplicateClass(class.name.clone()))
                    .at(class.span),
            );
        }

        let mut member = Variable::new(class.name.clone(), namespace, VarKind::NamespaceMember)
            .with_span(class.span);
        member.index = Some(index);
        let member = scopes.add_var(member);
        if let ScopeKind::Namespace(ns) = &mut scopes.scope_mut(namespace).kind {
            ns.members.push(member);
        }

        let instance_scope = scopes.add_instance_scope(namespace, index, false);
        let class_scope = scopes.add_instance_scope(namespace, index, true);
        debug!("registered class {} ({} / {})", class.name, instance_scope, class_scope);

        classes.push(ClassInfo {
            name: class.name.clone(),
            super_class: None,
            member,
            instance_scope,
            class_scope,
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
            instance_vars: Vec::new(),
            class_vars: Vec::new(),
        });
    }

    Ok(Analysis::new(scopes, namespace, classes))
}

/// Resolve superclass names, reject cycles, and lay out instance
/// variables of both sides superclass-first.
pub fn link(unit: &CompilationUnit, analysis: &mut Analysis) -> Result<(), AnalysisError> {
    for (index, class) in unit.classes.iter().enumerate() {
        let Some(super_name) = &class.super_name else {
            continue;
        };
        let member = analysis
            .scopes
            .lookup(analysis.namespace, super_name, false, false)
            .map_err(|_| {
                AnalysisError::new(AnalysisErrorKind::UnresolvedSuperclass {
                    class: class.name.clone(),
                    super_name: super_name.clone(),
                })
                .at(class.super_span)
            })?;
        let super_index = analysis.scopes.var(member).index;
        analysis.classes[index].super_class = super_index;
        debug!("linked {} to superclass {}", class.name, super_name);
    }

    check_acyclic(unit, analysis)?;

    for (index, class) in unit.classes.iter().enumerate() {
        let chain = superclass_chain(analysis, index);

        let instance_decls = chain.iter().rev().flat_map(|c| unit.classes[*c].instance_vars.iter());
        let instance_scope = analysis.classes[index].instance_scope;
        let vars = declare_slots(&mut analysis.scopes, instance_scope, instance_decls)?;
        analysis.classes[index].instance_vars = vars;

        let class_decls = chain.iter().rev().flat_map(|c| unit.classes[*c].class_vars.iter());
        let class_scope = analysis.classes[index].class_scope;
        let vars = declare_slots(&mut analysis.scopes, class_scope, class_decls)?;
        analysis.classes[index].class_vars = vars;

        debug!(
            "class {}: {} instance variables, {} class-side variables",
            class.name,
            analysis.classes[index].instance_vars.len(),
            analysis.classes[index].class_vars.len()
        );
    }

    Ok(())
}

/// `index` and its superclasses, nearest first.
fn superclass_chain(analysis: &Analysis, index: usize) -> Vec<usize> {
    std::iter::successors(Some(index), |c| analysis.classes[*c].super_class).collect()
}

fn check_acyclic(unit: &CompilationUnit, analysis: &Analysis) -> Result<(), AnalysisError> {
    let limit = analysis.classes.len();
    for (index, class) in unit.classes.iter().enumerate() {
        let depth = std::iter::successors(Some(index), |c| analysis.classes[*c].super_class)
            .take(limit + 1)
            .count();
        if depth > limit {
            return Err(cyclic(class));
        }
    }
    Ok(())
}

fn cyclic(class: &ClassDecl) -> AnalysisError {
    AnalysisError::new(AnalysisErrorKind::CyclicInheritance(class.name.clone())).at(class.span)
}

fn declare_slots<'a>(
    scopes: &mut ScopeTree,
    scope: ScopeId,
    decls: impl Iterator<Item = &'a VarDecl>,
) -> Result<Vec<VarId>, AnalysisError> {
    let mut vars: Vec<VarId> = Vec::new();
    for (slot, decl) in decls.enumerate() {
        if vars.iter().any(|v| scopes.var(*v).name == decl.name) {
            return Err(AnalysisError::new(AnalysisErrorKind::DuplicateDeclaration(
                decl.name.clone(),
            ))
            .at(decl.span));
        }
        let mut var =
            Variable::new(decl.name.clone(), scope, VarKind::InstanceVariable).with_span(decl.span);
        var.index = Some(slot);
        vars.push(scopes.add_var(var));
    }
    if let ScopeKind::Class(instance) = &mut scopes.scope_mut(scope).kind {
        instance.instance_vars = vars.clone();
    }
    Ok(vars)
}
