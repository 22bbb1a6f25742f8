// crates/clasp-analysis/src/analyze.rs
// Static analysis passes over the AST arena: duplicate-binding checking,
// free-variable computation, and tail-position marking.

use crate::SemaError;
use clasp_ast::ast::{Ast, ExprId, ExprKind};
use std::collections::{BTreeSet, HashSet};

/// Run all passes. The evaluator requires an analyzed AST: closure capture
/// reads `free_vars` and tail-call elimination reads `tail`.
pub fn analyze(ast: &mut Ast) -> Result<(), SemaError> {
    check_bindings(ast)?;
    compute_free_vars(ast);
    mark_tail_positions(ast);
    Ok(())
}

/// Reject lambdas with repeated parameter names and letrecs with repeated
/// binding names.
pub fn check_bindings(ast: &Ast) -> Result<(), SemaError> {
    for id in ast.ids() {
        let node = ast.node(id);
        match &node.kind {
            ExprKind::Lambda { params, .. } => {
                let mut seen = HashSet::new();
                for p in params {
                    if !seen.insert(p.text.as_str()) {
                        return Err(SemaError::DuplicateParam {
                            name: p.text.clone(),
                            sl: node.sl,
                        });
                    }
                }
            }
            ExprKind::Letrec { bindings, .. } => {
                let mut seen = HashSet::new();
                for b in bindings {
                    if !seen.insert(b.name.text.as_str()) {
                        return Err(SemaError::DuplicateBinding {
                            name: b.name.text.clone(),
                            sl: node.sl,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Annotate every node with the set of identifiers that occur free in it.
/// Post-order: a node's set is the union of its children's sets minus
/// whatever the node itself binds.
pub fn compute_free_vars(ast: &mut Ast) {
    let root = ast.root();
    free_vars(ast, root);
}

fn free_vars(ast: &mut Ast, id: ExprId) -> BTreeSet<String> {
    let kind = ast.node(id).kind.clone();
    let set = match kind {
        ExprKind::Int(_) | ExprKind::Str(_) => BTreeSet::new(),
        ExprKind::Var(name) => BTreeSet::from([name]),
        ExprKind::Lambda { params, body } => {
            let mut set = free_vars(ast, body);
            for p in &params {
                set.remove(&p.text);
            }
            set
        }
        ExprKind::Letrec { bindings, body } => {
            let mut set = free_vars(ast, body);
            for b in &bindings {
                set.extend(free_vars(ast, b.value));
            }
            for b in &bindings {
                set.remove(&b.name.text);
            }
            set
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let mut set = free_vars(ast, cond);
            set.extend(free_vars(ast, then_branch));
            set.extend(free_vars(ast, else_branch));
            set
        }
        ExprKind::Seq(exprs) => {
            let mut set = BTreeSet::new();
            for e in exprs {
                set.extend(free_vars(ast, e));
            }
            set
        }
        ExprKind::Intrinsic { args, .. } => {
            let mut set = BTreeSet::new();
            for a in args {
                set.extend(free_vars(ast, a));
            }
            set
        }
        ExprKind::Call { callee, args } => {
            let mut set = free_vars(ast, callee);
            for a in args {
                set.extend(free_vars(ast, a));
            }
            set
        }
        // the field is a projection label, not a variable use
        ExprKind::At { target, .. } => free_vars(ast, target),
    };
    ast.node_mut(id).free_vars = set.clone();
    set
}

/// Annotate every node with whether it sits in tail position relative to
/// the enclosing function body. The root is not in tail position; a lambda
/// body opens a fresh tail context.
pub fn mark_tail_positions(ast: &mut Ast) {
    let root = ast.root();
    mark_tail(ast, root, false);
}

fn mark_tail(ast: &mut Ast, id: ExprId, tail: bool) {
    ast.node_mut(id).tail = tail;
    let kind = ast.node(id).kind.clone();
    match kind {
        ExprKind::Int(_) | ExprKind::Str(_) | ExprKind::Var(_) => {}
        ExprKind::Lambda { body, .. } => mark_tail(ast, body, true),
        ExprKind::Letrec { bindings, body } => {
            for b in &bindings {
                mark_tail(ast, b.value, false);
            }
            mark_tail(ast, body, tail);
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            mark_tail(ast, cond, false);
            mark_tail(ast, then_branch, tail);
            mark_tail(ast, else_branch, tail);
        }
        ExprKind::Seq(exprs) => {
            let n = exprs.len();
            for (i, e) in exprs.into_iter().enumerate() {
                mark_tail(ast, e, i + 1 == n && tail);
            }
        }
        ExprKind::Intrinsic { args, .. } => {
            for a in args {
                mark_tail(ast, a, false);
            }
        }
        ExprKind::Call { callee, args } => {
            mark_tail(ast, callee, false);
            for a in args {
                mark_tail(ast, a, false);
            }
        }
        ExprKind::At { target, .. } => mark_tail(ast, target, false),
    }
}
