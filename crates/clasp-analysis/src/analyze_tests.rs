use crate::{analyze, check_bindings, SemaError};
use clasp_ast::ast::{Ast, ExprId, ExprKind};
use clasp_parse::parse_str;

fn analyzed(src: &str) -> Ast {
    let mut ast = parse_str(src).expect("parse failed");
    analyze(&mut ast).expect("analysis failed");
    ast
}

fn free_of(ast: &Ast, id: ExprId) -> Vec<&str> {
    ast.node(id).free_vars.iter().map(String::as_str).collect()
}

#[test]
fn duplicate_lambda_params_rejected() {
    let ast = parse_str("lambda (x y x) x").expect("parse failed");
    let err = check_bindings(&ast).expect_err("should reject");
    match err {
        SemaError::DuplicateParam { name, sl } => {
            assert_eq!(name, "x");
            assert_eq!((sl.line, sl.column), (1, 1));
        }
        other => panic!("expected DuplicateParam, got {other:?}"),
    }
}

#[test]
fn duplicate_letrec_bindings_rejected() {
    let ast = parse_str("letrec (a 1 a 2) a").expect("parse failed");
    let err = check_bindings(&ast).expect_err("should reject");
    assert!(matches!(err, SemaError::DuplicateBinding { ref name, .. } if name == "a"));
}

#[test]
fn shadowing_across_scopes_is_fine() {
    // the same name in nested binders is not a duplicate
    analyzed("lambda (x) letrec (x 1) lambda (x) x");
}

#[test]
fn variable_is_its_own_free_var() {
    let ast = analyzed("x");
    assert_eq!(free_of(&ast, ast.root()), ["x"]);
}

#[test]
fn lambda_subtracts_its_params() {
    let ast = analyzed("lambda (x) (.+ x y)");
    assert_eq!(free_of(&ast, ast.root()), ["y"]);
}

#[test]
fn letrec_subtracts_its_bindings_everywhere() {
    // f is bound by the letrec even inside the binding expressions
    let ast = analyzed("letrec (f lambda (n) (f n)) (f z)");
    assert_eq!(free_of(&ast, ast.root()), ["z"]);
}

#[test]
fn at_field_is_not_a_variable_use() {
    let ast = analyzed("@ hidden (make 1)");
    assert_eq!(free_of(&ast, ast.root()), ["make"]);
}

#[test]
fn literals_have_no_free_vars() {
    let ast = analyzed("{ 1 \"s\" }");
    assert!(free_of(&ast, ast.root()).is_empty());
}

#[test]
fn root_is_not_in_tail_position() {
    let ast = analyzed("(f 1)");
    assert!(!ast.node(ast.root()).tail);
}

#[test]
fn lambda_body_call_is_tail() {
    let ast = analyzed("lambda (n) (f n)");
    let ExprKind::Lambda { body, .. } = &ast.node(ast.root()).kind else {
        panic!("expected Lambda");
    };
    assert!(ast.node(*body).tail);
}

#[test]
fn if_branches_inherit_tail_but_condition_does_not() {
    let ast = analyzed("lambda (n) if (cond n) (f n) (g n)");
    let ExprKind::Lambda { body, .. } = &ast.node(ast.root()).kind else {
        panic!("expected Lambda");
    };
    let ExprKind::If {
        cond,
        then_branch,
        else_branch,
    } = &ast.node(*body).kind
    else {
        panic!("expected If");
    };
    assert!(!ast.node(*cond).tail);
    assert!(ast.node(*then_branch).tail);
    assert!(ast.node(*else_branch).tail);
}

#[test]
fn only_last_sequence_element_inherits_tail() {
    let ast = analyzed("lambda () { (f 1) (g 2) }");
    let ExprKind::Lambda { body, .. } = &ast.node(ast.root()).kind else {
        panic!("expected Lambda");
    };
    let ExprKind::Seq(exprs) = &ast.node(*body).kind else {
        panic!("expected Seq");
    };
    assert!(!ast.node(exprs[0]).tail);
    assert!(ast.node(exprs[1]).tail);
}

#[test]
fn letrec_body_inherits_but_bindings_do_not() {
    let ast = analyzed("lambda (n) letrec (x (f 1)) (g x)");
    let ExprKind::Lambda { body, .. } = &ast.node(ast.root()).kind else {
        panic!("expected Lambda");
    };
    let ExprKind::Letrec { bindings, body } = &ast.node(*body).kind else {
        panic!("expected Letrec");
    };
    assert!(!ast.node(bindings[0].value).tail);
    assert!(ast.node(*body).tail);
}

#[test]
fn call_subexpressions_are_never_tail() {
    let ast = analyzed("lambda (n) (f (g n))");
    let ExprKind::Lambda { body, .. } = &ast.node(ast.root()).kind else {
        panic!("expected Lambda");
    };
    let ExprKind::Call { callee, args } = &ast.node(*body).kind else {
        panic!("expected Call");
    };
    assert!(ast.node(*body).tail);
    assert!(!ast.node(*callee).tail);
    assert!(!ast.node(args[0]).tail);
}

#[test]
fn intrinsic_arguments_are_never_tail() {
    let ast = analyzed("lambda (n) (.+ (f n) 1)");
    let ExprKind::Lambda { body, .. } = &ast.node(ast.root()).kind else {
        panic!("expected Lambda");
    };
    let ExprKind::Intrinsic { args, .. } = &ast.node(*body).kind else {
        panic!("expected Intrinsic");
    };
    // the intrinsic call itself is tail, its arguments are not
    assert!(ast.node(*body).tail);
    assert!(!ast.node(args[0]).tail);
}
