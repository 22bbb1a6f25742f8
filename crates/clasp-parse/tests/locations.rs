//! Tests for line/column tracking in the lexer and parser.
//!
//! Every diagnostic in the pipeline leans on these locations, so they
//! have to point at the first character of the offending construct.

use clasp_ast::ast::ExprKind;
use clasp_parse::parse_str;

#[test]
fn root_location_is_start_of_expression() {
    let ast = parse_str("   42").expect("parse failed");
    let node = ast.node(ast.root());
    assert_eq!(node.sl.line, 1);
    assert_eq!(node.sl.column, 4);
}

#[test]
fn newlines_advance_lines() {
    let src = "(.+\n  1\n  2)";
    let ast = parse_str(src).expect("parse failed");
    let root = ast.node(ast.root());
    assert_eq!((root.sl.line, root.sl.column), (1, 1));

    let ExprKind::Intrinsic { args, .. } = &root.kind else {
        panic!("expected Intrinsic");
    };
    let first = ast.node(args[0]);
    assert_eq!((first.sl.line, first.sl.column), (2, 3));
    let second = ast.node(args[1]);
    assert_eq!((second.sl.line, second.sl.column), (3, 3));
}

#[test]
fn call_node_location_is_open_paren() {
    let src = "  (f 1)";
    let ast = parse_str(src).expect("parse failed");
    let node = ast.node(ast.root());
    assert!(matches!(node.kind, ExprKind::Call { .. }));
    assert_eq!((node.sl.line, node.sl.column), (1, 3));
}

#[test]
fn lambda_location_is_keyword() {
    let src = "\nlambda (x) x";
    let ast = parse_str(src).expect("parse failed");
    let node = ast.node(ast.root());
    assert!(matches!(node.kind, ExprKind::Lambda { .. }));
    assert_eq!((node.sl.line, node.sl.column), (2, 1));
}

#[test]
fn error_location_points_at_offender() {
    // the stray second `}` sits on line 2, column 6
    let err = parse_str("{ 1\n  2 }}").expect_err("should reject");
    let sl = err.sl();
    assert_eq!((sl.line, sl.column), (2, 6));
}
