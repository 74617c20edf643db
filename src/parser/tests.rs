use std::rc::Rc;

use crate::{
    ast::{
        ast::{BinaryOp, Expr, ExprKind, UnaryOp},
        statements::{Stmt, StmtKind},
        types::TypeExprKind,
    },
    lexer::lexer::tokenize,
};

use super::parser::parse;

fn parse_source(source: &str) -> Vec<Stmt> {
    let tokens = tokenize(source.to_string(), Some(String::from("test.sl"))).unwrap();
    parse(tokens, Rc::new(String::from("test.sl"))).unwrap()
}

fn parse_expression(source: &str) -> Expr {
    let mut program = parse_source(source);
    assert_eq!(program.len(), 1, "expected a single statement");
    match program.remove(0).kind {
        StmtKind::Expression(expr) => expr,
        other => panic!("expected an expression statement, got {:?}", other),
    }
}

#[test]
fn test_parse_literals() {
    assert!(matches!(parse_expression("42").kind, ExprKind::Int(42)));
    assert!(matches!(parse_expression("2.5").kind, ExprKind::Float(_)));
    assert!(matches!(parse_expression("true").kind, ExprKind::Bool(true)));
    assert!(matches!(parse_expression("null").kind, ExprKind::Null));

    match parse_expression("\"hi\"").kind {
        ExprKind::Str(s) => assert_eq!(s, "hi"),
        other => panic!("expected a string literal, got {:?}", other),
    }
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let expr = parse_expression("1 + 2 * 3");
    match expr.kind {
        ExprKind::Binary { op, left, right } => {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(left.kind, ExprKind::Int(1)));
            assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            ));
        }
        other => panic!("expected a binary expression, got {:?}", other),
    }
}

#[test]
fn test_grouping_overrides_precedence() {
    let expr = parse_expression("(1 + 2) * 3");
    match expr.kind {
        ExprKind::Binary { op, left, .. } => {
            assert_eq!(op, BinaryOp::Mul);
            assert!(matches!(
                left.kind,
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    ..
                }
            ));
        }
        other => panic!("expected a binary expression, got {:?}", other),
    }
}

#[test]
fn test_comparison_binds_looser_than_arithmetic() {
    let expr = parse_expression("1 + 2 < 3 * 4");
    assert!(matches!(
        expr.kind,
        ExprKind::Binary {
            op: BinaryOp::Less,
            ..
        }
    ));
}

#[test]
fn test_logic_operators() {
    let expr = parse_expression("a && b || c");
    match expr.kind {
        ExprKind::Binary { op, left, .. } => {
            assert_eq!(op, BinaryOp::Or);
            assert!(matches!(
                left.kind,
                ExprKind::Binary {
                    op: BinaryOp::And,
                    ..
                }
            ));
        }
        other => panic!("expected a binary expression, got {:?}", other),
    }
}

#[test]
fn test_matrix_product_operator() {
    let expr = parse_expression("a @ b");
    assert!(matches!(
        expr.kind,
        ExprKind::Binary {
            op: BinaryOp::MatMul,
            ..
        }
    ));
}

#[test]
fn test_unary_operators() {
    let expr = parse_expression("!a");
    assert!(matches!(
        expr.kind,
        ExprKind::Unary {
            op: UnaryOp::Not,
            ..
        }
    ));

    // Negation binds tighter than multiplication
    let expr = parse_expression("-a * b");
    assert!(matches!(
        expr.kind,
        ExprKind::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));
}

#[test]
fn test_assignment_is_right_associative() {
    let expr = parse_expression("a = b = 1");
    match expr.kind {
        ExprKind::Assign { target, value } => {
            assert!(matches!(target.kind, ExprKind::Identifier(_)));
            assert!(matches!(value.kind, ExprKind::Assign { .. }));
        }
        other => panic!("expected an assignment, got {:?}", other),
    }
}

#[test]
fn test_array_literal() {
    match parse_expression("[1, 2, 3]").kind {
        ExprKind::Array(elements) => assert_eq!(elements.len(), 3),
        other => panic!("expected an array literal, got {:?}", other),
    }

    match parse_expression("[]").kind {
        ExprKind::Array(elements) => assert!(elements.is_empty()),
        other => panic!("expected an array literal, got {:?}", other),
    }
}

#[test]
fn test_call_index_and_field_chain() {
    let expr = parse_expression("f(1)[0].x");
    match expr.kind {
        ExprKind::Field { target, field } => {
            assert_eq!(field, "x");
            match target.kind {
                ExprKind::Index { target, .. } => {
                    assert!(matches!(target.kind, ExprKind::Call { .. }));
                }
                other => panic!("expected an index expression, got {:?}", other),
            }
        }
        other => panic!("expected a field access, got {:?}", other),
    }
}

#[test]
fn test_construction() {
    match parse_expression("$Point(1, 2)").kind {
        ExprKind::Construct { name, args } => {
            assert_eq!(name, "Point");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected a construction, got {:?}", other),
    }
}

#[test]
fn test_var_decl() {
    let program = parse_source("var x: Int = 1");
    match &program[0].kind {
        StmtKind::VarDecl { name, ty, init } => {
            assert_eq!(name, "x");
            assert!(matches!(&ty.kind, TypeExprKind::Named(n) if n == "Int"));
            assert!(init.is_some());
        }
        other => panic!("expected a variable declaration, got {:?}", other),
    }

    let program = parse_source("var x: Int");
    match &program[0].kind {
        StmtKind::VarDecl { init, .. } => assert!(init.is_none()),
        other => panic!("expected a variable declaration, got {:?}", other),
    }
}

#[test]
fn test_array_type_annotation() {
    // The first bracket group is the outermost dimension
    let program = parse_source("var m: Int[2][3]");
    match &program[0].kind {
        StmtKind::VarDecl { ty, .. } => match &ty.kind {
            TypeExprKind::Array { element, size } => {
                let outer = size.as_ref().unwrap();
                assert!(matches!(outer.kind, ExprKind::Int(2)));
                match &element.kind {
                    TypeExprKind::Array { element, size } => {
                        let inner = size.as_ref().unwrap();
                        assert!(matches!(inner.kind, ExprKind::Int(3)));
                        assert!(matches!(&element.kind, TypeExprKind::Named(n) if n == "Int"));
                    }
                    other => panic!("expected an array type, got {:?}", other),
                }
            }
            other => panic!("expected an array type, got {:?}", other),
        },
        other => panic!("expected a variable declaration, got {:?}", other),
    }
}

#[test]
fn test_if_else() {
    let program = parse_source("if a < b { print(\"a\") } else { print(\"b\") }");
    match &program[0].kind {
        StmtKind::If {
            condition,
            else_body,
            ..
        } => {
            assert!(matches!(
                condition.kind,
                ExprKind::Binary {
                    op: BinaryOp::Less,
                    ..
                }
            ));
            assert!(else_body.is_some());
        }
        other => panic!("expected an if statement, got {:?}", other),
    }
}

#[test]
fn test_while() {
    let program = parse_source("while x < 10 { x = x + 1 }");
    assert!(matches!(&program[0].kind, StmtKind::While { .. }));
}

#[test]
fn test_fun_decl() {
    let program = parse_source("fun add(a: Int, b: Int): Int { return a + b }");
    match &program[0].kind {
        StmtKind::FunDecl(fun) => {
            assert_eq!(fun.name, "add");
            assert_eq!(fun.params.len(), 2);
            assert!(fun.return_type.is_some());
            assert_eq!(fun.body.len(), 1);
            assert!(matches!(&fun.body[0].kind, StmtKind::Return(Some(_))));
        }
        other => panic!("expected a function declaration, got {:?}", other),
    }

    let program = parse_source("fun noop() { }");
    match &program[0].kind {
        StmtKind::FunDecl(fun) => {
            assert!(fun.params.is_empty());
            assert!(fun.return_type.is_none());
        }
        other => panic!("expected a function declaration, got {:?}", other),
    }
}

#[test]
fn test_struct_decl() {
    let program = parse_source("struct Point { var x: Int\n var y: Int }");
    match &program[0].kind {
        StmtKind::StructDecl(decl) => {
            assert_eq!(decl.name, "Point");
            assert_eq!(decl.fields.len(), 2);
            assert!(decl.methods.is_empty());
        }
        other => panic!("expected a struct declaration, got {:?}", other),
    }
}

#[test]
fn test_class_decl_with_method() {
    let source = "class Fraction {
    var n: Int
    var d: Int
    fun plus(o: Fraction): Fraction {
        return $Fraction(n * o.d + o.n * d, d * o.d)
    }
}";
    let program = parse_source(source);
    match &program[0].kind {
        StmtKind::ClassDecl(decl) => {
            assert_eq!(decl.name, "Fraction");
            assert_eq!(decl.fields.len(), 2);
            assert_eq!(decl.methods.len(), 1);
            assert_eq!(decl.methods[0].name, "plus");
        }
        other => panic!("expected a class declaration, got {:?}", other),
    }
}

#[test]
fn test_methods_in_struct_are_rejected() {
    let tokens = tokenize(
        "struct P { fun f() { } }".to_string(),
        Some(String::from("test.sl")),
    )
    .unwrap();
    assert!(parse(tokens, Rc::new(String::from("test.sl"))).is_err());
}

#[test]
fn test_semicolons_are_optional() {
    assert_eq!(parse_source("var x: Int = 1;\nvar y: Int = 2").len(), 2);
    assert_eq!(parse_source("var x: Int = 1\nvar y: Int = 2").len(), 2);
}

#[test]
fn test_node_ids_are_unique() {
    let program = parse_source("var x: Int = 1 + 2\nprint(\"\" + x)");

    let mut ids = Vec::new();
    collect_stmt_ids(&program, &mut ids);
    let before = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), before, "node ids must not repeat");
}

fn collect_stmt_ids(stmts: &[Stmt], ids: &mut Vec<i32>) {
    for stmt in stmts {
        ids.push(stmt.id);
        if let StmtKind::Expression(expr) | StmtKind::VarDecl {
            init: Some(expr), ..
        } = &stmt.kind
        {
            collect_expr_ids(expr, ids);
        }
    }
}

fn collect_expr_ids(expr: &Expr, ids: &mut Vec<i32>) {
    ids.push(expr.id);
    match &expr.kind {
        ExprKind::Unary { operand, .. } => collect_expr_ids(operand, ids),
        ExprKind::Binary { left, right, .. } => {
            collect_expr_ids(left, ids);
            collect_expr_ids(right, ids);
        }
        ExprKind::Assign { target, value } => {
            collect_expr_ids(target, ids);
            collect_expr_ids(value, ids);
        }
        ExprKind::Index { target, index } => {
            collect_expr_ids(target, ids);
            collect_expr_ids(index, ids);
        }
        ExprKind::Field { target, .. } => collect_expr_ids(target, ids),
        ExprKind::Call { callee, args } => {
            collect_expr_ids(callee, ids);
            for arg in args {
                collect_expr_ids(arg, ids);
            }
        }
        ExprKind::Construct { args, .. } => {
            for arg in args {
                collect_expr_ids(arg, ids);
            }
        }
        ExprKind::Array(elements) => {
            for element in elements {
                collect_expr_ids(element, ids);
            }
        }
        _ => {}
    }
}
