use std::rc::Rc;

use crate::{lexer::lexer::tokenize, parser::parser::parse};

use super::{analyze, types::Type, Analysis};

fn analyze_source(source: &str) -> Analysis {
    let tokens = tokenize(source.to_string(), None).unwrap();
    let program = parse(tokens, Rc::new(String::from("test"))).unwrap();
    analyze(&program)
}

fn assert_clean(source: &str) {
    let analysis = analyze_source(source);
    assert!(
        analysis.errors.is_empty(),
        "unexpected errors for {:?}: {:?}",
        source,
        analysis.errors
    );
}

fn assert_error(source: &str, message: &str) {
    let analysis = analyze_source(source);
    assert!(
        analysis.errors.iter().any(|e| e.message == message),
        "expected {:?}, got {:?}",
        message,
        analysis.errors
    );
}

#[test]
fn test_scalar_arithmetic() {
    assert_clean("var x: Int = 1 + 2 * 3");
    assert_clean("var x: Float = 1 + 2.5");
    assert_clean("var x: Float = 1");
    assert_error("var x: Int = 1.5", "expected Int but got Float");
    assert_error("var x: Int = true", "expected Int but got Bool");
}

#[test]
fn test_mixed_operand_kinds() {
    assert_error("1 + true", "Trying to add Int with Bool");
    assert_error("1 - true", "Trying to subtract Int with Bool");
    assert_error("true * 2", "Trying to multiply Bool with Int");
    assert_error("true / 2", "Trying to divide Bool with Int");
    assert_error("true % 2", "Trying to modulo Bool with Int");
}

#[test]
fn test_string_concatenation() {
    assert_clean("var x: String = \"a\" + 1");
    assert_clean("var x: String = 1 + \"a\"");
    assert_clean("var x: String = \"\" + true");
    assert_clean("var x: String = \"\" + null");
}

#[test]
fn test_logic_operators() {
    assert_clean("var x: Bool = true && false || true");
    assert_clean("var x: Bool = !false");
    assert_error(
        "true && 1",
        "Attempting to perform binary logic on non-boolean type: Int",
    );
    assert_error(
        "!1",
        "Attempting to perform unary logic on non-boolean type: Int",
    );
}

#[test]
fn test_comparisons() {
    assert_clean("var x: Bool = 1 < 2");
    assert_clean("var x: Bool = 1 == 1.0");
    assert_clean("var x: Bool = null == \"a\"");
    // Arrays compare by reference, so any two array types are comparable
    assert_clean("var x: Bool = [[1]] == [1]");
    assert_clean("var x: Bool = [1.0] != [[1], [2]]");
    assert_error(
        "true == 1",
        "Trying to compare incomparable types Bool and Int",
    );
    assert_error(
        "\"a\" < \"b\"",
        "Trying to compare incomparable types String and String",
    );
}

#[test]
fn test_conditions_must_be_boolean() {
    assert_clean("if 1 < 2 { print(\"ok\") }");
    assert_error(
        "if 1 { print(\"ok\") }",
        "If statement with a non-boolean condition of type: Int",
    );
    assert_error(
        "while 1 { print(\"ok\") }",
        "While statement with a non-boolean condition of type: Int",
    );
}

#[test]
fn test_array_operations() {
    assert_clean("var x: Int[] = [1, 2] + [3, 4]");
    assert_clean("var x: Int[] = [1, 2] + 1");
    assert_clean("var x: Float[] = [1, 2] * 0.5");
    // A scalar dividend only fails once the division is evaluated
    assert_clean("var x: Int[] = 2 / [1, 2, 3]");
    assert_clean("var x: Int[] = []");
    assert_clean("var x: Int[][] = [[1], [2]]");
}

#[test]
fn test_array_dimension_mismatch() {
    assert_error(
        "[1, 2, 3] + [[1], [2], [3]]",
        "Trying to operate on arrays with different dimensions: [3] and [3, 1]",
    );
    assert_error(
        "[1, 2] + [1, 2, 3]",
        "Trying to operate on arrays with different dimensions: [2] and [3]",
    );
}

#[test]
fn test_dot_product() {
    assert_clean("var m: Int[][] = [[1, 2], [3, 4]] @ [[1], [2]]");
    assert_clean("var m: Int[][] = [1, 2] @ [[1], [2]]");
    assert_clean("var m: Float[][] = [[1.0, 2.0]] @ [[1.0], [2.0]]");
    assert_error("1 @ [[1]]", "Trying to dotproduct Int with Int[][]");
    assert_error(
        "[[1, 2]] @ [[1, 2]]",
        "Trying to dotproduct arrays with incompatible dimensions: [1, 2] and [1, 2]",
    );
}

#[test]
fn test_indexing() {
    assert_clean("var x: Int = [1, 2, 3][0]");
    assert_clean("var x: Int = [[1], [2]][0][0]");
    assert_error(
        "[1, 2][true]",
        "Indexing an array using a non-Int-valued expression",
    );
    assert_error("1[0]", "Trying to index a non-array of type: Int");
}

#[test]
fn test_array_reductions() {
    let analysis = analyze_source("var x: Int = [1, 2, 3].sum");
    assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);

    assert_clean("var x: Float = [1.0, 2.0].sum");
    assert_clean("var x: Int = [1, 2].length");
    assert_clean("var x: Int = [[1], [2]].count");
    assert_clean("var x: Int = [[1], [2]].nDim");
    assert_clean("var x: Float = [1, 2].avg");
    assert_error(
        "[1, 2].missing",
        "Trying to access missing field missing on Int[]",
    );
}

#[test]
fn test_array_declaration_sizes() {
    let analysis = analyze_source("var x: Int[3]");
    assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
    let sizes: Vec<_> = analysis.sizes.values().collect();
    assert_eq!(sizes, vec![&vec![3usize]]);

    assert_error(
        "var x: Int[size]",
        "Illegal size for array declaration: \"size\"",
    );
    assert_error("var x: Int[2.3]", "Illegal size for array declaration: 2.3");
    assert_error("var x: Int[-3]", "Illegal size for array declaration: -3");
}

#[test]
fn test_functions() {
    assert_clean("fun add(a: Int, b: Int): Int { return a + b }\nvar x: Int = add(1, 2)");
    assert_clean("fun f(): Int { if true { return 1 } else { return 2 } }");
    assert_error("fun f(): Int { }", "Missing return in function");
    assert_error(
        "fun f(): Int { if true { return 1 } }",
        "Missing return in function",
    );
    assert_error("fun f(): Int { return true }", "expected Int but got Bool");
    assert_error(
        "fun f(a: Int) { }\nf(1, 2)",
        "Wrong number of arguments to f: expected 1 but got 2",
    );
    assert_error(
        "fun f(a: Int) { }\nf(true)",
        "argument 0: expected Int but got Bool",
    );
}

#[test]
fn test_forward_references() {
    // Declarations resolve regardless of their textual order
    assert_clean("var x: Int = f()\nfun f(): Int { return 1 }");
    assert_clean("var p: Point = $Point(1, 2)\nstruct Point { var x: Int\n var y: Int }");
    assert_clean("fun a(): Int { return b() }\nfun b(): Int { return 1 }");
}

#[test]
fn test_use_before_declaration() {
    assert_error(
        "print(\"\" + x)\nvar x: Int = 1",
        "Variable used before declaration: x",
    );
}

#[test]
fn test_unresolved_name() {
    assert_error("print(\"\" + y)", "Could not resolve: y");
    assert_error("var x: Thing = null", "Could not resolve: Thing");
}

#[test]
fn test_redeclaration() {
    assert_error("var x: Int = 1\nvar x: Int = 2", "Trying to redeclare: x");
    assert_clean("var x: Int = 1\n{ var x: Int = 2 }");
}

#[test]
fn test_print_argument() {
    assert_clean("print(\"hello\")");
    assert_error("print(1)", "argument 0: expected String but got Int");
}

#[test]
fn test_structs() {
    let source = "struct P { var x: Int\n var y: Int }\nvar p: P = $P(1, 2)\nvar x: Int = p.x";
    assert_clean(source);

    assert_error(
        "struct P { var x: Int }\nvar p: P = $P(1)\nprint(\"\" + p.z)",
        "Trying to access missing field z on struct P",
    );
    assert_error(
        "struct P { var x: Int }\nvar p: P = $P(true)",
        "argument 0: expected Int but got Bool",
    );
    assert_error(
        "struct P { var x: Int }\nvar p: P = $P(1, 2)",
        "Wrong number of arguments to P: expected 1 but got 2",
    );
}

#[test]
#[should_panic(expected = "You cannot define a attribut and a variable with the same name")]
fn test_field_colliding_with_variable() {
    analyze_source("var x: Int = 1\nstruct P { var x: Int }");
}

#[test]
fn test_class_operator_methods() {
    let source = "class Fraction {
    var n: Int
    var d: Int
    fun plus(o: Fraction): Fraction {
        return $Fraction(n * o.d + o.n * d, d * o.d)
    }
}
var a: Fraction = $Fraction(1, 2)
var b: Fraction = $Fraction(1, 3)
var c: Fraction = a + b";
    assert_clean(source);

    assert_error(
        "class C { var x: Int }\nvar a: C = $C(1)\nvar b: C = a + a",
        "Trying to add C with C",
    );
}

#[test]
fn test_type_valued_variables() {
    assert_clean("struct S { var x: Int }\nvar t: Type = S\nprint(\"\" + t)");
    assert_clean("class C { var x: Int }\nvar t: Type = C");
}

#[test]
fn test_recorded_types() {
    let analysis = analyze_source("var x: Float = 1");
    assert!(analysis.errors.is_empty());
    // The declaration's recorded type drives the Int to Float conversion
    assert!(analysis.types.values().any(|t| *t == Type::Float));
}

#[test]
fn test_assignment() {
    assert_clean("var x: Int = 1\nx = 2");
    assert_clean("var xs: Int[] = [1, 2]\nxs[0] = 3");
    assert_error("var x: Int = 1\nx = true", "expected Int but got Bool");
    assert_error("1 = 2", "Invalid assignment target");
}
