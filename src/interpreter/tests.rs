use std::rc::Rc;

use crate::{
    analyzer::analyze,
    errors::errors::RuntimeError,
    lexer::lexer::tokenize,
    parser::parser::parse,
};

use super::{interpret, value::Value};

fn run(source: &str) -> (String, Result<Option<Value>, RuntimeError>) {
    let tokens = tokenize(source.to_string(), None).unwrap();
    let program = parse(tokens, Rc::new(String::from("test"))).unwrap();
    let analysis = analyze(&program);
    assert!(
        analysis.errors.is_empty(),
        "unexpected analysis errors for {:?}: {:?}",
        source,
        analysis.errors
    );
    interpret(&program, &analysis)
}

fn output_of(source: &str) -> String {
    let (output, result) = run(source);
    if let Err(error) = result {
        panic!("unexpected runtime error for {:?}: {}", source, error);
    }
    output
}

fn result_of(source: &str) -> Value {
    let (_, result) = run(source);
    match result {
        Ok(Some(value)) => value,
        Ok(None) => panic!("program {:?} did not return a value", source),
        Err(error) => panic!("unexpected runtime error for {:?}: {}", source, error),
    }
}

fn error_of(source: &str) -> RuntimeError {
    let (_, result) = run(source);
    match result {
        Err(error) => error,
        Ok(value) => panic!("expected a runtime error for {:?}, got {:?}", source, value),
    }
}

#[test]
fn test_print_writes_and_returns() {
    assert_eq!(output_of("print(\"hello\")"), "hello\n");
    // print passes its argument through
    assert_eq!(output_of("print(print(\"a\"))"), "a\na\n");
}

#[test]
fn test_integer_division_truncates() {
    assert_eq!(result_of("return 2 / 3"), Value::Int(0));
    assert_eq!(result_of("return 7 / 2"), Value::Int(3));
    assert_eq!(result_of("return 7 % 3"), Value::Int(1));
}

#[test]
fn test_division_by_zero() {
    assert_eq!(error_of("return 1 / 0").kind.name(), "DivisionByZero");
    assert_eq!(error_of("return 1 % 0").kind.name(), "DivisionByZero");
    // Float division follows IEEE 754
    match result_of("return 1.0 / 0.0") {
        Value::Float(x) => assert!(x.is_infinite()),
        other => panic!("expected infinity, got {:?}", other),
    }
}

#[test]
fn test_string_concatenation_stringifies() {
    assert_eq!(result_of("return 1 + \"a\""), Value::Str(String::from("1a")));
    assert_eq!(
        result_of("return \"a\" + true"),
        Value::Str(String::from("atrue"))
    );
    assert_eq!(
        result_of("return \"\" + null"),
        Value::Str(String::from("null"))
    );
}

#[test]
fn test_null_string_operand_stringifies() {
    // A statically-String side concatenates even while it holds null
    let (output, result) = run("var s: String = null\nreturn print(s + 1)");
    assert_eq!(output, "null1\n");
    assert_eq!(result.unwrap(), Some(Value::Str(String::from("null1"))));

    assert_eq!(
        result_of("var s: String = null\nreturn 1 + s"),
        Value::Str(String::from("1null"))
    );
}

#[test]
fn test_int_widens_to_float() {
    assert_eq!(result_of("var x: Float = 1\nreturn x"), Value::Float(1.0));
    assert_eq!(output_of("var x: Float = 1\nprint(\"\" + x)"), "1.0\n");
    assert_eq!(
        result_of("var x: Float = 2.0\nx = 1\nreturn x"),
        Value::Float(1.0)
    );
    assert_eq!(
        result_of("fun f(): Float { return 1 }\nreturn f()"),
        Value::Float(1.0)
    );
    assert_eq!(
        result_of("fun half(x: Float): Float { return x / 2 }\nreturn half(1)"),
        Value::Float(0.5)
    );
}

#[test]
fn test_equality() {
    assert_eq!(result_of("return 1 == 1.0"), Value::Bool(true));
    // Arrays compare by reference
    assert_eq!(
        result_of("var a: Int[] = [1]\nvar b: Int[] = [1]\nreturn a == b"),
        Value::Bool(false)
    );
    assert_eq!(
        result_of("var a: Int[] = [1]\nvar b: Int[] = a\nreturn a == b"),
        Value::Bool(true)
    );
    // Shapes need not match for array equality
    assert_eq!(
        result_of("var a: Int[][] = [[1]]\nvar b: Int[] = [1]\nreturn a == b"),
        Value::Bool(false)
    );
}

#[test]
fn test_elementwise_arithmetic() {
    assert_eq!(
        output_of("print(\"\" + ([1, 2] + [3, 4]))"),
        "[4, 6]\n"
    );
    assert_eq!(
        output_of("print(\"\" + ([[1, 2], [3, 4]] * [[2, 2], [2, 2]]))"),
        "[[2, 4], [6, 8]]\n"
    );
}

#[test]
fn test_scalar_broadcast() {
    assert_eq!(output_of("print(\"\" + ([1, 2] + 1))"), "[2, 3]\n");
    assert_eq!(output_of("print(\"\" + (2 * [1, 2]))"), "[2, 4]\n");
    // Broadcast promotes mixed Int and Float leaves
    assert_eq!(output_of("print(\"\" + ([1, 2] * 0.5))"), "[0.5, 1.0]\n");
    assert_eq!(output_of("print(\"\" + ([4, 6] / 2))"), "[2, 3]\n");
}

#[test]
fn test_scalar_dividend_is_unresolved() {
    let error = error_of("var x: Int[] = 2 / [1, 2, 3]");
    assert_eq!(error.kind.name(), "UnresolvedOperation");
    let error = error_of("var x: Int[] = 2 % [1, 2, 3]");
    assert_eq!(error.kind.name(), "UnresolvedOperation");
}

#[test]
fn test_runtime_shape_mismatch() {
    // Unsized declarations defer the shape check to evaluation
    let source = "var a: Int[]\nvar b: Int[]\na = [1, 2]\nb = [1, 2, 3]\nreturn a + b";
    let error = error_of(source);
    assert_eq!(error.kind.name(), "InvalidOperandShape");
    assert_eq!(
        error.to_string(),
        "operand shapes do not match: [2] and [3]"
    );
}

#[test]
fn test_strict_leaves_inside_arrays() {
    let source = "var a: Float[]\nvar b: Int[]\na = [1.0]\nb = [1]\nreturn a + b";
    assert_eq!(error_of(source).kind.name(), "UnresolvedOperation");
}

#[test]
fn test_float_zero_denominator_inside_arrays() {
    // IEEE semantics stop at array boundaries: a 0.0 denominator leaf
    // fails like the Int case does
    let source = "var a: Float[]\nvar b: Float[]\na = [1.0, 2.0]\nb = [1.0, 0.0]\nreturn a / b";
    assert_eq!(error_of(source).kind.name(), "DivisionByZero");

    assert_eq!(
        error_of("return [1.0, 2.0] / 0.0").kind.name(),
        "DivisionByZero"
    );
    assert_eq!(
        error_of("return [1.0, 2.0] % 0").kind.name(),
        "DivisionByZero"
    );
}

#[test]
fn test_type_valued_variables() {
    let source = "struct S { var x: Int }\nvar t: Type = S\nreturn \"\" + t";
    assert_eq!(result_of(source), Value::Str(String::from("S")));
}

#[test]
fn test_index_out_of_range() {
    let error = error_of("return [1, 2][5]");
    assert_eq!(error.kind.name(), "IndexOutOfRange");
    assert_eq!(error.to_string(), "index 5 out of range for length 2");
    assert_eq!(
        error_of("var xs: Int[] = [1]\nvar i: Int = 0 - 1\nreturn xs[i]")
            .kind
            .name(),
        "IndexOutOfRange"
    );
}

#[test]
fn test_default_values() {
    assert_eq!(result_of("var x: Int\nreturn x"), Value::Int(0));
    assert_eq!(result_of("var x: Float\nreturn x"), Value::Float(0.0));
    assert_eq!(result_of("var x: Bool\nreturn x"), Value::Bool(false));
    assert_eq!(result_of("var s: String\nreturn s"), Value::Null);
    // An unsized array starts as null
    assert_eq!(
        error_of("var xs: Int[]\nreturn xs[0]").kind.name(),
        "NullReference"
    );
}

#[test]
fn test_sized_array_defaults() {
    assert_eq!(
        output_of("var xs: Int[3]\nprint(\"\" + xs)"),
        "[0, 0, 0]\n"
    );
    assert_eq!(
        output_of("var m: Int[2][2]\nprint(\"\" + m)"),
        "[[0, 0], [0, 0]]\n"
    );
    assert_eq!(
        output_of("var s: String[3]\nprint(\"\" + s)"),
        "[null, null, null]\n"
    );
    assert_eq!(result_of("var s: String[3]\nreturn s.count"), Value::Int(3));
    assert_eq!(result_of("var s: String[3]\nreturn s.sum"), Value::Int(0));
    assert_eq!(
        result_of("var s: String[3]\nreturn s.avg"),
        Value::Float(0.0)
    );
}

#[test]
fn test_array_reductions() {
    assert_eq!(result_of("return [1, 2, 3].length"), Value::Int(3));
    assert_eq!(result_of("return [1, 2, 3].sum"), Value::Int(6));
    assert_eq!(result_of("return [1, 2, 3].avg"), Value::Float(2.0));
    assert_eq!(result_of("return [1.5, 2.5].sum"), Value::Float(4.0));
    // Ragged arrays count and sum every leaf
    assert_eq!(result_of("return [[4, 2], [3]].count"), Value::Int(3));
    assert_eq!(result_of("return [[4, 2], [3]].sum"), Value::Int(9));
    assert_eq!(result_of("return [[4, 2], [3]].length"), Value::Int(2));
    assert_eq!(result_of("return [[1], [2]].nDim"), Value::Int(2));
}

#[test]
fn test_matrix_product() {
    assert_eq!(
        output_of("print(\"\" + ([[1, 2], [3, 4]] @ [[1], [2]]))"),
        "[[5], [11]]\n"
    );
    // 1-D operands act as row and column vectors
    assert_eq!(output_of("print(\"\" + ([1, 2] @ [3, 4]))"), "[[11]]\n");
    assert_eq!(
        output_of("print(\"\" + ([[1.0, 0.0]] @ [[2.5], [1.0]]))"),
        "[[2.5]]\n"
    );
}

#[test]
fn test_matrix_product_shape_mismatch() {
    let source = "var a: Int[][]\nvar b: Int[][]\na = [[1, 2]]\nb = [[1, 2]]\nreturn a @ b";
    assert_eq!(error_of(source).kind.name(), "InvalidOperandShape");
}

#[test]
fn test_struct_fields() {
    let source = "struct P { var x: Int\n var y: Int }
var p: P = $P(1, 2)
p.x = 5
return p.x + p.y";
    assert_eq!(result_of(source), Value::Int(7));

    assert_eq!(
        output_of("struct P { var x: Int\n var y: Int }\nprint(\"\" + $P(1, 2))"),
        "P(x=1, y=2)\n"
    );
}

#[test]
fn test_class_operator_method() {
    let source = "class Fraction {
    var n: Int
    var d: Int
    fun plus(o: Fraction): Fraction {
        return $Fraction(n * o.d + o.n * d, d * o.d)
    }
}
var a: Fraction = $Fraction(1, 2)
var b: Fraction = $Fraction(1, 3)
var c: Fraction = a + b
return c.n";
    assert_eq!(result_of(source), Value::Int(5));
}

#[test]
fn test_class_method_call() {
    let source = "class Fraction {
    var n: Int
    var d: Int
    fun plus(o: Fraction): Fraction {
        return $Fraction(n * o.d + o.n * d, d * o.d)
    }
}
var a: Fraction = $Fraction(1, 2)
var b: Fraction = $Fraction(1, 3)
return a.plus(b).n";
    assert_eq!(result_of(source), Value::Int(5));
}

#[test]
fn test_class_instances_inside_arrays() {
    let source = "class Fraction {
    var n: Int
    var d: Int
    fun mul(o: Fraction): Fraction {
        return $Fraction(n * o.n, d * o.d)
    }
}
var xs: Fraction[] = [$Fraction(1, 2)]
var ys: Fraction[] = [$Fraction(1, 3)]
var zs: Fraction[] = xs * ys
return zs[0].d";
    assert_eq!(result_of(source), Value::Int(6));
}

#[test]
fn test_block_scoping() {
    let source = "var x: Int = 1
print(\"\" + x)
{
    var x: Int = 2
    print(\"\" + x)
}
print(\"\" + x)";
    assert_eq!(output_of(source), "1\n2\n1\n");
}

#[test]
fn test_while_loop() {
    let source = "var i: Int = 0
var total: Int = 0
while i < 5 {
    i = i + 1
    total = total + i
}
return total";
    assert_eq!(result_of(source), Value::Int(15));
}

#[test]
fn test_short_circuit() {
    let source = "fun seen(s: String): Bool { print(s)\n return true }
var a: Bool = false && seen(\"and\")
var b: Bool = true || seen(\"or\")
print(\"done\")";
    assert_eq!(output_of(source), "done\n");
}

#[test]
fn test_functions_hoist() {
    assert_eq!(
        result_of("return f()\nfun f(): Int { return 41 + 1 }"),
        Value::Int(42)
    );
}

#[test]
fn test_closures_capture_environment() {
    let source = "var counter: Int = 0
fun bump(): Int {
    counter = counter + 1
    return counter
}
bump()
bump()
return bump()";
    assert_eq!(result_of(source), Value::Int(3));
}

#[test]
fn test_aliasing() {
    let source = "var a: Int[] = [1, 2]
var b: Int[] = a
b[0] = 9
return a[0]";
    assert_eq!(result_of(source), Value::Int(9));
}

#[test]
fn test_construct_converts_fields() {
    let source = "struct P { var x: Float }\nvar p: P = $P(1)\nreturn p.x";
    assert_eq!(result_of(source), Value::Float(1.0));
}

#[test]
fn test_null_reference() {
    assert_eq!(
        error_of("var xs: Int[][]\nxs = [null]\nreturn xs[0][0]")
            .kind
            .name(),
        "NullReference"
    );
    assert_eq!(
        error_of("struct P { var x: Int }\nvar p: P\nreturn p.x")
            .kind
            .name(),
        "NullReference"
    );
}
