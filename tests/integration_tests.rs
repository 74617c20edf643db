//! End-to-end tests covering the full pipeline: tokenize, parse, analyze
//! and interpret.

use std::rc::Rc;

use slate::{
    analyzer::{analyze, Analysis},
    ast::statements::Stmt,
    interpreter::{interpret, value::Value},
    lexer::lexer::tokenize,
    parser::parser::parse,
};

fn front_end(source: &str) -> (Vec<Stmt>, Analysis) {
    let tokens = tokenize(source.to_string(), Some(String::from("test.sl"))).unwrap();
    let program = parse(tokens, Rc::new(String::from("test.sl"))).unwrap();
    let analysis = analyze(&program);
    (program, analysis)
}

fn run(source: &str) -> (String, Option<Value>) {
    let (program, analysis) = front_end(source);
    assert!(
        analysis.errors.is_empty(),
        "unexpected analysis errors: {:?}",
        analysis.errors
    );
    let (output, result) = interpret(&program, &analysis);
    (output, result.unwrap())
}

#[test]
fn test_fibonacci() {
    let source = "
fun fib(n: Int): Int {
    if n < 2 { return n }
    return fib(n - 1) + fib(n - 2)
}
var i: Int = 0
while i < 8 {
    print(\"\" + fib(i))
    i = i + 1
}
";
    let (output, _) = run(source);
    assert_eq!(output, "0\n1\n1\n2\n3\n5\n8\n13\n");
}

#[test]
fn test_matrix_pipeline() {
    let source = "
var weights: Float[][] = [[0.5, 0.5], [1.0, 0.0]]
var inputs: Int[] = [4, 2]
var result: Float[][] = weights @ [[4], [2]]
print(\"\" + result)
print(\"\" + (inputs.sum + inputs.avg))
";
    let (output, _) = run(source);
    assert_eq!(output, "[[3.0], [4.0]]\n9.0\n");
}

#[test]
fn test_statistics_over_arrays() {
    let source = "
var grid: Int[][] = [[1, 2, 3], [4, 5, 6]]
print(\"\" + grid.length)
print(\"\" + grid.count)
print(\"\" + grid.sum)
print(\"\" + grid.avg)
print(\"\" + grid.nDim)
print(\"\" + (grid * 2))
";
    let (output, _) = run(source);
    assert_eq!(
        output,
        "2\n6\n21\n3.5\n2\n[[2, 4, 6], [8, 10, 12]]\n"
    );
}

#[test]
fn test_fraction_class_program() {
    let source = "
class Fraction {
    var n: Int
    var d: Int
    fun plus(o: Fraction): Fraction {
        return $Fraction(n * o.d + o.n * d, d * o.d)
    }
    fun mul(o: Fraction): Fraction {
        return $Fraction(n * o.n, d * o.d)
    }
}
var half: Fraction = $Fraction(1, 2)
var third: Fraction = $Fraction(1, 3)
print(\"\" + (half + third))
print(\"\" + (half * third))
";
    let (output, _) = run(source);
    assert_eq!(output, "Fraction(n=5, d=6)\nFraction(n=1, d=6)\n");
}

#[test]
fn test_struct_program() {
    let source = "
struct Point {
    var x: Int
    var y: Int
}
fun norm(p: Point): Int {
    return p.x * p.x + p.y * p.y
}
var p: Point = $Point(3, 4)
p.x = 6
return norm(p)
";
    let (_, result) = run(source);
    assert_eq!(result, Some(Value::Int(52)));
}

#[test]
fn test_program_returns_value() {
    let (output, result) = run("print(\"computing\")\nreturn 6 * 7");
    assert_eq!(output, "computing\n");
    assert_eq!(result, Some(Value::Int(42)));
}

#[test]
fn test_semantic_errors_stop_execution() {
    let (_, analysis) = front_end("var x: Int = true\nprint(\"\" + y)");
    let messages: Vec<&str> = analysis
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect();
    assert!(messages.contains(&"expected Int but got Bool"));
    assert!(messages.contains(&"Could not resolve: y"));
}

#[test]
fn test_runtime_error_carries_position() {
    let (program, analysis) = front_end("var xs: Int[] = [1, 2]\nreturn xs[9]");
    assert!(analysis.errors.is_empty());

    let (_, result) = interpret(&program, &analysis);
    let error = result.unwrap_err();
    assert_eq!(error.kind.name(), "IndexOutOfRange");
    // The position points into the second line
    assert!(error.span.start.0 >= 23);
}

#[test]
fn test_parse_error_is_reported() {
    let tokens = tokenize(
        "var = 1".to_string(),
        Some(String::from("test.sl")),
    )
    .unwrap();
    assert!(parse(tokens, Rc::new(String::from("test.sl"))).is_err());
}
