use std::{env, fs::read_to_string, process::ExitCode, rc::Rc, time::Instant};

use slate::{
    analyzer::analyze, display_error, display_runtime_error, display_semantic_error,
    interpreter::interpret, lexer::lexer::tokenize, parser::parser::parse,
};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <file>", args[0]);
        return ExitCode::FAILURE;
    }

    let file_path: &str = &args[1];
    let file_name = match file_path.rsplit('/').next() {
        Some(name) => name,
        None => file_path,
    };

    let source = match read_to_string(file_path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Failed to read {}: {}", file_path, error);
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();

    let tokens = match tokenize(source.clone(), Some(String::from(file_name))) {
        Ok(tokens) => tokens,
        Err(error) => {
            display_error(&error, &source);
            return ExitCode::FAILURE;
        }
    };

    println!("Tokenized in {:?}", start.elapsed());

    let parse_start = Instant::now();
    let program = match parse(tokens, Rc::new(String::from(file_name))) {
        Ok(program) => program,
        Err(error) => {
            display_error(&error, &source);
            return ExitCode::FAILURE;
        }
    };

    println!("Parsed in {:?}", parse_start.elapsed());

    let analyze_start = Instant::now();
    let analysis = analyze(&program);

    println!("Analyzed in {:?}", analyze_start.elapsed());

    if !analysis.errors.is_empty() {
        for error in &analysis.errors {
            display_semantic_error(error, &source);
        }
        return ExitCode::FAILURE;
    }

    let run_start = Instant::now();
    let (output, result) = interpret(&program, &analysis);

    print!("{}", output);

    match result {
        Ok(value) => {
            if let Some(value) = value {
                println!("Program returned {}", value);
            }
            println!("Ran in {:?}", run_start.elapsed());
            println!("Total time: {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(error) => {
            display_runtime_error(&error, &source);
            ExitCode::FAILURE
        }
    }
}
