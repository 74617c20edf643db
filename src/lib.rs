#![allow(clippy::module_inception)]

use std::rc::Rc;

use crate::errors::errors::{Error, ErrorTip, RuntimeError, SemanticError};

pub mod analyzer;
pub mod ast;
pub mod errors;
pub mod interpreter;
pub mod lexer;
pub mod macros;
pub mod parser;

extern crate regex;

/// A byte offset into a named source file.
#[derive(Debug, Clone)]
pub struct Position(pub u32, pub Rc<String>);

impl Position {
    pub fn null() -> Self {
        Position(0, Rc::new(String::from("<null>")))
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn null() -> Self {
        Span {
            start: Position::null(),
            end: Position::null(),
        }
    }
}

/// Resolves a byte offset to (line number, line text, column) over the
/// in-memory source.
pub fn get_line_at_position(source: &str, position: u32) -> (usize, String, usize) {
    let pos = (position as usize).min(source.len().saturating_sub(1));

    let mut start = 0;
    let mut line_number = 1;

    for line in source.split_inclusive('\n') {
        let end = start + line.len();

        if (start..end).contains(&pos) {
            let line_pos = pos - start;
            return (line_number, line.to_string(), line_pos);
        }

        start = end;
        line_number += 1;
    }

    (line_number, String::new(), 0)
}

pub fn display_error(error: &Error, source: &str) {
    let tip = match error.get_tip() {
        ErrorTip::None => None,
        tip => Some(tip.to_string()),
    };

    display_diagnostic(
        error.get_error_name(),
        tip.as_deref(),
        error.get_position(),
        source,
    );
}

pub fn display_semantic_error(error: &SemanticError, source: &str) {
    display_diagnostic("SemanticError", Some(&error.message), &error.span.start, source);
}

pub fn display_runtime_error(error: &RuntimeError, source: &str) {
    display_diagnostic(
        error.kind.name(),
        Some(&error.kind.to_string()),
        &error.span.start,
        source,
    );
}

fn display_diagnostic(name: &str, tip: Option<&str>, position: &Position, source: &str) {
    /*
        Error: name (tip)
        -> final.sl
           |
        20 | var a = #
           | --------^
    */

    let (line, line_text, line_pos) = get_line_at_position(source, position.0);

    let line_string = line.to_string();
    let padding = line_string.len() + 2;

    match tip {
        None => println!("Error: {}", name),
        Some(tip) => println!("Error: {} ({})", name, tip),
    }
    println!("-> {}", position.1);
    println!("{:>padding$}", "|");

    let (line_text_removed, removed_whitespace) = remove_starting_whitespace(&line_text);
    println!("{} | {}", line_string, line_text_removed.trim());

    let arrows = line_pos.saturating_sub(removed_whitespace) + 1;

    println!("{:>padding$} {:->arrows$}", "|", "^");
}

fn remove_starting_whitespace(string: &str) -> (String, usize) {
    let mut start = 0;
    for c in string.chars() {
        if c == ' ' {
            start += 1;
        } else {
            break;
        }
    }

    (String::from(&string[start..]), start)
}
