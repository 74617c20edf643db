//! Lexical analysis.
//!
//! Converts source text into a stream of spanned tokens using a table of
//! regex patterns with per-pattern handlers. Keywords are resolved through
//! a reserved-word map, and comments and whitespace are skipped.

pub mod lexer;
pub mod tokens;
