//! Parser module for building the Abstract Syntax Tree.
//!
//! A Pratt parser: expressions are parsed through NUD (null denotation)
//! and LED (left denotation) handler tables with binding powers for
//! precedence, statements through a per-keyword handler table, and type
//! annotations through a separate NUD/LED table pair.
//!
//! Semicolons are optional statement separators and are skipped wherever
//! a statement may start.

pub mod expr;
pub mod lookups;
pub mod parser;
pub mod stmt;
pub mod types;

#[cfg(test)]
mod tests;
