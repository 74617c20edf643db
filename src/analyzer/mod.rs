//! Semantic analysis.
//!
//! The analyzer runs a dependency-driven fixpoint over the syntax tree:
//! every node attribute (declaration types, expression types, static
//! shapes) is either pending, resolved or failed, and rounds repeat until
//! nothing is pending or a round makes no progress. Declarations register
//! as they are first visited, so top-level functions, structs and classes
//! may be used before their textual position.
//!
//! Diagnostics are collected rather than aborting, and a failed node
//! suppresses errors in everything built on top of it.

pub mod analyzer;
pub mod scope;
pub mod types;

pub use analyzer::{analyze, Analysis};

#[cfg(test)]
mod tests;
