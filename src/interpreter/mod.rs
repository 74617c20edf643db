//! Tree-walking evaluation.
//!
//! Values follow reference semantics for arrays and instances (shared
//! `Rc` cells), printing goes to a captured output buffer, and runtime
//! failures abort evaluation with a positioned error.

pub mod env;
pub mod interpreter;
pub mod value;

pub use interpreter::interpret;

#[cfg(test)]
mod tests;
