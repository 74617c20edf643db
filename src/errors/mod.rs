//! Error types for every stage of the pipeline.
//!
//! Front end errors carry a single position, semantic errors carry a span
//! and are collected, and runtime errors abort evaluation.

pub mod errors;
