/// AST (Abstract Syntax Tree) module
/// Contains all definitions related to the AST structure
///
/// Submodules:
/// - ast: expression nodes and operators
/// - statements: statement and declaration nodes
/// - types: type annotation nodes
pub mod ast;
pub mod statements;
pub mod types;
