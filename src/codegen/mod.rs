//! # Code Generation
//!
//! Every function is deployed and run through a generated wrapper module.
//! The wrapper is the user's default export surrounded by ten lifecycle
//! pieces and a fixed `handler(event, context, callback)` entry point that
//! answers exactly once per invocation.
//!
//! Pieces are built-in defaults unless the config `code` section points a
//! piece at a project file.

mod generator;
mod imports;
mod pieces;

pub use generator::{CodeGenerator, RESPONSE_MARKER};
pub use imports::{normalize, relative_specifier, rewrite_relative_imports};
pub use pieces::CodePiece;

/// Where a generated module is going to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerateMode {
    /// Bundled and uploaded to the remote platform
    Packaged,
    /// Run by the local dev server
    Local,
}
