//! fnctl - discover, generate, deploy and locally serve serverless functions
//!
//! A function is a directory holding a `function.json` descriptor and an
//! `index.js` entry module. fnctl wraps each one in a generated entry point,
//! compiles and archives it, and either publishes it under a stage alias or
//! serves it from a local dev server that rebuilds on every request.

pub mod bundle;
pub mod cli;
pub mod codegen;
pub mod deploy;
pub mod functions;
pub mod http_server;
pub mod observability;
pub mod runtime;
