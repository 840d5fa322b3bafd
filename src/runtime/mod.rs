//! # Local Runtime
//!
//! Runs functions on the developer's machine for the dev server.

pub mod node;
pub mod pipeline;

pub use node::{Invocation, ModuleRuntime, NodeRuntime};
pub use pipeline::{failure_response, CompiledModule, HotTransformPipeline};
