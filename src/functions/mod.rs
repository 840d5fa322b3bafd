//! # Functions
//!
//! Function descriptors, discovery over a project tree, and the response
//! contract every generated entry point answers with.

pub mod descriptor;
pub mod discovery;
pub mod errors;
pub mod response;

pub use descriptor::{FunctionDescriptor, HttpMethod, DESCRIPTOR_FILE, ENTRY_FILE};
pub use discovery::{discover, DiscoveryOptions};
pub use errors::{FunctionError, FunctionResult};
pub use response::{HandlerResponse, HttpError, HttpErrorKind};
