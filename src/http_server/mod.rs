//! # Local HTTP Server
//!
//! Serves discovered functions for local development. Requests are matched
//! against descriptor path templates and run through the hot transform
//! pipeline, so edits to a function show up on the next request.
//!
//! - 404 `Not found` when no template has the request's path shape
//! - 405 `Method not allowed` with an `Allow` header when only the method differs

pub mod config;
pub mod router;
pub mod server;

pub use config::HttpServerConfig;
pub use router::{match_path, RouteMatch, Router};
pub use server::{parse_body, DevState, HttpServer};
