//! # Deployment
//!
//! Packages functions and deploys them to a remote serverless platform with
//! one published version live per stage alias.

pub mod alias;
pub mod archive;
pub mod lambda;
pub mod memory;
pub mod orchestrator;
pub mod platform;

pub use alias::{promote, Promotion};
pub use archive::{Archiver, ZipArchiver};
pub use lambda::{Credentials, LambdaPlatform};
pub use memory::{CallKind, MemoryPlatform, PlatformCall};
pub use orchestrator::{validate_role, DeployOutcome, DeploySettings, DeployState, Deployer};
pub use platform::{
    content_hash, Platform, PlatformError, PlatformResult, RemoteFunctionConfig,
    RemoteFunctionState,
};
