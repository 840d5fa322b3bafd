//! # Remote Platform
//!
//! The operations the deployer needs from a serverless execution platform.
//! Remote state is never cached; every deploy asks again.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::functions::FunctionError;

/// Entry point every deployed package exposes
pub const HANDLER: &str = "index.handler";

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform call failures
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The function, alias or version does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Remote(String),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

impl From<PlatformError> for FunctionError {
    fn from(err: PlatformError) -> Self {
        FunctionError::Remote(err.to_string())
    }
}

/// Settings applied to a remote function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFunctionConfig {
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub role: String,
    pub runtime: String,
    pub handler: String,
    /// Dead-letter target ARN
    pub dead_letter_target: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

/// Remote metadata of an existing function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFunctionState {
    pub content_hash: String,
    /// A code or configuration update is still being applied
    pub update_in_progress: bool,
}

/// Content hash the platform reports for a package: base64 SHA-256
pub fn content_hash(package: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(package))
}

/// Remote serverless platform
#[async_trait]
pub trait Platform: Send + Sync {
    /// Current metadata, or [`PlatformError::NotFound`]
    async fn get_function_config(&self, name: &str) -> PlatformResult<RemoteFunctionState>;

    /// Create the function and publish its first version
    async fn create_function(
        &self,
        name: &str,
        package: &[u8],
        config: &RemoteFunctionConfig,
    ) -> PlatformResult<String>;

    /// Content hash the package would have once uploaded; changes nothing
    async fn check_code(&self, name: &str, package: &[u8]) -> PlatformResult<String>;

    /// Upload code and publish it as a new version
    async fn publish_code(&self, name: &str, package: &[u8]) -> PlatformResult<String>;

    async fn update_config(&self, name: &str, config: &RemoteFunctionConfig) -> PlatformResult<()>;

    /// Version the alias points at, or [`PlatformError::NotFound`]
    async fn get_alias(&self, name: &str, alias: &str) -> PlatformResult<String>;

    async fn create_alias(&self, name: &str, alias: &str, version: &str) -> PlatformResult<()>;

    async fn update_alias(&self, name: &str, alias: &str, version: &str) -> PlatformResult<()>;

    async fn delete_version(&self, name: &str, version: &str) -> PlatformResult<()>;
}
