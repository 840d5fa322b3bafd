//! # Deployment Orchestration
//!
//! Deploys functions one at a time. Live remote state decides whether a
//! function is `New`, `Unchanged` or `Changed`:
//!
//! - `New`: create with full configuration, publish, create the stage alias
//! - `Changed`: publish code, promote the stage alias, wait for the code
//!   update to settle, reconcile configuration
//! - `Unchanged`: reconcile configuration only
//!
//! The first error aborts the batch.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, info};

use super::alias::{promote, Promotion};
use super::archive::Archiver;
use super::platform::{Platform, RemoteFunctionConfig, HANDLER};
use crate::bundle::{compile_source, Compiler};
use crate::codegen::{CodeGenerator, GenerateMode};
use crate::functions::{FunctionDescriptor, FunctionError, FunctionResult};
use crate::observability::Event;

/// Deployment-wide settings
#[derive(Debug, Clone, Default)]
pub struct DeploySettings {
    /// Project name, prefixed to every remote function name
    pub project: String,
    pub stage: String,
    /// Default timeout for functions that set none
    pub timeout: Option<u32>,
    pub env: std::collections::BTreeMap<String, String>,
    pub tags: std::collections::BTreeMap<String, String>,
    pub role: String,
    pub runtime: String,
    pub dead_letter_target: Option<String>,
}

/// Where a function stands relative to the remote platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    /// Does not exist remotely
    New,
    /// Remote code matches the new package
    Unchanged,
    /// Remote code differs from the new package
    Changed,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployState::New => "new",
            DeployState::Unchanged => "unchanged",
            DeployState::Changed => "changed",
        };
        f.write_str(s)
    }
}

/// What happened to one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub function: String,
    pub remote_name: String,
    pub state: DeployState,
    /// Version published by this deploy
    pub version: Option<String>,
    pub promotion: Option<Promotion>,
    pub package_bytes: usize,
}

fn role_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^arn:aws:iam::(\d{12}):role/\S+$")
            .unwrap_or_else(|e| unreachable!("static role pattern: {}", e))
    })
}

/// Check the IAM role format and return its account id
pub fn validate_role(role: &str) -> FunctionResult<String> {
    role_pattern()
        .captures(role)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            FunctionError::Config(format!(
                "Incorrect IAM role format, expected something like \"arn:aws:iam::123456789012:role/name\". Got \"{}\".",
                role
            ))
        })
}

/// Sequential deployer
pub struct Deployer {
    platform: Arc<dyn Platform>,
    generator: CodeGenerator,
    compiler: Arc<dyn Compiler>,
    archiver: Arc<dyn Archiver>,
    settings: DeploySettings,
    update_poll_interval: Duration,
    update_poll_attempts: u32,
}

impl Deployer {
    /// Fails on an invalid IAM role before anything is sent
    pub fn new(
        platform: Arc<dyn Platform>,
        generator: CodeGenerator,
        compiler: Arc<dyn Compiler>,
        archiver: Arc<dyn Archiver>,
        settings: DeploySettings,
    ) -> FunctionResult<Self> {
        validate_role(&settings.role)?;
        Ok(Self {
            platform,
            generator,
            compiler,
            archiver,
            settings,
            update_poll_interval: Duration::from_secs(1),
            update_poll_attempts: 60,
        })
    }

    /// How often and how many times to check a pending code update
    pub fn with_update_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.update_poll_interval = interval;
        self.update_poll_attempts = attempts;
        self
    }

    /// Poll until the platform no longer reports an update in progress
    async fn wait_for_update(&self, name: &str) -> FunctionResult<()> {
        for attempt in 1..=self.update_poll_attempts {
            if !self.platform.get_function_config(name).await?.update_in_progress {
                return Ok(());
            }
            debug!(event = %Event::UpdatePending, function = %name, attempt);
            tokio::time::sleep(self.update_poll_interval).await;
        }
        Err(FunctionError::Remote(format!(
            "{} is still updating after {} checks",
            name, self.update_poll_attempts
        )))
    }

    pub fn remote_name(&self, descriptor: &FunctionDescriptor) -> String {
        format!("{}-{}", self.settings.project, descriptor.name)
    }

    /// Remote configuration: descriptor values over deployment defaults
    pub fn function_config(&self, descriptor: &FunctionDescriptor) -> RemoteFunctionConfig {
        let mut environment = self.settings.env.clone();
        environment.extend(descriptor.env.clone());

        let mut tags = self.settings.tags.clone();
        tags.extend(descriptor.tags.clone());

        RemoteFunctionConfig {
            memory_mb: descriptor.memory_mb(),
            timeout_secs: descriptor.timeout_secs(self.settings.timeout),
            role: self.settings.role.clone(),
            runtime: self.settings.runtime.clone(),
            handler: HANDLER.to_string(),
            dead_letter_target: self.settings.dead_letter_target.clone(),
            environment,
            tags,
        }
    }

    /// Generate, compile and archive one function
    pub async fn package(&self, descriptor: &FunctionDescriptor) -> FunctionResult<Vec<u8>> {
        let source = self
            .generator
            .generate(descriptor, &self.settings.stage, GenerateMode::Packaged)
            .await?;

        let dir = self.generator.module_dir(descriptor, GenerateMode::Packaged);
        let artifact = compile_source(self.compiler.as_ref(), &source, dir).await?;

        let package = self.archiver.archive(&artifact)?;
        info!(
            event = %Event::ArchiveWritten,
            function = %descriptor.name,
            bytes = package.len(),
        );
        Ok(package)
    }

    /// Deploy every descriptor in order, stopping at the first failure
    pub async fn deploy_all(
        &self,
        descriptors: &[FunctionDescriptor],
    ) -> FunctionResult<Vec<DeployOutcome>> {
        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match self.deploy_function(descriptor).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(
                        event = %Event::DeployFailed,
                        function = %descriptor.name,
                        stage = %self.settings.stage,
                        error = %e,
                    );
                    return Err(e);
                }
            }
        }
        Ok(outcomes)
    }

    pub async fn deploy_function(
        &self,
        descriptor: &FunctionDescriptor,
    ) -> FunctionResult<DeployOutcome> {
        let name = self.remote_name(descriptor);
        let stage = self.settings.stage.as_str();

        info!(event = %Event::DeployBegin, function = %name, stage);

        let package = self.package(descriptor).await?;
        let config = self.function_config(descriptor);

        let remote = match self.platform.get_function_config(&name).await {
            Ok(remote) => Some(remote),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let (state, version, promotion) = match remote {
            None => {
                let created = self
                    .platform
                    .create_function(&name, &package, &config)
                    .await?;
                info!(event = %Event::FunctionCreated, function = %name, version = %created);
                let promotion = promote(self.platform.as_ref(), &name, stage, &created).await?;
                (DeployState::New, Some(created), Some(promotion))
            }
            Some(remote) => {
                let candidate = self.platform.check_code(&name, &package).await?;
                let outcome = if candidate == remote.content_hash {
                    info!(event = %Event::CodeUnchanged, function = %name);
                    (DeployState::Unchanged, None, None)
                } else {
                    let published = self.platform.publish_code(&name, &package).await?;
                    info!(event = %Event::CodePublished, function = %name, version = %published);
                    let promotion =
                        promote(self.platform.as_ref(), &name, stage, &published).await?;
                    self.wait_for_update(&name).await?;
                    (DeployState::Changed, Some(published), Some(promotion))
                };

                // Drift correction runs whether or not the code changed.
                self.platform.update_config(&name, &config).await?;
                info!(event = %Event::ConfigUpdated, function = %name);
                outcome
            }
        };

        info!(
            event = %Event::DeployComplete,
            function = %name,
            stage,
            state = %state,
            version = version.as_deref().unwrap_or("-"),
        );

        Ok(DeployOutcome {
            function: descriptor.name.clone(),
            remote_name: name,
            state,
            version,
            promotion,
            package_bytes: package.len(),
        })
    }
}
