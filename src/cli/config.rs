//! Project configuration (`fnctl.json`)

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::errors::{CliError, CliResult};
use crate::codegen::CodePiece;
use crate::functions::DiscoveryOptions;
use crate::observability::Event;

/// Largest timeout the remote platform accepts, in seconds
const MAX_TIMEOUT_SECS: u32 = 900;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Project name, prefixed to every remote function name (required)
    pub name: String,

    /// Default function timeout in seconds
    #[serde(default)]
    pub timeout: Option<u32>,

    /// Environment shared by every function
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Code piece overrides, hook name to path
    #[serde(default)]
    pub code: BTreeMap<String, String>,

    /// Remote platform settings; only `deploy` needs them
    #[serde(default)]
    pub aws: Option<AwsConfig>,

    #[serde(default)]
    pub bundler: BundlerConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Directory regexes skipped by discovery (default: ["node_modules"])
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Stages whose compiled modules are cached (default: ["prod"])
    #[serde(default = "default_production_stages")]
    pub production_stages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsConfig {
    pub region: String,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// IAM role ARN the functions execute as
    pub role: String,

    /// Remote runtime identifier (default: "nodejs20.x")
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Dead letter target ARN
    #[serde(default)]
    pub dlq: Option<String>,
}

/// External compiler; without a command the generated source is used as-is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundlerConfig {
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Local interpreter used by `run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_command")]
    pub command: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: default_runtime_command(),
        }
    }
}

fn default_ignore() -> Vec<String> {
    vec!["node_modules".to_string()]
}

fn default_production_stages() -> Vec<String> {
    vec!["prod".to_string()]
}

fn default_runtime() -> String {
    "nodejs20.x".to_string()
}

fn default_runtime_command() -> Vec<String> {
    vec!["node".to_string()]
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config = Self::parse(&content)?;
        info!(event = %Event::ConfigLoaded, path = %path.display(), project = %config.name);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.name.is_empty() {
            return Err(CliError::config_error("name must not be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CliError::config_error(format!(
                "Invalid name: '{}'. Only letters, digits, '-' and '_' are allowed.",
                self.name
            )));
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
                return Err(CliError::config_error(format!(
                    "timeout must be between 1 and {} seconds",
                    MAX_TIMEOUT_SECS
                )));
            }
        }

        for key in self.code.keys() {
            key.parse::<CodePiece>().map_err(CliError::config_error)?;
        }

        if self.runtime.command.is_empty() {
            return Err(CliError::config_error("runtime.command must not be empty"));
        }
        if let Some(command) = &self.bundler.command {
            if command.is_empty() {
                return Err(CliError::config_error("bundler.command must not be empty"));
            }
        }

        self.discovery_options()?;

        Ok(())
    }

    /// Discovery options from the `ignore` patterns
    pub fn discovery_options(&self) -> CliResult<DiscoveryOptions> {
        DiscoveryOptions::from_patterns(&self.ignore)
            .map_err(|e| CliError::config_error(e.to_string()))
    }

    /// The `aws` section, required for deploying
    pub fn aws(&self) -> CliResult<&AwsConfig> {
        self.aws
            .as_ref()
            .ok_or_else(|| CliError::config_error("aws section is required to deploy"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::parse(r#"{ "name": "shop" }"#).unwrap();
        assert_eq!(config.ignore, vec!["node_modules"]);
        assert_eq!(config.production_stages, vec!["prod"]);
        assert_eq!(config.runtime.command, vec!["node"]);
        assert!(config.bundler.command.is_none());
        assert!(config.aws.is_none());
        assert!(config.aws().is_err());
    }

    #[test]
    fn test_aws_section() {
        let config = Config::parse(
            r#"{
                "name": "shop",
                "timeout": 30,
                "aws": {
                    "region": "eu-west-1",
                    "role": "arn:aws:iam::123456789012:role/lambda",
                    "dlq": "arn:aws:sqs:eu-west-1:123456789012:dlq"
                },
                "productionStages": ["prod", "live"]
            }"#,
        )
        .unwrap();
        let aws = config.aws().unwrap();
        assert_eq!(aws.runtime, "nodejs20.x");
        assert_eq!(aws.region, "eu-west-1");
        assert!(aws.access_key_id.is_none());
        assert_eq!(config.production_stages, vec!["prod", "live"]);
    }

    #[test]
    fn test_rejects_unknown_code_piece() {
        let err = Config::parse(r#"{ "name": "shop", "code": { "onCrash": "x.js" } }"#)
            .unwrap_err();
        assert_eq!(err.code_str(), "FNCTL_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::parse(r#"{ "name": "" }"#).is_err());
        assert!(Config::parse(r#"{ "name": "a b" }"#).is_err());
        assert!(Config::parse(r#"{ "name": "shop", "timeout": 0 }"#).is_err());
        assert!(Config::parse(r#"{ "name": "shop", "ignore": ["("] }"#).is_err());
        assert!(Config::parse(r#"{ "name": "shop", "runtime": { "command": [] } }"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = Config::load(&temp.path().join("fnctl.json")).unwrap_err();
        assert_eq!(err.code_str(), "FNCTL_CLI_CONFIG_ERROR");
    }
}
