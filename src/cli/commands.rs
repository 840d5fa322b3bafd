//! CLI command implementations
//!
//! Each command loads the configuration once, discovers functions under the
//! project root and then either deploys them in order or serves them locally.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::bundle::{CommandCompiler, Compiler, PassthroughCompiler};
use crate::codegen::CodeGenerator;
use crate::deploy::{Credentials, DeploySettings, Deployer, LambdaPlatform, ZipArchiver};
use crate::functions::{discover, FunctionDescriptor};
use crate::http_server::{HttpServer, HttpServerConfig, Router};
use crate::runtime::{HotTransformPipeline, NodeRuntime};

use super::args::{Cli, Command, ProjectArgs};
use super::config::Config;
use super::errors::{CliError, CliErrorCode, CliResult};
use super::io::{deploy_report, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Deploy {
            stage,
            names,
            project,
        } => deploy(&project, &stage, &names),
        Command::Run {
            stage,
            port,
            host,
            project,
        } => serve(&project, &stage, &host, port),
    }
}

/// Deploy the named functions, or all of them, to `stage`
pub fn deploy(project: &ProjectArgs, stage: &str, names: &[String]) -> CliResult<()> {
    let root = project.root()?;
    let config = Config::load(&project.config_path(&root))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let descriptors = discover_functions(&config, &root, names).await?;
        let deployer = build_deployer(&config, &root, stage)?;

        match deployer.deploy_all(&descriptors).await {
            Ok(outcomes) => {
                let mut stdout = io::stdout();
                for outcome in &outcomes {
                    write_response(&mut stdout, deploy_report(outcome))?;
                }
                Ok(())
            }
            Err(e) => {
                let err = CliError::deploy_failed(e.to_string());
                write_error(err.code_str(), err.message())?;
                Err(err)
            }
        }
    })
}

/// Serve every function locally on `host:port`
pub fn serve(project: &ProjectArgs, stage: &str, host: &str, port: u16) -> CliResult<()> {
    let root = project.root()?;
    let config = Config::load(&project.config_path(&root))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let descriptors = discover_functions(&config, &root, &[]).await?;
        let router = Router::new(descriptors);
        info!(routes = router.functions().len(), stage, "route table built");

        let runtime = NodeRuntime::new(config.runtime.command.clone())?;
        let pipeline = HotTransformPipeline::new(
            generator(&config, &root)?,
            compiler(&config)?,
            Arc::new(runtime),
            stage,
            &config.production_stages,
        )
        .with_env(config.env.clone());

        HttpServer::new(HttpServerConfig::new(host, port), router, pipeline)
            .start()
            .await
            .map_err(|e| CliError::serve_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Discover functions; an empty `names` means all of them
async fn discover_functions(
    config: &Config,
    root: &Path,
    names: &[String],
) -> CliResult<Vec<FunctionDescriptor>> {
    let options = config.discovery_options()?;
    let requested = (!names.is_empty()).then_some(names);
    Ok(discover(requested, root, &options).await?)
}

fn generator(config: &Config, root: &Path) -> CliResult<CodeGenerator> {
    let mut generator = CodeGenerator::new(root).with_overrides(&config.code)?;
    if let Some(aws) = &config.aws {
        generator = generator.with_parameter("region", aws.region.clone());
    }
    Ok(generator)
}

fn compiler(config: &Config) -> CliResult<Arc<dyn Compiler>> {
    match &config.bundler.command {
        Some(argv) => Ok(Arc::new(CommandCompiler::new(argv.clone())?)),
        None => Ok(Arc::new(PassthroughCompiler)),
    }
}

/// Deploys need a bundler: the wrapper imports the user module, and the
/// package only holds the compiled `index.js`.
fn build_deployer(config: &Config, root: &Path, stage: &str) -> CliResult<Deployer> {
    let aws = config.aws()?;
    let bundler = config.bundler.command.clone().ok_or_else(|| {
        CliError::config_error(
            "bundler.command is required to deploy, so the package is self-contained",
        )
    })?;
    let credentials =
        Credentials::resolve(aws.access_key_id.as_deref(), aws.secret_access_key.as_deref())?;
    let platform = LambdaPlatform::new(&aws.region, credentials)?;

    let settings = DeploySettings {
        project: config.name.clone(),
        stage: stage.to_string(),
        timeout: config.timeout,
        env: config.env.clone(),
        tags: config.tags.clone(),
        role: aws.role.clone(),
        runtime: aws.runtime.clone(),
        dead_letter_target: aws.dlq.clone(),
    };

    Deployer::new(
        Arc::new(platform),
        generator(config, root)?,
        Arc::new(CommandCompiler::new(bundler)?),
        Arc::new(ZipArchiver),
        settings,
    )
    .map_err(|e| CliError::new(CliErrorCode::ConfigError, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(temp: &TempDir, config: &str) -> ProjectArgs {
        std::fs::write(temp.path().join("fnctl.json"), config).unwrap();
        ProjectArgs {
            config: "fnctl.json".into(),
            cwd: Some(temp.path().to_path_buf()),
        }
    }

    #[test]
    fn test_deploy_requires_aws_section() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp, r#"{ "name": "shop" }"#);

        let err = deploy(&project, "dev", &[]).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_deploy_rejects_invalid_role() {
        let temp = TempDir::new().unwrap();
        let project = project(
            &temp,
            r#"{
                "name": "shop",
                "aws": {
                    "region": "us-east-1",
                    "accessKeyId": "AKID",
                    "secretAccessKey": "secret",
                    "role": "lambda-role"
                },
                "bundler": { "command": ["cp", "{input}", "{output}"] }
            }"#,
        );

        let err = deploy(&project, "dev", &[]).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
        assert!(err.message().contains("IAM role"));
    }

    #[test]
    fn test_deploy_requires_bundler() {
        let temp = TempDir::new().unwrap();
        let project = project(
            &temp,
            r#"{
                "name": "shop",
                "aws": {
                    "region": "us-east-1",
                    "accessKeyId": "AKID",
                    "secretAccessKey": "secret",
                    "role": "arn:aws:iam::123456789012:role/lambda"
                }
            }"#,
        );

        let err = deploy(&project, "dev", &[]).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
        assert!(err.message().contains("bundler.command"));
    }

    #[test]
    fn test_missing_names_fail_before_deploying() {
        let temp = TempDir::new().unwrap();
        let project = project(&temp, r#"{ "name": "shop" }"#);

        let err = deploy(&project, "dev", &["ghost".to_string()]).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::DiscoveryError);
        assert!(err.message().contains("ghost"));
    }

    #[test]
    fn test_missing_config() {
        let temp = TempDir::new().unwrap();
        let project = ProjectArgs {
            config: "fnctl.json".into(),
            cwd: Some(temp.path().to_path_buf()),
        };
        let err = serve(&project, "dev", "127.0.0.1", 0).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}
