//! CLI argument definitions using clap
//!
//! Commands:
//! - fnctl deploy <stage> [names...] --config <path> --cwd <dir>
//! - fnctl run <stage> <port> --host <addr> --config <path> --cwd <dir>

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// fnctl - discover, deploy and locally serve serverless functions
#[derive(Parser, Debug)]
#[command(name = "fnctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Path to configuration file, relative to the project root
    #[arg(long, default_value = "./fnctl.json")]
    pub config: PathBuf,

    /// Project root (default: current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

impl ProjectArgs {
    /// Project root directory
    pub fn root(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir(),
        }
    }

    /// Config path resolved against `root`
    pub fn config_path(&self, root: &Path) -> PathBuf {
        if self.config.is_absolute() {
            self.config.clone()
        } else {
            root.join(&self.config)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy functions to a stage
    Deploy {
        /// Stage to deploy, also the alias name
        stage: String,

        /// Only deploy these functions
        names: Vec<String>,

        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Serve functions locally
    Run {
        /// Stage the functions see in their metadata
        stage: String,

        /// Port to listen on
        #[arg(default_value_t = 8888)]
        port: u16,

        /// Address to bind; anything but loopback exposes the functions
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        project: ProjectArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
