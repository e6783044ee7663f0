//! CLI module for cluster-inventory
//!
//! Subcommands:
//! - `cluster-inventory serve` - Run discovery, the status monitor and the HTTP API
//! - `cluster-inventory list` - List registered clusters
//! - `cluster-inventory get` - Show one cluster
//! - `cluster-inventory test` - Test connectivity to a cluster
//! - `cluster-inventory delete` - Remove a cluster
//! - `cluster-inventory discover` - Register the hosting cluster
//! - `cluster-inventory validate` - Check a kubeconfig file

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{kubeconfig_path_from, InventoryConfig, DEFAULT_NAMESPACE, DEFAULT_PORT};
use crate::tester::DEFAULT_PROBE_TIMEOUT;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "cluster-inventory")]
#[command(about = "Kubernetes cluster inventory backed by Secrets and a ConfigMap")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Namespace holding the kubeconfig Secrets and the metadata ConfigMap
    #[arg(long, env = "NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    pub namespace: String,

    /// Kubeconfig for the control plane when not running in a cluster
    #[arg(long, env = "KUBECONFIG", value_name = "PATH", global = true)]
    pub kubeconfig: Option<String>,

    /// Timeout in seconds for control-plane requests and connection probes
    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs(), global = true)]
    pub probe_timeout_secs: u64,

    /// Attempts for a metadata write that keeps conflicting
    #[arg(long, env = "METADATA_MAX_ATTEMPTS", default_value_t = 5, global = true)]
    pub metadata_max_attempts: u32,
}

impl Settings {
    pub fn to_config(&self) -> InventoryConfig {
        InventoryConfig {
            namespace: self.namespace.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            metadata_max_attempts: self.metadata_max_attempts.max(1),
            check_interval: None,
            kubeconfig_path: self.kubeconfig.as_deref().and_then(kubeconfig_path_from),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the inventory HTTP API
    Serve(ServeArgs),

    /// List registered clusters
    #[command(visible_alias = "ls")]
    List(OutputArgs),

    /// Show one cluster
    Get(ClusterArgs),

    /// Test connectivity to a cluster and record the result
    Test(ClusterArgs),

    /// Remove a cluster and its kubeconfig
    #[command(visible_alias = "rm")]
    Delete(ClusterArgs),

    /// Register the cluster this process runs in
    Discover(DiscoverArgs),

    /// Validate a kubeconfig file
    Validate(ValidateArgs),
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address for the server
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds between background connection checks (0 disables)
    #[arg(long, env = "CHECK_INTERVAL_SECS", default_value_t = 0)]
    pub check_interval_secs: u64,

    /// Skip the in-cluster discovery at startup
    #[arg(long)]
    pub no_discovery: bool,
}

impl ServeArgs {
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn check_interval(&self) -> Option<Duration> {
        (self.check_interval_secs > 0).then(|| Duration::from_secs(self.check_interval_secs))
    }
}

/// Output selection for read commands
#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments naming a single cluster
#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Cluster id
    pub id: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the discover command
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Register even if a matching cluster already exists
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the kubeconfig file
    pub file: PathBuf,
}
