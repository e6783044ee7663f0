//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::display::{
    format_cluster_detail, format_cluster_list, format_discovery, format_report,
    format_validation,
};
use super::{ClusterArgs, Commands, OutputArgs};
use crate::discovery::DiscoveryOutcome;
use crate::inventory::ClusterInventory;
use crate::kubeconfig::{self, KubeconfigError};
use crate::registry::RegistryError;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("Cluster not found: {0}")]
    NotFound(String),

    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("Failed to read {0}: {1}")]
    Io(String, std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serve is not a one-shot command")]
    NotOneShot,
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Text to print and whether the command succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self {
            text,
            success: true,
        }
    }
}

fn render<T: Serialize>(output: OutputArgs, value: &T, table: impl FnOnce(&T) -> String) -> CommandResult<String> {
    if output.json {
        Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
    } else {
        Ok(table(value))
    }
}

// ============================================================================
// Offline commands
// ============================================================================

/// Validate a kubeconfig file without touching any cluster
pub fn validate_file(path: &Path) -> CommandResult<CommandOutput> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CommandError::Io(path.display().to_string(), e))?;
    let summary = kubeconfig::validate(&text)?;
    Ok(CommandOutput::ok(format_validation(&summary)))
}

// ============================================================================
// Inventory commands
// ============================================================================

pub async fn list_clusters(inventory: &ClusterInventory, output: OutputArgs) -> CommandResult<CommandOutput> {
    let clusters = inventory.list().await?;
    let text = render(output, &clusters, |c| format_cluster_list(c))?;
    Ok(CommandOutput::ok(text))
}

pub async fn get_cluster(inventory: &ClusterInventory, args: &ClusterArgs) -> CommandResult<CommandOutput> {
    let cluster = inventory
        .get(&args.id)
        .await?
        .ok_or_else(|| CommandError::NotFound(args.id.clone()))?;
    let text = render(args.output, &cluster, format_cluster_detail)?;
    Ok(CommandOutput::ok(text))
}

/// Run a connection test; the output is unsuccessful when the cluster
/// could not be reached
pub async fn test_cluster(inventory: &ClusterInventory, args: &ClusterArgs) -> CommandResult<CommandOutput> {
    let report = inventory.test_connection(&args.id).await;
    let text = render(args.output, &report, |r| format_report(&args.id, r))?;
    Ok(CommandOutput {
        text,
        success: report.connected,
    })
}

/// Deleting an unknown id succeeds
pub async fn delete_cluster(inventory: &ClusterInventory, cluster_id: &str) -> CommandResult<CommandOutput> {
    inventory.delete(cluster_id).await?;
    Ok(CommandOutput::ok(format!("Cluster {} deleted\n", cluster_id)))
}

pub async fn discover(inventory: &ClusterInventory, force: bool) -> CommandResult<CommandOutput> {
    let outcome = inventory.discover(force).await;
    Ok(CommandOutput {
        text: format_discovery(&outcome),
        success: !matches!(outcome, DiscoveryOutcome::Failed(_)),
    })
}

/// Dispatch a one-shot subcommand
pub async fn run_command(inventory: &ClusterInventory, command: &Commands) -> CommandResult<CommandOutput> {
    match command {
        Commands::List(output) => list_clusters(inventory, *output).await,
        Commands::Get(args) => get_cluster(inventory, args).await,
        Commands::Test(args) => test_cluster(inventory, args).await,
        Commands::Delete(args) => delete_cluster(inventory, &args.id).await,
        Commands::Discover(args) => discover(inventory, args.force).await,
        Commands::Validate(args) => validate_file(&args.file),
        Commands::Serve(_) => Err(CommandError::NotOneShot),
    }
}
