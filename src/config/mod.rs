//! Runtime configuration and control-plane client selection

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::discovery::InClusterEnvironment;
use crate::kube::{DisconnectedApi, KubeApi, KubeApiClient, KubeError};
use crate::kubeconfig::{self, KubeconfigError};
use crate::storage::RetryPolicy;
use crate::tester::DEFAULT_PROBE_TIMEOUT;

/// Namespace holding the inventory objects when `NAMESPACE` is unset
pub const DEFAULT_NAMESPACE: &str = "sreagent";

pub const DEFAULT_PORT: u16 = 8001;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("Client error: {0}")]
    Client(#[from] KubeError),
}

/// Settings shared by every inventory component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Namespace of the Secrets and the metadata ConfigMap
    pub namespace: String,

    /// Timeout for every control-plane and probe request
    pub probe_timeout: Duration,

    /// Attempts for a conflicting metadata write
    pub metadata_max_attempts: u32,

    /// Status monitor period; `None` disables the monitor
    pub check_interval: Option<Duration>,

    /// Kubeconfig used for the control plane outside a cluster
    pub kubeconfig_path: Option<PathBuf>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            metadata_max_attempts: RetryPolicy::default().max_attempts,
            check_interval: None,
            kubeconfig_path: None,
        }
    }
}

impl InventoryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.metadata_max_attempts)
    }

    /// Explicit kubeconfig path, else `~/.kube/config`
    pub fn effective_kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig_path.clone().or_else(default_kubeconfig_path)
    }
}

/// `~/.kube/config`
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

/// First entry of a `KUBECONFIG`-style path list, tilde-expanded
pub fn kubeconfig_path_from(value: &str) -> Option<PathBuf> {
    value
        .split(':')
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
}

/// Where the control-plane client came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneSource {
    InCluster,
    Kubeconfig(PathBuf),
    /// No usable configuration; every call reports the backend unavailable
    Disconnected(String),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Read a kubeconfig file from disk
pub fn load_kubeconfig_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.display().to_string(), e))
}

/// The operator's own kubeconfig may point at files and credential plugins
async fn client_from_kubeconfig(path: &Path, timeout: Duration) -> Result<KubeApiClient, ConfigError> {
    let text = load_kubeconfig_file(path)?;
    let client_config = kubeconfig::local_client_config(&text).await?;
    Ok(KubeApiClient::new(client_config, timeout)?)
}

async fn client_in_cluster(
    environment: &InClusterEnvironment,
    timeout: Duration,
) -> Result<KubeApiClient, String> {
    let client_config = environment.client_config().await.map_err(|e| e.to_string())?;
    KubeApiClient::new(client_config, timeout).map_err(|e| e.to_string())
}

/// Build the client for the cluster that stores the inventory.
///
/// Tries the in-cluster identity, then the kubeconfig file. When neither
/// works the service still starts, on a client that fails every call.
pub async fn connect_control_plane(
    environment: &InClusterEnvironment,
    config: &InventoryConfig,
) -> (Arc<dyn KubeApi>, ControlPlaneSource) {
    let timeout = config.probe_timeout;

    if environment.is_in_cluster() {
        match client_in_cluster(environment, timeout).await {
            Ok(client) => {
                info!("Using in-cluster Kubernetes configuration");
                return (Arc::new(client), ControlPlaneSource::InCluster);
            }
            Err(e) => warn!("In-cluster configuration unusable: {}", e),
        }
    }

    let reason = match config.effective_kubeconfig_path() {
        Some(path) if path.is_file() => match client_from_kubeconfig(&path, timeout).await {
            Ok(client) => {
                info!("Using kubeconfig {}", path.display());
                return (Arc::new(client), ControlPlaneSource::Kubeconfig(path));
            }
            Err(e) => format!("failed to load kubeconfig {}: {}", path.display(), e),
        },
        Some(path) => format!("kubeconfig {} not found", path.display()),
        None => "no kubeconfig path available".to_string(),
    };

    warn!("Could not initialize Kubernetes client: {}", reason);
    (
        Arc::new(DisconnectedApi::new(reason.clone())),
        ControlPlaneSource::Disconnected(reason),
    )
}
