//! In-cluster auto-discovery
//!
//! When the service runs inside a pod, the cluster it runs in is registered
//! once with a kubeconfig built from the mounted service account. Discovery
//! never fails startup: every error ends up in a [`DiscoveryOutcome`].

pub mod environment;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::kube::KubeApi;
use crate::kubeconfig::KubeconfigError;
use crate::record::{Cluster, NewCluster};
use crate::registry::{ClusterRegistry, RegistryError};

pub use environment::{InClusterEnvironment, InClusterIdentity, SERVICE_ACCOUNT_DIR};

/// Node labels consulted for a cluster name, in order
pub const CLUSTER_NAME_LABELS: [&str; 3] = ["cluster-name", "kubernetes.io/cluster-name", "cluster"];

/// Substring marking a cluster as the discovered in-cluster entry
pub const IN_CLUSTER_MARKER: &str = "in-cluster";

pub const DISCOVERY_TAGS: [&str; 2] = ["auto-discovered", "in-cluster"];

const FALLBACK_CLUSTER_NAME: &str = "kubernetes";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Not running inside a Kubernetes cluster")]
    NotInCluster,

    #[error("Failed to read service account file {0}: {1}")]
    Identity(String, String),

    #[error("Failed to build in-cluster kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("Failed to load in-cluster client configuration: {0}")]
    ClientConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of a lookup whose failure only degrades the answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort<T> {
    Found(T),
    Unavailable(String),
}

impl<T> BestEffort<T> {
    pub fn found(self) -> Option<T> {
        match self {
            BestEffort::Found(value) => Some(value),
            BestEffort::Unavailable(_) => None,
        }
    }
}

/// What a discovery run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    NotInCluster,
    AlreadyRegistered(String),
    Registered(String),
    Failed(String),
}

impl DiscoveryOutcome {
    pub fn cluster_id(&self) -> Option<&str> {
        match self {
            DiscoveryOutcome::AlreadyRegistered(id) | DiscoveryOutcome::Registered(id) => Some(id),
            DiscoveryOutcome::NotInCluster | DiscoveryOutcome::Failed(_) => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DiscoveryOutcome::NotInCluster => "Not running in-cluster".to_string(),
            DiscoveryOutcome::AlreadyRegistered(_) => {
                "In-cluster configuration already registered".to_string()
            }
            DiscoveryOutcome::Registered(_) => {
                "Successfully discovered and registered in-cluster configuration".to_string()
            }
            DiscoveryOutcome::Failed(reason) => format!("In-cluster discovery failed: {}", reason),
        }
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// First cluster-name label found among a node's labels
pub fn cluster_label<'a>(labels: impl Fn(&str) -> Option<&'a String>) -> Option<&'a str> {
    CLUSTER_NAME_LABELS
        .into_iter()
        .filter_map(|key| labels(key))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}

/// `in-cluster-<name>`, suffixed with the namespace unless it is `default`
pub fn derive_cluster_name(label: Option<&str>, service_host: Option<&str>, namespace: &str) -> String {
    let base = label
        .or(service_host)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_CLUSTER_NAME);
    if namespace.is_empty() || namespace == "default" {
        format!("{}-{}", IN_CLUSTER_MARKER, base)
    } else {
        format!("{}-{}-{}", IN_CLUSTER_MARKER, base, namespace)
    }
}

/// A cluster that counts as the in-cluster entry already
pub fn find_existing<'a>(clusters: &'a [Cluster], derived_name: &str) -> Option<&'a Cluster> {
    clusters.iter().find(|c| {
        c.name() == derived_name || c.name().to_lowercase().contains(IN_CLUSTER_MARKER)
    })
}

pub fn discovery_description(namespace: &str, api_server: &str) -> String {
    format!(
        "Auto-discovered in-cluster configuration (namespace: {}, API: {})",
        namespace, api_server
    )
}

/// Registers the cluster this process runs in
#[derive(Clone)]
pub struct AutoDiscovery {
    registry: ClusterRegistry,
    api: Arc<dyn KubeApi>,
    environment: InClusterEnvironment,
}

impl AutoDiscovery {
    /// `api` is the client for the cluster being discovered; it is only used
    /// to read node labels
    pub fn new(registry: ClusterRegistry, api: Arc<dyn KubeApi>, environment: InClusterEnvironment) -> Self {
        Self {
            registry,
            api,
            environment,
        }
    }

    pub fn environment(&self) -> &InClusterEnvironment {
        &self.environment
    }

    /// Register the in-cluster configuration unless an entry for it exists.
    /// With `force` a new entry is registered regardless.
    pub async fn discover(&self, force: bool) -> DiscoveryOutcome {
        if !self.environment.is_in_cluster() {
            info!("Not running in-cluster, skipping auto-discovery");
            return DiscoveryOutcome::NotInCluster;
        }

        match self.try_discover(force).await {
            Ok(outcome) => outcome,
            Err(DiscoveryError::NotInCluster) => DiscoveryOutcome::NotInCluster,
            Err(e) => {
                error!("Error during cluster auto-discovery: {}", e);
                DiscoveryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_discover(&self, force: bool) -> Result<DiscoveryOutcome, DiscoveryError> {
        let identity = self.environment.load_identity()?;
        let label = self.node_cluster_label().await;
        if let BestEffort::Unavailable(reason) = &label {
            debug!("No cluster name from node labels: {}", reason);
        }

        let name = derive_cluster_name(
            label.found().as_deref(),
            self.environment.service_host.as_deref(),
            &identity.namespace,
        );

        if !force {
            let clusters = self.registry.list().await?;
            if let Some(existing) = find_existing(&clusters, &name) {
                info!("In-cluster cluster already registered: {}", existing.id());
                return Ok(DiscoveryOutcome::AlreadyRegistered(existing.id().to_string()));
            }
        }

        let entry_name = self
            .environment
            .service_host
            .as_deref()
            .unwrap_or(FALLBACK_CLUSTER_NAME);
        let kubeconfig = identity.kubeconfig(entry_name)?;

        let new = NewCluster::new(name, kubeconfig)
            .with_description(discovery_description(&identity.namespace, &identity.server))
            .with_tags(DISCOVERY_TAGS);
        let id = self.registry.register(new).await?;

        info!("Successfully auto-registered in-cluster configuration: {}", id);
        Ok(DiscoveryOutcome::Registered(id))
    }

    /// Cluster name label of the first node; query errors only degrade
    async fn node_cluster_label(&self) -> BestEffort<String> {
        match self.api.list_nodes(1).await {
            Ok(nodes) => match nodes.items.first() {
                Some(node) => match cluster_label(|key| node.metadata.labels.as_ref()?.get(key)) {
                    Some(label) => BestEffort::Found(label.to_string()),
                    None => BestEffort::Unavailable("first node has no cluster name label".to_string()),
                },
                None => BestEffort::Unavailable("no nodes listed".to_string()),
            },
            Err(e) => {
                warn!("Could not list nodes for cluster name: {}", e);
                BestEffort::Unavailable(e.to_string())
            }
        }
    }
}
