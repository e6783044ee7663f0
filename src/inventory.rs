//! The inventory facade used by the HTTP API and the CLI

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::InventoryConfig;
use crate::discovery::{AutoDiscovery, DiscoveryOutcome, InClusterEnvironment};
use crate::kube::{Connector, KubeApi};
use crate::kubeconfig;
use crate::record::{Cluster, ClusterUpdate, NewCluster};
use crate::registry::{ClusterRegistry, RegistryError};
use crate::storage::ClusterStorage;
use crate::tester::{ConnectionReport, ConnectionTester};

/// A cluster together with a fresh connection check
#[derive(Debug, Clone, Serialize)]
pub struct ClusterInfo {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub connection: ConnectionReport,
}

#[derive(Clone)]
pub struct ClusterInventory {
    registry: ClusterRegistry,
    tester: ConnectionTester,
    discovery: AutoDiscovery,
}

impl ClusterInventory {
    pub fn new(registry: ClusterRegistry, tester: ConnectionTester, discovery: AutoDiscovery) -> Self {
        Self {
            registry,
            tester,
            discovery,
        }
    }

    /// Wire all components onto one control-plane client.
    ///
    /// `api` backs storage and discovery; `connector` opens clients for the
    /// clusters being probed.
    pub fn from_config(
        api: Arc<dyn KubeApi>,
        connector: Arc<dyn Connector>,
        environment: InClusterEnvironment,
        config: &InventoryConfig,
    ) -> Self {
        let storage = ClusterStorage::new(api.clone(), config.namespace.clone())
            .with_retry_policy(config.retry_policy());
        let registry = ClusterRegistry::new(storage);
        let tester = ConnectionTester::new(registry.clone(), connector)
            .with_environment(environment.clone())
            .with_timeout(config.probe_timeout);
        let discovery = AutoDiscovery::new(registry.clone(), api, environment);

        info!("Cluster inventory using namespace {}", config.namespace);
        Self::new(registry, tester, discovery)
    }

    pub fn namespace(&self) -> &str {
        self.registry.storage().namespace()
    }

    /// Validate the kubeconfig, then register
    pub async fn register(&self, new: NewCluster) -> Result<String, RegistryError> {
        kubeconfig::validate(&new.kubeconfig)?;
        self.registry.register(new).await
    }

    pub async fn get(&self, cluster_id: &str) -> Result<Option<Cluster>, RegistryError> {
        self.registry.get(cluster_id).await
    }

    pub async fn list(&self) -> Result<Vec<Cluster>, RegistryError> {
        self.registry.list().await
    }

    /// Validate a supplied kubeconfig, then merge the update
    pub async fn update(&self, cluster_id: &str, update: &ClusterUpdate) -> Result<(), RegistryError> {
        if let Some(kubeconfig) = update.new_kubeconfig() {
            kubeconfig::validate(kubeconfig)?;
        }
        self.registry.update(cluster_id, update).await
    }

    pub async fn delete(&self, cluster_id: &str) -> Result<(), RegistryError> {
        self.registry.delete(cluster_id).await
    }

    pub async fn test_connection(&self, cluster_id: &str) -> ConnectionReport {
        self.tester.test_connection(cluster_id).await
    }

    /// The cluster plus a fresh connection check; the returned record
    /// already carries the status that check wrote
    pub async fn get_info(&self, cluster_id: &str) -> Result<Option<ClusterInfo>, RegistryError> {
        let Some(before) = self.registry.get(cluster_id).await? else {
            return Ok(None);
        };
        let connection = self.tester.test_connection(cluster_id).await;
        let cluster = self.registry.get(cluster_id).await?.unwrap_or(before);
        Ok(Some(ClusterInfo {
            cluster,
            connection,
        }))
    }

    pub async fn discover(&self, force: bool) -> DiscoveryOutcome {
        self.discovery.discover(force).await
    }

    pub async fn get_kubeconfig(&self, cluster_id: &str) -> Result<Option<String>, RegistryError> {
        self.registry.get_kubeconfig(cluster_id).await
    }
}
