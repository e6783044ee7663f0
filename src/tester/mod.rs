//! Connection health checks
//!
//! A check loads the stored kubeconfig, calls `GET /version`, then runs a
//! cheap listing to tell "connected" from "connected with limited
//! permissions". Expected network and auth failures are reported, never
//! raised.

pub mod report;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::Config;
use tracing::{debug, error, info, warn};

use crate::discovery::InClusterEnvironment;
use crate::kube::{total_count, Connector, KubeApi};
use crate::kubeconfig::{self, KubeconfigError};
use crate::registry::{ClusterRegistry, RegistryError};

pub use report::{
    build_report, classify_deep_probe, classify_version_probe, ConnectionReport, ProbeEnrichment,
    Verdict, VersionProbe,
};

/// Default per-request timeout for probes
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how a probe connects
struct ProbeTarget {
    config: Config,
    /// Own namespace when probing with the live in-cluster identity
    in_cluster_namespace: Option<String>,
}

#[derive(Clone)]
pub struct ConnectionTester {
    registry: ClusterRegistry,
    connector: Arc<dyn Connector>,
    environment: InClusterEnvironment,
    timeout: Duration,
}

impl ConnectionTester {
    pub fn new(registry: ClusterRegistry, connector: Arc<dyn Connector>) -> Self {
        Self {
            registry,
            connector,
            environment: InClusterEnvironment::from_env(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_environment(mut self, environment: InClusterEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check one cluster and persist the resulting status
    pub async fn test_connection(&self, cluster_id: &str) -> ConnectionReport {
        let kubeconfig = match self.registry.storage().get_kubeconfig(cluster_id).await {
            Ok(Some(kubeconfig)) => kubeconfig,
            Ok(None) => {
                debug!("No kubeconfig stored for cluster {}", cluster_id);
                return ConnectionReport::failed("Kubeconfig not found", None);
            }
            Err(e) => {
                error!("Failed to load kubeconfig for cluster {}: {}", cluster_id, e);
                return ConnectionReport::failed(format!("Failed to load kubeconfig: {}", e), None);
            }
        };

        let report = self.probe(&kubeconfig).await;
        match report.verdict {
            Verdict::Error => error!(
                "Connection test failed for cluster {}: {}",
                cluster_id,
                report.error.as_deref().unwrap_or("unknown error")
            ),
            Verdict::ConnectedLimited => info!(
                "Connection test for cluster {}: connected with limited permissions",
                cluster_id
            ),
            Verdict::Connected => info!("Connection test for cluster {}: connected", cluster_id),
        }

        self.record_status(cluster_id, &report).await;
        report
    }

    async fn probe(&self, kubeconfig: &str) -> ConnectionReport {
        let ProbeTarget {
            config,
            in_cluster_namespace,
        } = match self.resolve_target(kubeconfig).await {
            Ok(target) => target,
            Err(e) => return ConnectionReport::failed(format!("Invalid kubeconfig: {}", e), None),
        };

        let api = match self.connector.connect(config, self.timeout) {
            Ok(api) => api,
            Err(e) => return ConnectionReport::failed(e.to_string(), None),
        };

        let version = classify_version_probe(&api.server_version().await);
        let deep = match version {
            VersionProbe::Reachable => {
                Some(self.deep_probe(api.as_ref(), in_cluster_namespace.as_deref()).await)
            }
            _ => None,
        };

        build_report(in_cluster_namespace.is_some(), version, deep)
    }

    /// Use the live in-cluster identity when the stored kubeconfig points at
    /// this process's own API server; otherwise the stored credential
    async fn resolve_target(&self, kubeconfig: &str) -> Result<ProbeTarget, KubeconfigError> {
        let config = kubeconfig::client_config(kubeconfig).await?;

        if self.environment.matches_config(&config) {
            match self.environment.load_identity() {
                Ok(identity) => match identity.client_config().await {
                    Ok(live) => {
                        debug!("Probing {} with the in-cluster identity", identity.server);
                        return Ok(ProbeTarget {
                            config: live,
                            in_cluster_namespace: Some(identity.namespace),
                        });
                    }
                    Err(e) => debug!("In-cluster identity unusable, using stored credential: {}", e),
                },
                Err(e) => debug!("In-cluster identity unavailable, using stored credential: {}", e),
            }
        }

        Ok(ProbeTarget {
            config,
            in_cluster_namespace: None,
        })
    }

    async fn deep_probe(&self, api: &dyn KubeApi, in_cluster_namespace: Option<&str>) -> ProbeEnrichment {
        let result = match in_cluster_namespace {
            // Reaching our own namespace counts as one
            Some(namespace) => api.list_pods(namespace, 1).await.map(|_| 1),
            None => api.list_namespaces(1).await.map(|list| total_count(&list)),
        };
        classify_deep_probe(result)
    }

    async fn record_status(&self, cluster_id: &str, report: &ConnectionReport) {
        match self
            .registry
            .update_status(cluster_id, report.status, Some(Utc::now()))
            .await
        {
            Ok(()) => {}
            Err(RegistryError::NotFound(_)) => {
                debug!("Cluster {} has no metadata; status not recorded", cluster_id)
            }
            Err(e) => warn!("Failed to record status for cluster {}: {}", cluster_id, e),
        }
    }
}
