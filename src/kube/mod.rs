//! Control-plane access
//!
//! Every component receives an explicitly constructed [`KubeApi`] instead of
//! reaching for a process-wide client, so tests can substitute a fake.
//! [`KubeApiClient`] is the real implementation over `kube::Client`.

pub mod client;
pub mod error;
pub mod resources;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::Config;

pub use client::KubeApiClient;
pub use error::KubeError;
pub use resources::{
    named_meta, object_list, object_name, total_count, ConfigMap, ListMeta, Namespace, Node,
    ObjectList, ObjectMeta, Pod, Secret, SecretExt, ServerVersion,
};

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

/// The slice of the Kubernetes API used by the inventory.
///
/// Calls map 1:1 onto REST requests; nothing is cached.
#[async_trait]
pub trait KubeApi: Send + Sync {
    /// `GET /version`
    async fn server_version(&self) -> Result<ServerVersion, KubeError>;

    async fn list_namespaces(&self, limit: u32) -> Result<ObjectList<Namespace>, KubeError>;

    async fn list_pods(&self, namespace: &str, limit: u32) -> Result<ObjectList<Pod>, KubeError>;

    async fn list_nodes(&self, limit: u32) -> Result<ObjectList<Node>, KubeError>;

    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Secret, KubeError>;

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, KubeError>;

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret, KubeError>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), KubeError>;

    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList<Secret>, KubeError>;

    async fn read_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, KubeError>;

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError>;

    /// Replace; rejected with 409 if `metadata.resourceVersion` is stale
    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError>;
}

/// Opens clients for arbitrary clusters (the ones being tested)
pub trait Connector: Send + Sync {
    fn connect(&self, config: Config, timeout: Duration) -> Result<Arc<dyn KubeApi>, KubeError>;
}

/// Connector producing real `kube` clients
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, config: Config, timeout: Duration) -> Result<Arc<dyn KubeApi>, KubeError> {
        Ok(Arc::new(KubeApiClient::new(config, timeout)?))
    }
}

/// Stand-in used when no control-plane configuration could be loaded.
///
/// Every call fails with [`KubeError::Unavailable`], which the registry
/// reports as a backend outage.
#[derive(Debug, Clone)]
pub struct DisconnectedApi {
    reason: String,
}

impl DisconnectedApi {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, KubeError> {
        Err(KubeError::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl KubeApi for DisconnectedApi {
    async fn server_version(&self) -> Result<ServerVersion, KubeError> {
        self.fail()
    }

    async fn list_namespaces(&self, _limit: u32) -> Result<ObjectList<Namespace>, KubeError> {
        self.fail()
    }

    async fn list_pods(&self, _namespace: &str, _limit: u32) -> Result<ObjectList<Pod>, KubeError> {
        self.fail()
    }

    async fn list_nodes(&self, _limit: u32) -> Result<ObjectList<Node>, KubeError> {
        self.fail()
    }

    async fn read_secret(&self, _namespace: &str, _name: &str) -> Result<Secret, KubeError> {
        self.fail()
    }

    async fn create_secret(&self, _namespace: &str, _secret: &Secret) -> Result<Secret, KubeError> {
        self.fail()
    }

    async fn replace_secret(
        &self,
        _namespace: &str,
        _name: &str,
        _secret: &Secret,
    ) -> Result<Secret, KubeError> {
        self.fail()
    }

    async fn delete_secret(&self, _namespace: &str, _name: &str) -> Result<(), KubeError> {
        self.fail()
    }

    async fn list_secrets(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> Result<ObjectList<Secret>, KubeError> {
        self.fail()
    }

    async fn read_config_map(&self, _namespace: &str, _name: &str) -> Result<ConfigMap, KubeError> {
        self.fail()
    }

    async fn create_config_map(
        &self,
        _namespace: &str,
        _config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError> {
        self.fail()
    }

    async fn replace_config_map(
        &self,
        _namespace: &str,
        _name: &str,
        _config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_api_reports_unavailable() {
        let api = DisconnectedApi::new("no kubeconfig found");
        let err = api.read_secret("ns", "s").await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(err.to_string().contains("no kubeconfig found"));
    }

    #[tokio::test]
    async fn test_http_connector_builds_client() {
        let config = Config::new("http://127.0.0.1:6443".parse().unwrap());
        assert!(HttpConnector.connect(config, Duration::from_secs(1)).is_ok());
    }
}
