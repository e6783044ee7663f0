use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Config};
use tracing::trace;

use super::error::KubeError;
use super::resources::{ConfigMap, Namespace, Node, ObjectList, Pod, Secret, ServerVersion};
use super::KubeApi;

// ============================================================================
// SBIO: I/O implementation (kube client)
// ============================================================================

/// Client for one API server
#[derive(Clone)]
pub struct KubeApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl KubeApiClient {
    /// Build a client; every request it sends is bounded by `timeout`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(mut config: Config, timeout: Duration) -> Result<Self, KubeError> {
        config.connect_timeout = Some(timeout);
        config.read_timeout = Some(timeout);
        let base_url = config.cluster_url.to_string().trim_end_matches('/').to_string();
        let client = Client::try_from(config).map_err(|e| KubeError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Run one request under the client timeout and map its error
    async fn call<T, F>(&self, what: &str, request: F) -> Result<T, KubeError>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
    {
        trace!("Kubernetes API request: {} on {}", what, self.base_url);
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|e| KubeError::from_client(e, &self.base_url)),
            Err(_) => Err(KubeError::Timeout(self.base_url.clone())),
        }
    }
}

fn limited(limit: u32) -> ListParams {
    ListParams::default().limit(limit)
}

#[async_trait]
impl KubeApi for KubeApiClient {
    async fn server_version(&self) -> Result<ServerVersion, KubeError> {
        self.call("GET /version", self.client.apiserver_version()).await
    }

    async fn list_namespaces(&self, limit: u32) -> Result<ObjectList<Namespace>, KubeError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        self.call("list namespaces", api.list(&limited(limit))).await
    }

    async fn list_pods(&self, namespace: &str, limit: u32) -> Result<ObjectList<Pod>, KubeError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        self.call("list pods", api.list(&limited(limit))).await
    }

    async fn list_nodes(&self, limit: u32) -> Result<ObjectList<Node>, KubeError> {
        let api: Api<Node> = Api::all(self.client.clone());
        self.call("list nodes", api.list(&limited(limit))).await
    }

    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Secret, KubeError> {
        self.call("get secret", self.secrets(namespace).get(name)).await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, KubeError> {
        let api = self.secrets(namespace);
        self.call("create secret", api.create(&PostParams::default(), secret))
            .await
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret, KubeError> {
        let api = self.secrets(namespace);
        self.call("replace secret", api.replace(name, &PostParams::default(), secret))
            .await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), KubeError> {
        let api = self.secrets(namespace);
        self.call("delete secret", api.delete(name, &DeleteParams::default()))
            .await
            .map(|_| ())
    }

    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList<Secret>, KubeError> {
        let api = self.secrets(namespace);
        let params = ListParams::default().labels(label_selector);
        self.call("list secrets", api.list(&params)).await
    }

    async fn read_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, KubeError> {
        self.call("get configmap", self.config_maps(namespace).get(name))
            .await
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError> {
        let api = self.config_maps(namespace);
        self.call("create configmap", api.create(&PostParams::default(), config_map))
            .await
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError> {
        let api = self.config_maps(namespace);
        self.call(
            "replace configmap",
            api.replace(name, &PostParams::default(), config_map),
        )
        .await
    }
}
