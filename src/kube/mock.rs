// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::Config;

use super::{
    object_list, object_name, ConfigMap, Connector, KubeApi, KubeError, Namespace, Node,
    ObjectList, ObjectMeta, Pod, Secret, ServerVersion,
};

#[derive(Default)]
struct MockState {
    secrets: BTreeMap<(String, String), Secret>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    nodes: Vec<Node>,
    next_version: u64,
    version_error: Option<KubeError>,
    namespaces_error: Option<KubeError>,
    pods_error: Option<KubeError>,
    nodes_error: Option<KubeError>,
    namespace_count: usize,
    secret_write_error: Option<KubeError>,
    secret_delete_error: Option<KubeError>,
    config_map_write_error: Option<KubeError>,
    config_map_read_error: Option<KubeError>,
    forced_conflicts: u32,
    writes: usize,
}

/// In-memory control plane.
///
/// Enforces `resourceVersion` on ConfigMap replaces like the real API
/// server, and lets tests inject failures per object kind.
#[derive(Clone, Default)]
pub struct MockKubeApi {
    state: Arc<Mutex<MockState>>,
}

impl MockKubeApi {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().namespace_count = 3;
        mock
    }

    pub fn fail_secret_writes(&self, err: KubeError) {
        self.state.lock().unwrap().secret_write_error = Some(err);
    }

    pub fn fail_secret_deletes(&self, err: KubeError) {
        self.state.lock().unwrap().secret_delete_error = Some(err);
    }

    pub fn fail_config_map_writes(&self, err: KubeError) {
        self.state.lock().unwrap().config_map_write_error = Some(err);
    }

    pub fn fail_config_map_reads(&self, err: KubeError) {
        self.state.lock().unwrap().config_map_read_error = Some(err);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.secret_write_error = None;
        state.secret_delete_error = None;
        state.config_map_write_error = None;
        state.config_map_read_error = None;
    }

    /// Answer the next `n` ConfigMap replaces with 409 Conflict
    pub fn force_conflicts(&self, n: u32) {
        self.state.lock().unwrap().forced_conflicts = n;
    }

    pub fn fail_version(&self, err: KubeError) {
        self.state.lock().unwrap().version_error = Some(err);
    }

    pub fn fail_namespaces(&self, err: KubeError) {
        self.state.lock().unwrap().namespaces_error = Some(err);
    }

    pub fn fail_pods(&self, err: KubeError) {
        self.state.lock().unwrap().pods_error = Some(err);
    }

    pub fn fail_nodes(&self, err: KubeError) {
        self.state.lock().unwrap().nodes_error = Some(err);
    }

    pub fn add_node(&self, name: &str, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state.lock().unwrap().nodes.push(Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        });
    }

    /// Insert a secret directly, bypassing failure injection
    pub fn insert_secret(&self, namespace: &str, secret: Secret) {
        let key = (namespace.to_string(), object_name(&secret.metadata).to_string());
        self.state.lock().unwrap().secrets.insert(key, secret);
    }

    /// Insert a ConfigMap directly, as another owner of the object would
    pub fn insert_config_map(&self, namespace: &str, mut config_map: ConfigMap) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        config_map.metadata.resource_version = Some(state.next_version.to_string());
        let key = (namespace.to_string(), object_name(&config_map.metadata).to_string());
        state.config_maps.insert(key, config_map);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of successful create/replace/delete calls
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

fn not_found(kind: &str, name: &str) -> KubeError {
    KubeError::api(404, format!("{} \"{}\" not found", kind, name))
}

fn labels_match(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(|l| l == v).unwrap_or(false),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl KubeApi for MockKubeApi {
    async fn server_version(&self) -> Result<ServerVersion, KubeError> {
        let state = self.state.lock().unwrap();
        match &state.version_error {
            Some(err) => Err(err.clone()),
            None => Ok(ServerVersion {
                major: "1".to_string(),
                minor: "30".to_string(),
                git_version: "v1.30.0".to_string(),
                ..Default::default()
            }),
        }
    }

    async fn list_namespaces(&self, limit: u32) -> Result<ObjectList<Namespace>, KubeError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.namespaces_error {
            return Err(err.clone());
        }
        let shown = state.namespace_count.min(limit as usize);
        let mut list = object_list(vec![Namespace::default(); shown]);
        list.metadata = ListMeta {
            remaining_item_count: Some((state.namespace_count - shown) as i64),
            ..Default::default()
        };
        Ok(list)
    }

    async fn list_pods(&self, _namespace: &str, _limit: u32) -> Result<ObjectList<Pod>, KubeError> {
        let state = self.state.lock().unwrap();
        match &state.pods_error {
            Some(err) => Err(err.clone()),
            None => Ok(object_list(vec![Pod::default()])),
        }
    }

    async fn list_nodes(&self, limit: u32) -> Result<ObjectList<Node>, KubeError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.nodes_error {
            return Err(err.clone());
        }
        Ok(object_list(
            state.nodes.iter().take(limit as usize).cloned().collect(),
        ))
    }

    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Secret, KubeError> {
        self.secret(namespace, name)
            .ok_or_else(|| not_found("secrets", name))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, KubeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.secret_write_error {
            return Err(err.clone());
        }
        let key = (namespace.to_string(), object_name(&secret.metadata).to_string());
        if state.secrets.contains_key(&key) {
            return Err(KubeError::api(409, "already exists"));
        }
        state.secrets.insert(key, secret.clone());
        state.writes += 1;
        Ok(secret.clone())
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret, KubeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.secret_write_error {
            return Err(err.clone());
        }
        let key = (namespace.to_string(), name.to_string());
        if !state.secrets.contains_key(&key) {
            return Err(not_found("secrets", name));
        }
        state.secrets.insert(key, secret.clone());
        state.writes += 1;
        Ok(secret.clone())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), KubeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.secret_delete_error {
            return Err(err.clone());
        }
        match state
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => {
                state.writes += 1;
                Ok(())
            }
            None => Err(not_found("secrets", name)),
        }
    }

    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList<Secret>, KubeError> {
        let state = self.state.lock().unwrap();
        let items = state
            .secrets
            .iter()
            .filter(|((ns, _), s)| {
                ns == namespace && labels_match(label_selector, s.metadata.labels.as_ref())
            })
            .map(|(_, s)| s.clone())
            .collect();
        Ok(object_list(items))
    }

    async fn read_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, KubeError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.config_map_read_error {
            return Err(err.clone());
        }
        state
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("configmaps", name))
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.config_map_write_error {
            return Err(err.clone());
        }
        let key = (namespace.to_string(), object_name(&config_map.metadata).to_string());
        if state.config_maps.contains_key(&key) {
            return Err(KubeError::api(409, "already exists"));
        }
        state.next_version += 1;
        let mut stored = config_map.clone();
        stored.metadata.resource_version = Some(state.next_version.to_string());
        state.config_maps.insert(key, stored.clone());
        state.writes += 1;
        Ok(stored)
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, KubeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.config_map_write_error {
            return Err(err.clone());
        }
        if state.forced_conflicts > 0 {
            state.forced_conflicts -= 1;
            return Err(KubeError::api(409, "the object has been modified"));
        }
        let key = (namespace.to_string(), name.to_string());
        let current = match state.config_maps.get(&key) {
            Some(current) => current.metadata.resource_version.clone(),
            None => return Err(not_found("configmaps", name)),
        };
        if config_map.metadata.resource_version.is_some()
            && config_map.metadata.resource_version != current
        {
            return Err(KubeError::api(409, "the object has been modified"));
        }
        state.next_version += 1;
        let mut stored = config_map.clone();
        stored.metadata.resource_version = Some(state.next_version.to_string());
        state.config_maps.insert(key, stored.clone());
        state.writes += 1;
        Ok(stored)
    }
}

/// Connector handing out one shared mock, recording requested configs
#[derive(Clone, Default)]
pub struct MockConnector {
    api: MockKubeApi,
    seen: Arc<Mutex<Vec<Config>>>,
}

impl MockConnector {
    pub fn new(api: MockKubeApi) -> Self {
        Self {
            api,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn configs(&self) -> Vec<Config> {
        self.seen.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, config: Config, _timeout: Duration) -> Result<Arc<dyn KubeApi>, KubeError> {
        self.seen.lock().unwrap().push(config);
        Ok(Arc::new(self.api.clone()))
    }
}
