//! Backing store for the inventory
//!
//! Credentials go into one Secret per cluster (`cluster-kubeconfig-<id>`),
//! metadata into a single shared ConfigMap (`cluster-inventory`) with one
//! JSON field per cluster id. Writes to the ConfigMap are read-modify-write
//! cycles guarded by its `resourceVersion`.

pub mod retry;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use k8s_openapi::ByteString;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kube::{named_meta, object_name, ConfigMap, KubeApi, KubeError, Secret, SecretExt};
use crate::record::ClusterRecord;

pub use retry::RetryPolicy;

/// Prefix of the per-cluster Secret names
pub const SECRET_PREFIX: &str = "cluster-kubeconfig-";

/// Name of the shared metadata ConfigMap
pub const CONFIG_MAP_NAME: &str = "cluster-inventory";

/// Secret data key holding the kubeconfig text
pub const KUBECONFIG_KEY: &str = "kubeconfig";

const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
const APP_NAME: &str = "sreagent";
const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
const COMPONENT: &str = "cluster-storage";
const CLUSTER_ID_LABEL: &str = "cluster-id";

/// Errors raised by the backing store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Control plane unavailable: {0}")]
    Unavailable(KubeError),

    #[error("Control plane request failed: {0}")]
    Api(KubeError),

    #[error("Metadata was modified concurrently; gave up after {0} attempts")]
    Conflict(u32),

    #[error("Failed to encode metadata for cluster {0}: {1}")]
    Encode(String, String),
}

impl From<KubeError> for StorageError {
    fn from(err: KubeError) -> Self {
        if err.is_unreachable() {
            StorageError::Unavailable(err)
        } else {
            StorageError::Api(err)
        }
    }
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

/// Labels shared by every object the inventory owns
pub fn storage_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_NAME_LABEL.to_string(), APP_NAME.to_string()),
        (COMPONENT_LABEL.to_string(), COMPONENT.to_string()),
    ])
}

/// Selector matching [`storage_labels`]
pub fn label_selector() -> String {
    format!("{}={},{}={}", APP_NAME_LABEL, APP_NAME, COMPONENT_LABEL, COMPONENT)
}

pub fn secret_name(cluster_id: &str) -> String {
    format!("{}{}", SECRET_PREFIX, cluster_id)
}

/// Inverse of [`secret_name`]; `None` for names outside the convention
pub fn cluster_id_from_secret(name: &str) -> Option<&str> {
    name.strip_prefix(SECRET_PREFIX).filter(|id| !id.is_empty())
}

fn decode_record(cluster_id: &str, raw: &str) -> Option<ClusterRecord> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping undecodable metadata for cluster {}: {}", cluster_id, e);
            None
        }
    }
}

/// One labelled kubeconfig Secret as seen by a list call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub cluster_id: String,
    /// The Secret carries a decodable kubeconfig under [`KUBECONFIG_KEY`]
    pub has_kubeconfig: bool,
}

/// Cluster storage bound to one namespace
#[derive(Clone)]
pub struct ClusterStorage {
    api: Arc<dyn KubeApi>,
    namespace: String,
    retry: RetryPolicy,
}

impl ClusterStorage {
    pub fn new(api: Arc<dyn KubeApi>, namespace: impl Into<String>) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // =========================================================================
    // Credentials (one Secret per cluster)
    // =========================================================================

    /// Create or replace the kubeconfig Secret for a cluster
    pub async fn store_kubeconfig(&self, cluster_id: &str, kubeconfig: &str) -> Result<(), StorageError> {
        let name = secret_name(cluster_id);
        let mut labels = storage_labels();
        labels.insert(CLUSTER_ID_LABEL.to_string(), cluster_id.to_string());
        let secret = Secret::opaque(
            named_meta(&name, &self.namespace, labels.clone()),
            KUBECONFIG_KEY,
            kubeconfig,
        );

        match self.api.read_secret(&self.namespace, &name).await {
            Ok(mut existing) => {
                // Unconditional replace of the live object, keeping fields we do not own
                existing.metadata.resource_version = None;
                existing
                    .metadata
                    .labels
                    .get_or_insert_with(BTreeMap::new)
                    .extend(labels);
                existing.data.get_or_insert_with(BTreeMap::new).insert(
                    KUBECONFIG_KEY.to_string(),
                    ByteString(kubeconfig.as_bytes().to_vec()),
                );
                self.api.replace_secret(&self.namespace, &name, &existing).await?;
                info!("Updated kubeconfig secret for cluster: {}", cluster_id);
            }
            Err(e) if e.is_not_found() => match self.api.create_secret(&self.namespace, &secret).await {
                Ok(_) => info!("Created kubeconfig secret for cluster: {}", cluster_id),
                Err(e) if e.is_conflict() => {
                    // Created by someone else in between; last writer wins
                    self.api.replace_secret(&self.namespace, &name, &secret).await?;
                    info!("Updated kubeconfig secret for cluster: {}", cluster_id);
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Read a cluster's kubeconfig. Missing Secret or missing key is `None`.
    pub async fn get_kubeconfig(&self, cluster_id: &str) -> Result<Option<String>, StorageError> {
        match self.api.read_secret(&self.namespace, &secret_name(cluster_id)).await {
            Ok(secret) => {
                let kubeconfig = secret.decoded(KUBECONFIG_KEY);
                if kubeconfig.is_none() {
                    warn!("Kubeconfig secret for cluster {} has no usable data", cluster_id);
                }
                Ok(kubeconfig)
            }
            Err(e) if e.is_not_found() => {
                debug!("Kubeconfig secret not found for cluster: {}", cluster_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a cluster's kubeconfig; deleting a missing Secret succeeds
    pub async fn delete_kubeconfig(&self, cluster_id: &str) -> Result<(), StorageError> {
        match self.api.delete_secret(&self.namespace, &secret_name(cluster_id)).await {
            Ok(()) => {
                info!("Deleted kubeconfig secret for cluster: {}", cluster_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Kubeconfig secret already absent for cluster: {}", cluster_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every cluster with a kubeconfig Secret, and whether that Secret
    /// still holds a usable kubeconfig
    pub async fn list_credentials(&self) -> Result<Vec<StoredCredential>, StorageError> {
        let secrets = self
            .api
            .list_secrets(&self.namespace, &label_selector())
            .await?;
        Ok(secrets
            .items
            .iter()
            .filter_map(|secret| {
                let cluster_id = cluster_id_from_secret(object_name(&secret.metadata))?;
                Some(StoredCredential {
                    cluster_id: cluster_id.to_string(),
                    has_kubeconfig: secret.decoded(KUBECONFIG_KEY).is_some(),
                })
            })
            .collect())
    }

    // =========================================================================
    // Metadata (shared ConfigMap)
    // =========================================================================

    pub async fn store_metadata(&self, cluster_id: &str, record: &ClusterRecord) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(record)
            .map_err(|e| StorageError::Encode(cluster_id.to_string(), e.to_string()))?;
        self.modify_container(|data| {
            data.insert(cluster_id.to_string(), encoded.clone());
            true
        })
        .await?;
        info!("Stored metadata for cluster: {}", cluster_id);
        Ok(())
    }

    pub async fn get_metadata(&self, cluster_id: &str) -> Result<Option<ClusterRecord>, StorageError> {
        match self.api.read_config_map(&self.namespace, CONFIG_MAP_NAME).await {
            Ok(cm) => Ok(cm
                .data
                .as_ref()
                .and_then(|data| data.get(cluster_id))
                .and_then(|raw| decode_record(cluster_id, raw))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All decodable records, keyed by cluster id, from a single read
    pub async fn get_all_metadata(&self) -> Result<HashMap<String, ClusterRecord>, StorageError> {
        match self.api.read_config_map(&self.namespace, CONFIG_MAP_NAME).await {
            Ok(cm) => Ok(cm
                .data
                .unwrap_or_default()
                .iter()
                .filter_map(|(id, raw)| decode_record(id, raw).map(|r| (id.clone(), r)))
                .collect()),
            Err(e) if e.is_not_found() => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `change` to an existing record inside one concurrency-safe
    /// write. Returns the stored record, or `None` without writing anything
    /// when the cluster has no metadata.
    pub async fn modify_metadata<F>(&self, cluster_id: &str, change: F) -> Result<Option<ClusterRecord>, StorageError>
    where
        F: Fn(&mut ClusterRecord) + Send + Sync,
    {
        let mut updated: Option<ClusterRecord> = None;
        let mut encode_error: Option<String> = None;

        self.modify_container(|data| {
            updated = None;
            let Some(mut record) = data.get(cluster_id).and_then(|raw| decode_record(cluster_id, raw)) else {
                return false;
            };
            change(&mut record);
            match serde_json::to_string(&record) {
                Ok(encoded) => {
                    data.insert(cluster_id.to_string(), encoded);
                    updated = Some(record);
                    true
                }
                Err(e) => {
                    encode_error = Some(e.to_string());
                    false
                }
            }
        })
        .await?;

        if let Some(e) = encode_error {
            return Err(StorageError::Encode(cluster_id.to_string(), e));
        }
        Ok(updated)
    }

    /// Remove a cluster's metadata field; a missing field or container succeeds
    pub async fn delete_metadata(&self, cluster_id: &str) -> Result<(), StorageError> {
        let mut removed = false;
        self.modify_container(|data| {
            removed = data.remove(cluster_id).is_some();
            removed
        })
        .await?;
        if removed {
            info!("Deleted metadata for cluster: {}", cluster_id);
        }
        Ok(())
    }

    /// Read-modify-write of the whole container.
    ///
    /// Only `data` is touched; the rest of the object goes back as read.
    /// `mutate` returns `false` to skip the write. It may run several times:
    /// a 409 on replace (stale resourceVersion) or on create (racing create)
    /// restarts the cycle from a fresh read after a jittered backoff.
    async fn modify_container<F>(&self, mut mutate: F) -> Result<(), StorageError>
    where
        F: FnMut(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            let written = match self.api.read_config_map(&self.namespace, CONFIG_MAP_NAME).await {
                Ok(mut cm) => {
                    if !mutate(cm.data.get_or_insert_with(BTreeMap::new)) {
                        return Ok(());
                    }
                    self.api
                        .replace_config_map(&self.namespace, CONFIG_MAP_NAME, &cm)
                        .await
                }
                Err(e) if e.is_not_found() => {
                    let mut data = BTreeMap::new();
                    if !mutate(&mut data) {
                        return Ok(());
                    }
                    let cm = ConfigMap {
                        metadata: named_meta(CONFIG_MAP_NAME, &self.namespace, storage_labels()),
                        data: Some(data),
                        ..Default::default()
                    };
                    self.api.create_config_map(&self.namespace, &cm).await
                }
                Err(e) => return Err(e.into()),
            };

            match written {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    if attempt + 1 < attempts {
                        let delay = self.retry.backoff(attempt);
                        debug!(
                            "Metadata write conflict (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            attempts,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("Giving up on metadata write after {} conflicting attempts", attempts);
        Err(StorageError::Conflict(attempts))
    }
}
