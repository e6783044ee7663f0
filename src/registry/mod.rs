//! Cluster registry
//!
//! CRUD and status bookkeeping over [`ClusterStorage`]. The registry owns
//! the cross-object rules: credentials are written before metadata, a failed
//! metadata write rolls the credential back, and read paths treat a
//! credential without metadata as absent.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::kubeconfig::KubeconfigError;
use crate::record::{Cluster, ClusterRecord, ClusterStatus, ClusterUpdate, NewCluster};
use crate::storage::{ClusterStorage, StorageError};

/// Errors surfaced to registry callers
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cluster {0} not found")]
    NotFound(String),

    #[error("Invalid kubeconfig: {0}")]
    Validation(#[from] KubeconfigError),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Partial failure for cluster {cluster_id}: {message}")]
    PartialFailure { cluster_id: String, message: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        if err.is_unavailable() {
            RegistryError::BackendUnavailable(err.to_string())
        } else {
            RegistryError::Backend(err.to_string())
        }
    }
}

/// Log a raw storage fault with its context, then convert it
fn fault(action: &str, cluster_id: &str, err: StorageError) -> RegistryError {
    error!("Failed {} for cluster {}: {:?}", action, cluster_id, err);
    err.into()
}

#[derive(Clone)]
pub struct ClusterRegistry {
    storage: ClusterStorage,
}

impl ClusterRegistry {
    pub fn new(storage: ClusterStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &ClusterStorage {
        &self.storage
    }

    /// Register a new cluster and return its generated id.
    ///
    /// Credential first, then metadata. If the metadata write fails the
    /// credential is deleted again; if that also fails the result is a
    /// [`RegistryError::PartialFailure`].
    pub async fn register(&self, new: NewCluster) -> Result<String, RegistryError> {
        let id = Uuid::new_v4().to_string();
        let mut record = ClusterRecord::new(&id, &new.name, Utc::now());
        record.description = new.description.unwrap_or_default();
        record.tags = new.tags.unwrap_or_default();

        self.storage
            .store_kubeconfig(&id, &new.kubeconfig)
            .await
            .map_err(|e| fault("storing kubeconfig", &id, e))?;

        if let Err(e) = self.storage.store_metadata(&id, &record).await {
            let err = fault("storing metadata", &id, e);
            return match self.storage.delete_kubeconfig(&id).await {
                Ok(()) => {
                    warn!("Rolled back kubeconfig for cluster {} after metadata failure", id);
                    Err(err)
                }
                Err(rollback) => {
                    error!("Rollback of kubeconfig for cluster {} failed: {:?}", id, rollback);
                    Err(RegistryError::PartialFailure {
                        cluster_id: id,
                        message: format!(
                            "metadata write failed ({}) and the stored kubeconfig could not be removed ({})",
                            err, rollback
                        ),
                    })
                }
            };
        }

        info!("Registered cluster: {} ({})", record.name, id);
        Ok(id)
    }

    /// Fetch a cluster; `has_kubeconfig` is checked against storage each time
    pub async fn get(&self, cluster_id: &str) -> Result<Option<Cluster>, RegistryError> {
        let Some(record) = self
            .storage
            .get_metadata(cluster_id)
            .await
            .map_err(|e| fault("reading metadata", cluster_id, e))?
        else {
            return Ok(None);
        };

        let has_kubeconfig = self
            .storage
            .get_kubeconfig(cluster_id)
            .await
            .map_err(|e| fault("reading kubeconfig", cluster_id, e))?
            .is_some();

        Ok(Some(Cluster {
            record,
            has_kubeconfig,
        }))
    }

    /// All clusters that have both a credential Secret and metadata, sorted
    /// by name (case-insensitive). `has_kubeconfig` reflects the Secret's data.
    pub async fn list(&self) -> Result<Vec<Cluster>, RegistryError> {
        let credentials = self
            .storage
            .list_credentials()
            .await
            .map_err(|e| fault("listing kubeconfigs", "*", e))?;
        let mut metadata = self
            .storage
            .get_all_metadata()
            .await
            .map_err(|e| fault("reading metadata", "*", e))?;

        let mut clusters: Vec<Cluster> = credentials
            .into_iter()
            .filter_map(|credential| {
                let record = metadata.remove(&credential.cluster_id)?;
                Some(Cluster {
                    record,
                    has_kubeconfig: credential.has_kubeconfig,
                })
            })
            .collect();

        clusters.sort_by_key(|c| c.record.name.to_lowercase());
        Ok(clusters)
    }

    /// Merge `update` into an existing cluster.
    ///
    /// A replacement kubeconfig is stored before the metadata; if that write
    /// fails nothing else is touched.
    pub async fn update(&self, cluster_id: &str, update: &ClusterUpdate) -> Result<(), RegistryError> {
        let exists = self
            .storage
            .get_metadata(cluster_id)
            .await
            .map_err(|e| fault("reading metadata", cluster_id, e))?
            .is_some();
        if !exists {
            return Err(RegistryError::NotFound(cluster_id.to_string()));
        }

        if let Some(kubeconfig) = update.new_kubeconfig() {
            self.storage
                .store_kubeconfig(cluster_id, kubeconfig)
                .await
                .map_err(|e| fault("storing kubeconfig", cluster_id, e))?;
        }

        let now = Utc::now();
        let updated = self
            .storage
            .modify_metadata(cluster_id, |record| update.apply(record, now))
            .await
            .map_err(|e| fault("updating metadata", cluster_id, e))?;

        match updated {
            Some(_) => {
                info!("Updated cluster: {}", cluster_id);
                Ok(())
            }
            // Deleted between the existence check and the write
            None => Err(RegistryError::NotFound(cluster_id.to_string())),
        }
    }

    /// Remove both the credential and the metadata. Unknown ids succeed.
    pub async fn delete(&self, cluster_id: &str) -> Result<(), RegistryError> {
        let kubeconfig = self.storage.delete_kubeconfig(cluster_id).await;
        let metadata = self.storage.delete_metadata(cluster_id).await;

        match (kubeconfig, metadata) {
            (Ok(()), Ok(())) => {
                info!("Deleted cluster: {}", cluster_id);
                Ok(())
            }
            (Err(e), Err(other)) => {
                error!("Metadata deletion for cluster {} also failed: {:?}", cluster_id, other);
                Err(fault("deleting kubeconfig", cluster_id, e))
            }
            (Err(e), Ok(())) => {
                let err = fault("deleting kubeconfig", cluster_id, e);
                Err(RegistryError::PartialFailure {
                    cluster_id: cluster_id.to_string(),
                    message: format!("metadata deleted but kubeconfig deletion failed: {}", err),
                })
            }
            (Ok(()), Err(e)) => {
                let err = fault("deleting metadata", cluster_id, e);
                Err(RegistryError::PartialFailure {
                    cluster_id: cluster_id.to_string(),
                    message: format!("kubeconfig deleted but metadata deletion failed: {}", err),
                })
            }
        }
    }

    /// Record the outcome of a connection check. Only status, last_checked
    /// and updated_at change.
    pub async fn update_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
        checked_at: Option<DateTime<Utc>>,
    ) -> Result<(), RegistryError> {
        let now = Utc::now();
        let checked_at = checked_at.unwrap_or(now);

        let updated = self
            .storage
            .modify_metadata(cluster_id, |record| {
                record.status = status;
                record.last_checked = Some(checked_at);
                record.updated_at = now;
            })
            .await
            .map_err(|e| fault("updating status", cluster_id, e))?;

        match updated {
            Some(_) => Ok(()),
            None => Err(RegistryError::NotFound(cluster_id.to_string())),
        }
    }

    /// Raw kubeconfig text; `None` when the cluster has no metadata or no
    /// stored credential
    pub async fn get_kubeconfig(&self, cluster_id: &str) -> Result<Option<String>, RegistryError> {
        let registered = self
            .storage
            .get_metadata(cluster_id)
            .await
            .map_err(|e| fault("reading metadata", cluster_id, e))?
            .is_some();
        if !registered {
            return Ok(None);
        }
        self.storage
            .get_kubeconfig(cluster_id)
            .await
            .map_err(|e| fault("reading kubeconfig", cluster_id, e))
    }
}
