use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use kube::Config;

use crate::kubeconfig::{self, KubeconfigError};

use super::DiscoveryError;

/// Where the kubelet mounts the pod's service account
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const DEFAULT_SERVICE_PORT: &str = "443";

/// The process's view of the cluster it may be running in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InClusterEnvironment {
    pub token_path: PathBuf,
    pub ca_path: PathBuf,
    pub namespace_path: PathBuf,
    /// `KUBERNETES_SERVICE_HOST`
    pub service_host: Option<String>,
    /// `KUBERNETES_SERVICE_PORT`, default 443
    pub service_port: String,
}

impl InClusterEnvironment {
    /// Read `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` and use the
    /// standard service account mount
    pub fn from_env() -> Self {
        let non_empty = |v: String| (!v.trim().is_empty()).then(|| v.trim().to_string());
        Self::with_service_account_dir(
            SERVICE_ACCOUNT_DIR,
            env::var("KUBERNETES_SERVICE_HOST").ok().and_then(non_empty),
            env::var("KUBERNETES_SERVICE_PORT").ok().and_then(non_empty),
        )
    }

    pub fn with_service_account_dir(
        dir: impl AsRef<Path>,
        service_host: Option<String>,
        service_port: Option<String>,
    ) -> Self {
        let dir = dir.as_ref();
        Self {
            token_path: dir.join("token"),
            ca_path: dir.join("ca.crt"),
            namespace_path: dir.join("namespace"),
            service_host,
            service_port: service_port.unwrap_or_else(|| DEFAULT_SERVICE_PORT.to_string()),
        }
    }

    /// An environment that never reports itself as in-cluster
    pub fn outside_cluster() -> Self {
        Self::with_service_account_dir(SERVICE_ACCOUNT_DIR, None, None)
    }

    /// All three service account files and the service host must be present
    pub fn is_in_cluster(&self) -> bool {
        self.token_path.is_file()
            && self.ca_path.is_file()
            && self.namespace_path.is_file()
            && self.service_host.is_some()
    }

    /// `https://<host>:<port>` of the in-cluster API server
    pub fn api_server(&self) -> Option<String> {
        self.service_host.as_ref().map(|host| {
            if host.contains(':') && !host.starts_with('[') {
                format!("https://[{}]:{}", host, self.service_port)
            } else {
                format!("https://{}:{}", host, self.service_port)
            }
        })
    }

    /// True when `config` targets this process's own API server and a
    /// mounted token exists to talk to it
    pub fn matches_config(&self, config: &Config) -> bool {
        let (Some(host), Some(target)) = (&self.service_host, config.cluster_url.host()) else {
            return false;
        };
        let bare = |h: &str| h.trim_start_matches('[').trim_end_matches(']').to_string();
        self.token_path.is_file() && bare(host) == bare(target)
    }

    /// Client config for this pod's own API server.
    ///
    /// The standard mount goes through `Config::incluster`; any other
    /// service-account directory is read into an in-memory kubeconfig.
    pub async fn client_config(&self) -> Result<Config, DiscoveryError> {
        if self.token_path.parent() == Some(Path::new(SERVICE_ACCOUNT_DIR)) {
            return Config::incluster().map_err(|e| DiscoveryError::ClientConfig(e.to_string()));
        }
        Ok(self.load_identity()?.client_config().await?)
    }

    /// Read the live service account identity
    pub fn load_identity(&self) -> Result<InClusterIdentity, DiscoveryError> {
        if !self.is_in_cluster() {
            return Err(DiscoveryError::NotInCluster);
        }
        let server = self.api_server().ok_or(DiscoveryError::NotInCluster)?;

        let token = read_trimmed(&self.token_path)?;
        let namespace = read_trimmed(&self.namespace_path)?;
        let ca_pem = std::fs::read(&self.ca_path)
            .map_err(|e| DiscoveryError::Identity(self.ca_path.display().to_string(), e.to_string()))?;

        Ok(InClusterIdentity {
            server,
            namespace,
            token,
            ca_pem,
        })
    }
}

fn read_trimmed(path: &Path) -> Result<String, DiscoveryError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| DiscoveryError::Identity(path.display().to_string(), e.to_string()))
}

/// Service account credentials of the running pod
#[derive(Clone)]
pub struct InClusterIdentity {
    pub server: String,
    pub namespace: String,
    pub token: String,
    pub ca_pem: Vec<u8>,
}

impl fmt::Debug for InClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InClusterIdentity")
            .field("server", &self.server)
            .field("namespace", &self.namespace)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl InClusterIdentity {
    /// Kubeconfig document carrying this identity
    pub fn kubeconfig(&self, cluster_name: &str) -> Result<String, KubeconfigError> {
        kubeconfig::service_account_kubeconfig(
            cluster_name,
            &self.server,
            &self.ca_pem,
            &self.token,
            &self.namespace,
        )
    }

    /// Client config presenting this identity, built in memory
    pub async fn client_config(&self) -> Result<Config, KubeconfigError> {
        kubeconfig::client_config(&self.kubeconfig("in-cluster")?).await
    }
}
