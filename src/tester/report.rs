use serde::Serialize;

use crate::kube::{KubeError, ServerVersion};
use crate::record::ClusterStatus;

pub const MSG_IN_CLUSTER: &str = "Successfully connected to in-cluster configuration.";
pub const MSG_LIMITED: &str =
    "Successfully connected. Some operations may require additional permissions.";
pub const MSG_CONNECTED: &str = "Successfully connected to cluster.";

/// Overall classification of a connection check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Connected,
    ConnectedLimited,
    Error,
}

impl Verdict {
    pub fn is_connected(&self) -> bool {
        !matches!(self, Verdict::Error)
    }

    /// Status persisted for this verdict
    pub fn status(&self) -> ClusterStatus {
        if self.is_connected() {
            ClusterStatus::Connected
        } else {
            ClusterStatus::Error
        }
    }
}

/// Outcome of the optional second probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeEnrichment {
    /// Namespaces (or, in-cluster, accessible namespaces) counted
    Counted(usize),
    /// 403 from the server
    Denied(String),
    /// Any other failure; the verdict is unaffected
    Unavailable(String),
}

/// Classified `GET /version` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionProbe {
    Reachable,
    /// Authenticated, but the request was forbidden
    Limited(String),
    Failed {
        error: String,
        http_status: Option<u16>,
    },
}

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub connected: bool,
    pub status: ClusterStatus,
    pub verdict: Verdict,
    /// Human-readable summary; the error text when the check failed
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<ProbeEnrichment>,
}

impl ConnectionReport {
    pub fn failed(error: impl Into<String>, http_status: Option<u16>) -> Self {
        let error = error.into();
        Self {
            connected: false,
            status: ClusterStatus::Error,
            verdict: Verdict::Error,
            message: error.clone(),
            warning: None,
            error: Some(error),
            namespace_count: None,
            http_status,
            enrichment: None,
        }
    }

    fn connected(verdict: Verdict, message: &str) -> Self {
        Self {
            connected: true,
            status: verdict.status(),
            verdict,
            message: message.to_string(),
            warning: None,
            error: None,
            namespace_count: None,
            http_status: None,
            enrichment: None,
        }
    }

    fn limited(reason: &str) -> Self {
        let mut report = Self::connected(Verdict::ConnectedLimited, MSG_LIMITED);
        report.warning = Some(format!("Limited permissions: {}", reason));
        report
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

pub fn classify_version_probe(result: &Result<ServerVersion, KubeError>) -> VersionProbe {
    let err = match result {
        Ok(_) => return VersionProbe::Reachable,
        Err(err) => err,
    };

    match err.status() {
        Some(401) => VersionProbe::Failed {
            error: format!("Authentication failed: {}", err.reason()),
            http_status: Some(401),
        },
        Some(403) => VersionProbe::Limited(err.reason()),
        Some(status) => VersionProbe::Failed {
            error: format!("API error: {}", err.reason()),
            http_status: Some(status),
        },
        None => VersionProbe::Failed {
            error: err.to_string(),
            http_status: None,
        },
    }
}

/// `result` carries the number of objects the probe could see
pub fn classify_deep_probe(result: Result<usize, KubeError>) -> ProbeEnrichment {
    match result {
        Ok(count) => ProbeEnrichment::Counted(count),
        Err(err) if err.is_forbidden() => ProbeEnrichment::Denied(err.reason()),
        Err(err) => ProbeEnrichment::Unavailable(err.to_string()),
    }
}

/// Combine both probes into the final report. `deep` is `None` when the
/// second probe was not run.
pub fn build_report(
    in_cluster: bool,
    version: VersionProbe,
    deep: Option<ProbeEnrichment>,
) -> ConnectionReport {
    let mut report = match version {
        VersionProbe::Failed { error, http_status } => return ConnectionReport::failed(error, http_status),
        VersionProbe::Limited(reason) => ConnectionReport::limited(&reason),
        VersionProbe::Reachable => match &deep {
            Some(ProbeEnrichment::Denied(reason)) => ConnectionReport::limited(reason),
            Some(ProbeEnrichment::Counted(count)) if !in_cluster => {
                let mut report = ConnectionReport::connected(
                    Verdict::Connected,
                    &format!("Successfully connected. Found {} namespaces.", count),
                );
                report.namespace_count = Some(*count);
                report
            }
            Some(ProbeEnrichment::Counted(count)) => {
                let mut report = ConnectionReport::connected(Verdict::Connected, MSG_IN_CLUSTER);
                report.namespace_count = Some(*count);
                report
            }
            _ if in_cluster => ConnectionReport::connected(Verdict::Connected, MSG_IN_CLUSTER),
            _ => ConnectionReport::connected(Verdict::Connected, MSG_CONNECTED),
        },
    };
    report.enrichment = deep;
    report
}
