use thiserror::Error;

/// Errors returned by control-plane calls
#[derive(Error, Debug, Clone)]
pub enum KubeError {
    #[error("API error {status} ({reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("Connection failed to {0}: {1}")]
    Connection(String, String),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Failed to decode response from {0}: {1}")]
    Decode(String, String),

    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Control plane client not available: {0}")]
    Unavailable(String),
}

impl KubeError {
    /// Build an API error with the canonical reason phrase for `status`
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        let reason = axum::http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
            .to_string();
        KubeError::Api {
            status,
            reason,
            message: message.into(),
        }
    }

    /// Convert a client error for a request against `target`.
    ///
    /// `Status` bodies keep their reason and message; a body without a
    /// reason falls back to the canonical phrase for the code.
    pub fn from_client(err: kube::Error, target: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.reason.is_empty() => {
                KubeError::api(response.code, response.message)
            }
            kube::Error::Api(response) => KubeError::Api {
                status: response.code,
                reason: response.reason,
                message: response.message,
            },
            kube::Error::SerdeError(e) => KubeError::Decode(target.to_string(), e.to_string()),
            other => KubeError::Connection(target.to_string(), other.to_string()),
        }
    }

    /// HTTP status code, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            KubeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 409: a stale resourceVersion on update, or a racing create
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// True when the control plane could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            KubeError::Connection(..) | KubeError::Timeout(_) | KubeError::Unavailable(_)
        )
    }

    /// Short human-readable reason, used in probe messages
    pub fn reason(&self) -> String {
        match self {
            KubeError::Api {
                reason, message, ..
            } if !message.is_empty() => format!("{} ({})", reason, message),
            KubeError::Api { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}
