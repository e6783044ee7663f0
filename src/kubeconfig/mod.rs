//! Kubeconfig documents: the credential blob stored per cluster
//!
//! Validation is pure. Stored kubeconfigs are turned into client configs in
//! memory and must carry every credential inline: a stored document may not
//! point the service at files or helper programs on its own host.

use base64::{engine::general_purpose, Engine as _};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use serde::Serialize;
use serde_json::json;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Errors that can occur while reading a kubeconfig
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KubeconfigError {
    #[error("Kubeconfig is empty")]
    Empty,

    #[error("Invalid YAML format: {0}")]
    Parse(String),

    #[error("Invalid kubeconfig format: not a dictionary")]
    NotAMapping,

    #[error("Missing 'apiVersion' field")]
    MissingApiVersion,

    #[error("Invalid kind: expected 'Config'")]
    InvalidKind,

    #[error("No clusters defined in kubeconfig")]
    NoClusters,

    #[error("'{0}' references a file; embed the data inline instead")]
    FileReference(String),

    #[error("'{0}' runs a credential plugin, which is not supported")]
    CredentialPlugin(String),

    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("Failed to load kubeconfig: {0}")]
    Load(String),

    #[error("Failed to write kubeconfig: {0}")]
    Write(String),
}

/// Counts reported by a successful validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KubeconfigSummary {
    pub clusters: usize,
    pub contexts: usize,
    pub users: usize,
}

/// Cluster fields naming a file on the reading host
const CLUSTER_FILE_FIELDS: [&str; 1] = ["certificate-authority"];

/// User fields naming a file on the reading host
const USER_FILE_FIELDS: [&str; 3] = ["tokenFile", "client-certificate", "client-key"];

/// User fields that run or delegate to another program
const USER_PLUGIN_FIELDS: [&str; 2] = ["exec", "auth-provider"];

const SERVICE_ACCOUNT_USER: &str = "in-cluster-service-account";
const SERVICE_ACCOUNT_CONTEXT: &str = "in-cluster-context";

/// Stand-ins used when a document names a cluster but no context
const DEFAULT_CONTEXT: &str = "default";
const ANONYMOUS_USER: &str = "anonymous";

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Validate kubeconfig text: YAML mapping, `apiVersion` present,
/// `kind: Config`, at least one cluster, credentials inline only.
pub fn validate(text: &str) -> Result<KubeconfigSummary, KubeconfigError> {
    let doc = parse_document(text)?;

    if !doc.contains_key("apiVersion") {
        return Err(KubeconfigError::MissingApiVersion);
    }
    if doc.get("kind").and_then(Value::as_str) != Some("Config") {
        return Err(KubeconfigError::InvalidKind);
    }
    if section(&doc, "clusters").is_empty() {
        return Err(KubeconfigError::NoClusters);
    }
    require_inline_credentials(&doc)?;

    Ok(KubeconfigSummary {
        clusters: section(&doc, "clusters").len(),
        contexts: section(&doc, "contexts").len(),
        users: section(&doc, "users").len(),
    })
}

fn parse_document(text: &str) -> Result<Mapping, KubeconfigError> {
    if text.trim().is_empty() {
        return Err(KubeconfigError::Empty);
    }
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| KubeconfigError::Parse(e.to_string()))?;
    match value {
        Value::Mapping(doc) => Ok(doc),
        _ => Err(KubeconfigError::NotAMapping),
    }
}

/// Entries of a top-level list such as `clusters`; empty when absent
fn section<'a>(doc: &'a Mapping, key: &str) -> &'a [Value] {
    doc.get(key)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn entry_name(entry: &Value) -> &str {
    entry.get("name").and_then(Value::as_str).unwrap_or_default()
}

fn names(doc: &Mapping, key: &str) -> Vec<String> {
    section(doc, key)
        .iter()
        .map(|entry| entry_name(entry).to_string())
        .collect()
}

/// Reject fields that would make the reader open local files or run
/// programs while building a client
pub fn require_inline_credentials(doc: &Mapping) -> Result<(), KubeconfigError> {
    let checks: [(&str, &str, &[&str], fn(String) -> KubeconfigError); 3] = [
        ("clusters", "cluster", &CLUSTER_FILE_FIELDS, KubeconfigError::FileReference),
        ("users", "user", &USER_FILE_FIELDS, KubeconfigError::FileReference),
        ("users", "user", &USER_PLUGIN_FIELDS, KubeconfigError::CredentialPlugin),
    ];

    for (key, body, fields, reject) in checks {
        for entry in section(doc, key) {
            let Some(settings) = entry.get(body) else {
                continue;
            };
            if let Some(field) = fields.iter().find(|f| settings.get(**f).is_some_and(|v| !v.is_null())) {
                return Err(reject(format!("{}[{}].{}", key, entry_name(entry), field)));
            }
        }
    }
    Ok(())
}

/// Make sure `current-context` names an existing context.
///
/// Without one, the first context is used; a document with no contexts at
/// all gets a context binding its first cluster to its first user.
fn select_context(doc: &mut Mapping) -> Result<(), KubeconfigError> {
    let current = doc
        .get("current-context")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let contexts = names(doc, "contexts");

    if let Some(name) = current {
        return if contexts.contains(&name) {
            Ok(())
        } else {
            Err(KubeconfigError::ContextNotFound(name))
        };
    }

    if let Some(first) = contexts.into_iter().next() {
        doc.insert("current-context".into(), first.into());
        return Ok(());
    }

    let cluster = names(doc, "clusters")
        .into_iter()
        .next()
        .ok_or(KubeconfigError::NoClusters)?;
    let user = match names(doc, "users").into_iter().next() {
        Some(user) => user,
        None => {
            push_entry(doc, "users", yaml(json!({"name": ANONYMOUS_USER, "user": {}}))?);
            ANONYMOUS_USER.to_string()
        }
    };
    push_entry(
        doc,
        "contexts",
        yaml(json!({"name": DEFAULT_CONTEXT, "context": {"cluster": cluster, "user": user}}))?,
    );
    doc.insert("current-context".into(), DEFAULT_CONTEXT.into());
    Ok(())
}

fn push_entry(doc: &mut Mapping, key: &str, entry: Value) {
    let slot = doc.entry(key.into()).or_insert(Value::Null);
    if !slot.is_sequence() {
        *slot = Value::Sequence(Vec::new());
    }
    if let Value::Sequence(entries) = slot {
        entries.push(entry);
    }
}

fn yaml(value: serde_json::Value) -> Result<Value, KubeconfigError> {
    serde_yaml::to_value(value).map_err(|e| KubeconfigError::Write(e.to_string()))
}

/// Single-cluster kubeconfig for a service-account token
pub fn service_account_kubeconfig(
    cluster_name: &str,
    server: &str,
    ca_pem: &[u8],
    token: &str,
    namespace: &str,
) -> Result<String, KubeconfigError> {
    let doc = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": cluster_name,
            "cluster": {
                "server": server,
                "certificate-authority-data": general_purpose::STANDARD.encode(ca_pem),
            },
        }],
        "contexts": [{
            "name": SERVICE_ACCOUNT_CONTEXT,
            "context": {
                "cluster": cluster_name,
                "user": SERVICE_ACCOUNT_USER,
                "namespace": namespace,
            },
        }],
        "users": [{
            "name": SERVICE_ACCOUNT_USER,
            "user": {"token": token},
        }],
        "current-context": SERVICE_ACCOUNT_CONTEXT,
    });
    serde_yaml::to_string(&doc).map_err(|e| KubeconfigError::Write(e.to_string()))
}

// ============================================================================
// Client configuration
// ============================================================================

/// Client config for a stored kubeconfig, built in memory.
///
/// Documents referencing local files or credential plugins are refused.
pub async fn client_config(text: &str) -> Result<Config, KubeconfigError> {
    let doc = parse_document(text)?;
    require_inline_credentials(&doc)?;
    into_config(doc).await
}

/// Client config for the operator's own kubeconfig file, which may
/// reference files and plugins like any kubectl configuration
pub async fn local_client_config(text: &str) -> Result<Config, KubeconfigError> {
    into_config(parse_document(text)?).await
}

async fn into_config(mut doc: Mapping) -> Result<Config, KubeconfigError> {
    select_context(&mut doc)?;
    let kubeconfig: Kubeconfig = serde_yaml::from_value(Value::Mapping(doc))
        .map_err(|e| KubeconfigError::Parse(e.to_string()))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| KubeconfigError::Load(e.to_string()))
}
