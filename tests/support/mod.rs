//! Thin HTTP server emulating the slice of the Kubernetes API the
//! inventory talks to.
//!
//! Bearer tokens select the permission set:
//! - `bad-token`: 401 everywhere
//! - `limited-token`: `/version` works, everything else is 403
//! - `version-forbidden`: 403 everywhere
//! - any other token, or none: full access

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use cluster_inventory::config::InventoryConfig;
use cluster_inventory::discovery::InClusterEnvironment;
use cluster_inventory::inventory::ClusterInventory;
use cluster_inventory::kube::{HttpConnector, KubeApiClient};
use kube::Config;

pub const BAD_TOKEN: &str = "bad-token";
pub const LIMITED_TOKEN: &str = "limited-token";
pub const VERSION_FORBIDDEN_TOKEN: &str = "version-forbidden";

pub const NAMESPACES: [&str; 4] = ["default", "kube-system", "kube-public", "sreagent"];

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Kind {
    Secret,
    ConfigMap,
}

impl Kind {
    fn plural(&self) -> &'static str {
        match self {
            Kind::Secret => "secrets",
            Kind::ConfigMap => "configmaps",
        }
    }
}

type ObjectKey = (Kind, String, String);

#[derive(Default)]
struct Objects {
    items: BTreeMap<ObjectKey, Value>,
    next_version: u64,
}

impl Objects {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Clone, Default)]
struct FakeState {
    objects: Arc<Mutex<Objects>>,
}

/// A running fake API server
pub struct FakeApiServer {
    pub url: String,
    state: FakeState,
}

impl FakeApiServer {
    /// Data of a ConfigMap, empty when it does not exist
    pub fn config_map_data(&self, namespace: &str, name: &str) -> BTreeMap<String, String> {
        let objects = self.state.objects.lock().unwrap();
        objects
            .items
            .get(&(Kind::ConfigMap, namespace.to_string(), name.to_string()))
            .and_then(|cm| cm.get("data").cloned())
            .and_then(|data| serde_json::from_value(data).ok())
            .unwrap_or_default()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Value> {
        let objects = self.state.objects.lock().unwrap();
        objects
            .items
            .get(&(Kind::Secret, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn secret_names(&self, namespace: &str) -> Vec<String> {
        let objects = self.state.objects.lock().unwrap();
        objects
            .items
            .keys()
            .filter(|(kind, ns, _)| *kind == Kind::Secret && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Overwrite one ConfigMap field directly, bypassing the inventory
    pub fn set_config_map_field(&self, namespace: &str, name: &str, key: &str, value: &str) {
        let mut objects = self.state.objects.lock().unwrap();
        let version = objects.bump();
        let cm = objects
            .items
            .entry((Kind::ConfigMap, namespace.to_string(), name.to_string()))
            .or_insert_with(|| {
                json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": name, "namespace": namespace},
                    "data": {}
                })
            });
        cm["data"][key] = Value::String(value.to_string());
        cm["metadata"]["resourceVersion"] = Value::String(version);
    }

    /// Set one annotation on an object, the way another controller would
    pub fn annotate_config_map(&self, namespace: &str, name: &str, key: &str, value: &str) {
        let mut objects = self.state.objects.lock().unwrap();
        let version = objects.bump();
        let cm = objects
            .items
            .get_mut(&(Kind::ConfigMap, namespace.to_string(), name.to_string()))
            .expect("config map exists");
        cm["metadata"]["annotations"][key] = Value::String(value.to_string());
        cm["metadata"]["resourceVersion"] = Value::String(version);
    }

    /// Drop one data key from a Secret, keeping the Secret itself
    pub fn remove_secret_key(&self, namespace: &str, name: &str, key: &str) {
        let mut objects = self.state.objects.lock().unwrap();
        let version = objects.bump();
        let secret = objects
            .items
            .get_mut(&(Kind::Secret, namespace.to_string(), name.to_string()))
            .expect("secret exists");
        if let Some(data) = secret["data"].as_object_mut() {
            data.remove(key);
        }
        secret["metadata"]["resourceVersion"] = Value::String(version);
    }

    /// Raw stored ConfigMap
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<Value> {
        let objects = self.state.objects.lock().unwrap();
        objects
            .items
            .get(&(Kind::ConfigMap, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Control-plane client with full access
    pub fn client(&self) -> KubeApiClient {
        client_for(&self.url)
    }

    /// Inventory whose control plane is this server
    pub fn inventory(&self, namespace: &str) -> ClusterInventory {
        let config = InventoryConfig {
            namespace: namespace.to_string(),
            probe_timeout: Duration::from_secs(5),
            metadata_max_attempts: 20,
            ..Default::default()
        };
        ClusterInventory::from_config(
            Arc::new(self.client()),
            Arc::new(HttpConnector),
            InClusterEnvironment::outside_cluster(),
            &config,
        )
    }

    /// Kubeconfig pointing at this server with the given bearer token
    pub fn kubeconfig(&self, token: &str) -> String {
        kubeconfig_for(&self.url, token)
    }
}

pub fn kubeconfig_for(server: &str, token: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: fake
  cluster:
    server: {server}
contexts:
- name: fake
  context:
    cluster: fake
    user: tester
current-context: fake
users:
- name: tester
  user:
    token: {token}
"#
    )
}

/// Client without credentials for any URL
pub fn client_for(url: &str) -> KubeApiClient {
    KubeApiClient::new(Config::new(url.parse().unwrap()), Duration::from_secs(5)).unwrap()
}

/// Address nothing listens on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub async fn start() -> FakeApiServer {
    let state = FakeState::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeApiServer {
        url: format!("http://{}", addr),
        state,
    }
}

fn router(state: FakeState) -> Router {
    Router::new()
        .route("/version", get(version))
        .route("/api/v1/namespaces", get(list_namespaces))
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/namespaces/{ns}/pods", get(list_pods))
        .route(
            "/api/v1/namespaces/{ns}/secrets",
            get(list_secrets).post(create_secret),
        )
        .route(
            "/api/v1/namespaces/{ns}/secrets/{name}",
            get(read_secret).put(replace_secret).delete(delete_secret),
        )
        .route("/api/v1/namespaces/{ns}/configmaps", post(create_config_map))
        .route(
            "/api/v1/namespaces/{ns}/configmaps/{name}",
            get(read_config_map).put(replace_config_map),
        )
        .with_state(state)
}

// ============================================================================
// Auth and errors
// ============================================================================

type ApiResult = Result<Json<Value>, Response>;

fn status_error(code: StatusCode, reason: &str, message: impl Into<String>) -> Response {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message.into(),
        "reason": reason,
        "code": code.as_u16(),
    });
    (code, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authorize(headers: &HeaderMap, version_endpoint: bool) -> Result<(), Response> {
    match bearer(headers) {
        Some(BAD_TOKEN) => Err(status_error(StatusCode::UNAUTHORIZED, "Unauthorized", "Unauthorized")),
        Some(LIMITED_TOKEN) if !version_endpoint => Err(status_error(
            StatusCode::FORBIDDEN,
            "Forbidden",
            "namespaces is forbidden: User \"limited\" cannot list resource",
        )),
        Some(VERSION_FORBIDDEN_TOKEN) => Err(status_error(
            StatusCode::FORBIDDEN,
            "Forbidden",
            "forbidden: User \"nobody\" cannot get path \"/version\"",
        )),
        _ => Ok(()),
    }
}

fn not_found(kind: Kind, name: &str) -> Response {
    status_error(
        StatusCode::NOT_FOUND,
        "NotFound",
        format!("{} \"{}\" not found", kind.plural(), name),
    )
}

// ============================================================================
// Cluster-scoped reads
// ============================================================================

async fn version(headers: HeaderMap) -> ApiResult {
    authorize(&headers, true)?;
    Ok(Json(json!({
        "major": "1",
        "minor": "29",
        "gitVersion": "v1.29.2",
        "gitCommit": "4b8e819355d791d96b7e9d9efe4cbafae2311c88",
        "gitTreeState": "clean",
        "buildDate": "2024-02-14T10:32:40Z",
        "goVersion": "go1.21.7",
        "compiler": "gc",
        "platform": "linux/amd64"
    })))
}

fn limited_list(names: &[&str], params: &HashMap<String, String>) -> Value {
    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(names.len());
    let items: Vec<Value> = names
        .iter()
        .take(limit)
        .map(|name| json!({"metadata": {"name": name}}))
        .collect();
    let remaining = names.len().saturating_sub(items.len());
    let metadata = if remaining > 0 {
        json!({"remainingItemCount": remaining, "continue": "next"})
    } else {
        json!({})
    };
    json!({"apiVersion": "v1", "kind": "List", "metadata": metadata, "items": items})
}

async fn list_namespaces(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> ApiResult {
    authorize(&headers, false)?;
    Ok(Json(limited_list(&NAMESPACES, &params)))
}

async fn list_nodes(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> ApiResult {
    authorize(&headers, false)?;
    Ok(Json(limited_list(&["node-1"], &params)))
}

async fn list_pods(
    headers: HeaderMap,
    Path(_ns): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    authorize(&headers, false)?;
    Ok(Json(limited_list(&["inventory-0"], &params)))
}

// ============================================================================
// Namespaced objects
// ============================================================================

fn matches_selector(object: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => object["metadata"]["labels"][key].as_str() == Some(value),
            None => !object["metadata"]["labels"][term].is_null(),
        })
}

fn list_objects(state: &FakeState, kind: Kind, ns: &str, selector: &str) -> Value {
    let objects = state.objects.lock().unwrap();
    let items: Vec<Value> = objects
        .items
        .iter()
        .filter(|((k, n, _), obj)| *k == kind && n == ns && matches_selector(obj, selector))
        .map(|(_, obj)| obj.clone())
        .collect();
    json!({"apiVersion": "v1", "kind": "List", "metadata": {}, "items": items})
}

fn read_object(state: &FakeState, kind: Kind, ns: String, name: String) -> ApiResult {
    let objects = state.objects.lock().unwrap();
    objects
        .items
        .get(&(kind, ns, name.clone()))
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(kind, &name))
}

fn create_object(state: &FakeState, kind: Kind, ns: String, mut body: Value) -> ApiResult {
    let name = body["metadata"]["name"].as_str().unwrap_or_default().to_string();
    let mut objects = state.objects.lock().unwrap();
    let key = (kind, ns.clone(), name.clone());
    if objects.items.contains_key(&key) {
        return Err(status_error(
            StatusCode::CONFLICT,
            "AlreadyExists",
            format!("{} \"{}\" already exists", kind.plural(), name),
        ));
    }
    body["metadata"]["namespace"] = Value::String(ns);
    body["metadata"]["resourceVersion"] = Value::String(objects.bump());
    objects.items.insert(key, body.clone());
    Ok(Json(body))
}

fn replace_object(state: &FakeState, kind: Kind, ns: String, name: String, mut body: Value) -> ApiResult {
    let mut objects = state.objects.lock().unwrap();
    let key = (kind, ns.clone(), name.clone());
    let current = objects
        .items
        .get(&key)
        .ok_or_else(|| not_found(kind, &name))?;

    if let Some(expected) = body["metadata"]["resourceVersion"].as_str() {
        if current["metadata"]["resourceVersion"].as_str() != Some(expected) {
            return Err(status_error(
                StatusCode::CONFLICT,
                "Conflict",
                format!(
                    "Operation cannot be fulfilled on {} \"{}\": the object has been modified; please apply your changes to the latest version and try again",
                    kind.plural(),
                    name
                ),
            ));
        }
    }

    body["metadata"]["namespace"] = Value::String(ns);
    body["metadata"]["resourceVersion"] = Value::String(objects.bump());
    objects.items.insert(key, body.clone());
    Ok(Json(body))
}

async fn list_secrets(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(ns): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    authorize(&headers, false)?;
    let selector = params.get("labelSelector").map(String::as_str).unwrap_or("");
    Ok(Json(list_objects(&state, Kind::Secret, &ns, selector)))
}

async fn create_secret(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(ns): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    authorize(&headers, false)?;
    create_object(&state, Kind::Secret, ns, body)
}

async fn read_secret(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    authorize(&headers, false)?;
    read_object(&state, Kind::Secret, ns, name)
}

async fn replace_secret(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path((ns, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    authorize(&headers, false)?;
    replace_object(&state, Kind::Secret, ns, name, body)
}

async fn delete_secret(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    authorize(&headers, false)?;
    let mut objects = state.objects.lock().unwrap();
    match objects.items.remove(&(Kind::Secret, ns, name.clone())) {
        Some(_) => Ok(Json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Success",
            "code": 200
        }))),
        None => Err(not_found(Kind::Secret, &name)),
    }
}

async fn create_config_map(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(ns): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    authorize(&headers, false)?;
    create_object(&state, Kind::ConfigMap, ns, body)
}

async fn read_config_map(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path((ns, name)): Path<(String, String)>,
) -> ApiResult {
    authorize(&headers, false)?;
    read_object(&state, Kind::ConfigMap, ns, name)
}

async fn replace_config_map(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path((ns, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    authorize(&headers, false)?;
    replace_object(&state, Kind::ConfigMap, ns, name, body)
}
