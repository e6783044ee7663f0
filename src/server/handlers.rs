use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::record::{Cluster, ClusterUpdate, NewCluster};
use crate::server::error::ApiError;
use crate::server::state::AppState;

const SERVICE_NAME: &str = "cluster-inventory";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub cluster_id: String,
}

#[derive(Debug, Serialize)]
pub struct KubeconfigResponse {
    pub cluster_id: String,
    pub kubeconfig: String,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub message: String,
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Cluster>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoverParams {
    #[serde(default)]
    pub force: bool,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        ready: state.is_ready(),
    })
}

/// Service banner
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "Cluster Inventory",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "clusters": "/clusters",
        },
    }))
}

pub async fn create_cluster(
    State(state): State<AppState>,
    Json(new): Json<NewCluster>,
) -> Result<Json<Cluster>, ApiError> {
    let id = state.inventory.register(new).await?;
    info!("Cluster registered via API: {}", id);
    state
        .inventory
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::internal("Cluster registered but not found"))
}

pub async fn list_clusters(State(state): State<AppState>) -> Result<Json<Vec<Cluster>>, ApiError> {
    Ok(Json(state.inventory.list().await?))
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<Cluster>, ApiError> {
    state
        .inventory
        .get(&cluster_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Cluster not found"))
}

pub async fn update_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Json(update): Json<ClusterUpdate>,
) -> Result<Json<Cluster>, ApiError> {
    state.inventory.update(&cluster_id, &update).await?;
    state
        .inventory
        .get(&cluster_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Cluster not found after update"))
}

pub async fn delete_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.inventory.delete(&cluster_id).await?;
    Ok(Json(DeleteResponse {
        message: "Cluster deleted successfully".to_string(),
        cluster_id,
    }))
}

pub async fn test_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> impl IntoResponse {
    Json(state.inventory.test_connection(&cluster_id).await)
}

pub async fn cluster_info(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .inventory
        .get_info(&cluster_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Cluster not found"))
}

pub async fn cluster_kubeconfig(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<KubeconfigResponse>, ApiError> {
    match state.inventory.get_kubeconfig(&cluster_id).await? {
        Some(kubeconfig) => Ok(Json(KubeconfigResponse {
            cluster_id,
            kubeconfig,
        })),
        None => Err(ApiError::not_found("Kubeconfig not found")),
    }
}

pub async fn discover(
    State(state): State<AppState>,
    Query(params): Query<DiscoverParams>,
) -> Json<DiscoverResponse> {
    let outcome = state.inventory.discover(params.force).await;

    let cluster = match outcome.cluster_id() {
        Some(id) => state.inventory.get(id).await.unwrap_or_else(|e| {
            warn!("Discovered cluster {} could not be read back: {}", id, e);
            None
        }),
        None => None,
    };

    Json(DiscoverResponse {
        message: outcome.message(),
        cluster_id: outcome.cluster_id().map(str::to_string),
        cluster,
    })
}

async fn not_found() -> impl IntoResponse {
    ApiError::new(StatusCode::NOT_FOUND, "Not Found")
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
        .route("/clusters", get(list_clusters).post(create_cluster))
        .route("/clusters/discover", post(discover))
        .route(
            "/clusters/{cluster_id}",
            get(get_cluster).put(update_cluster).delete(delete_cluster),
        )
        .route("/clusters/{cluster_id}/test", post(test_cluster))
        .route("/clusters/{cluster_id}/info", get(cluster_info))
        .route("/clusters/{cluster_id}/kubeconfig", get(cluster_kubeconfig))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
