use std::sync::Arc;

use crate::config::ControlPlaneSource;
use crate::inventory::ClusterInventory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<ClusterInventory>,
    pub source: ControlPlaneSource,
}

impl AppState {
    pub fn new(inventory: ClusterInventory, source: ControlPlaneSource) -> Self {
        Self {
            inventory: Arc::new(inventory),
            source,
        }
    }

    /// False when no control-plane client could be configured
    pub fn is_ready(&self) -> bool {
        !matches!(self.source, ControlPlaneSource::Disconnected(_))
    }
}
