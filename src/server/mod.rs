//! HTTP API over the cluster inventory

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use handlers::create_router;
pub use state::AppState;
