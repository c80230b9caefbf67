//! Inference service: loads one model version at startup and serves predictions from it.

pub mod loader;
pub mod metrics;
pub mod routes;

pub use loader::{load, load_configured, resolve_and_load};
pub use routes::{router, AppState, PredictionRequest, PredictionResponse};
