mod http;

use std::sync::atomic::AtomicBool;

use axum::Router;

use crate::config::ProxyConfig;
use crate::loader::ActionLoader;
use crate::registry::ExecutorRegistry;

pub use http::build_router;

/// Shared state handed to every axum handler (spec §4, §6 Globals).
pub struct AppState {
    pub registry: ExecutorRegistry,
    pub config: ProxyConfig,
    pub loader: ActionLoader,
    /// Set once `/init` has successfully installed a generic executor or
    /// there was simply nothing to load; mirrors `ap.initialized` in the
    /// original, surfaced mainly for diagnostics.
    pub initialized: AtomicBool,
}

pub fn router(state: std::sync::Arc<AppState>) -> Router {
    build_router(state)
}
