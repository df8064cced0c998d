use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use tutorbridge::config::AppConfig;
use tutorbridge::error::AppError;
use tutorbridge::marketplace::{Marketplace, Stores};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the marketplace over the hosted backend when one is configured, otherwise over
/// process-local tables.
pub(crate) fn build_marketplace(config: &AppConfig) -> Result<Marketplace, AppError> {
    let stores = Stores::from_config(&config.backend)?;
    match config.backend.base_url.as_deref() {
        Some(url) => info!(backend = url, "using hosted backend with local fallback"),
        None => info!("no backend configured; using in-memory storage"),
    }
    Ok(Marketplace::new(stores, config.ledger))
}
