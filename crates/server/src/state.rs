//! Application state
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use echoai_config::Settings;
use echoai_providers::ProviderChains;

use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub chains: Arc<ProviderChains>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: Settings,
        chains: Arc<ProviderChains>,
        metrics: PrometheusHandle,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(&config, Arc::clone(&chains)));
        Self {
            config: Arc::new(config),
            sessions,
            chains,
            metrics,
        }
    }
}
