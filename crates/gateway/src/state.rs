use std::sync::Arc;

use ao_domain::config::Config;
use ao_metrics::MetricsCollector;
use ao_providers::ProviderFactory;
use ao_sessions::SessionStore;
use ao_tools::ToolRegistry;

use crate::runtime::cancel::CancelMap;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub factory: Arc<ProviderFactory>,
    pub sessions: Arc<SessionStore>,
    pub metrics: Arc<MetricsCollector>,
    pub tools: Arc<ToolRegistry>,
    pub cancel_map: Arc<CancelMap>,
}

impl AppState {
    /// Wire up a fresh state tree from config. Tests use this with a
    /// default config to get fully isolated stores and registries.
    pub fn build(config: Config) -> ao_domain::Result<Self> {
        let tools = Arc::new(ToolRegistry::builtin());
        let factory = Arc::new(ProviderFactory::new(
            tools.names(),
            std::time::Duration::from_secs(config.providers.call_timeout_secs),
        ));
        let sessions = Arc::new(SessionStore::new(config.sessions.trace_cap));
        let metrics = Arc::new(MetricsCollector::new()?);

        Ok(Self {
            config: Arc::new(config),
            factory,
            sessions,
            metrics,
            tools,
            cancel_map: Arc::new(CancelMap::new()),
        })
    }
}
