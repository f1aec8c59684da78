use std::sync::Arc;

use yafti_core::catalog::ActionCatalog;
use yafti_core::config::Config;

use crate::heartbeat::Heartbeat;
use crate::lifecycle::Shutdown;
use crate::runner::ScriptRunner;
use crate::settings::ServerSettings;

/// Shared application state passed to all route handlers.
///
/// The config is immutable after load; the catalog is the runtime lookup
/// built from it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<ActionCatalog>,
    pub heartbeat: Arc<Heartbeat>,
    pub runner: ScriptRunner,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(config: Config, settings: &ServerSettings) -> Self {
        let settings = settings.clone().normalized();
        let catalog = ActionCatalog::from_config(&config);
        let heartbeat = Heartbeat::new(settings.heartbeat_timeout, settings.heartbeat_tick);
        if settings.inhibit_shutdown {
            heartbeat.set_inhibit(true);
        }
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            heartbeat: Arc::new(heartbeat),
            runner: ScriptRunner::new(settings.shell),
            shutdown: Shutdown::new(),
        }
    }
}
