use panel_core::inventory::{self, ServerRecord};
use panel_core::remote::{AnsibleExecutor, RemoteExecutor};
use panel_core::settings::Settings;
use panel_core::status::StatusAggregator;
use panel_core::{PanelError, Result};
use std::sync::{Arc, RwLock};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub aggregator: Arc<StatusAggregator>,
    /// Servers as loaded from the inventory, with the last merged status.
    servers: Arc<RwLock<Vec<ServerRecord>>>,
}

impl AppState {
    /// State backed by the real `ansible` CLI.
    pub fn new(settings: Settings) -> Self {
        let executor = AnsibleExecutor::from_settings(&settings);
        Self::with_executor(settings, Arc::new(executor))
    }

    pub fn with_executor(settings: Settings, executor: Arc<dyn RemoteExecutor>) -> Self {
        let aggregator = StatusAggregator::new(Arc::clone(&executor), &settings);
        let servers = inventory::load_servers(&settings.inventory);
        tracing::info!(count = servers.len(), inventory = %settings.inventory.display(), "loaded servers");
        Self {
            settings: Arc::new(settings),
            executor,
            aggregator: Arc::new(aggregator),
            servers: Arc::new(RwLock::new(servers)),
        }
    }

    pub fn servers(&self) -> Vec<ServerRecord> {
        self.servers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Re-read the inventory after it was edited, returning the new list.
    pub fn reload_servers(&self) -> Vec<ServerRecord> {
        let fresh = inventory::load_servers(&self.settings.inventory);
        *self.servers.write().unwrap_or_else(|e| e.into_inner()) = fresh.clone();
        fresh
    }

    /// Apply `update` to every stored record.
    pub fn update_servers(&self, mut update: impl FnMut(&mut ServerRecord)) {
        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        servers.iter_mut().for_each(&mut update);
    }

    /// The known server with address `host`.
    pub fn require_host(&self, host: &str) -> Result<ServerRecord> {
        inventory::find_by_host(&self.servers(), host)
            .cloned()
            .ok_or_else(|| PanelError::ServerNotFound(host.to_string()))
    }
}
