use anyhow::Context as _;
use panel_core::inventory::{self, ServerRecord};
use panel_core::remote::AnsibleExecutor;
use panel_core::settings::Settings;
use std::path::{Path, PathBuf};

/// Settings resolved from the settings file and command-line overrides.
pub struct Context {
    pub settings: Settings,
    pub settings_path: PathBuf,
}

impl Context {
    pub fn load(
        path: &Path,
        inventory: Option<PathBuf>,
        vault: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let mut settings = Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        if let Some(inventory) = inventory {
            settings.inventory = inventory;
        }
        if let Some(vault) = vault {
            settings.vault = vault;
        }
        Ok(Self {
            settings,
            settings_path: path.to_path_buf(),
        })
    }

    pub fn executor(&self) -> AnsibleExecutor {
        AnsibleExecutor::from_settings(&self.settings)
    }

    pub fn servers(&self) -> Vec<ServerRecord> {
        inventory::load_servers(&self.settings.inventory)
    }

    /// Look up a server by inventory name, then by address.
    pub fn server(&self, name_or_host: &str) -> anyhow::Result<ServerRecord> {
        let servers = self.servers();
        inventory::find_by_name(&servers, name_or_host)
            .or_else(|| inventory::find_by_host(&servers, name_or_host))
            .cloned()
            .ok_or_else(|| panel_core::PanelError::ServerNotFound(name_or_host.to_string()).into())
    }
}
