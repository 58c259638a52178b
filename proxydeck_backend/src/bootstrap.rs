use crate::aliases::AliasService;
use crate::config::{DeckConfig, DEFAULT_API_TOKEN};
use crate::dispatch::DispatchService;
use crate::events::EventLog;
use crate::registry::RegistryService;
use crate::settings::{ConsoleSettings, SettingsService};
use crate::store::JsonStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Handles to every service backed by the data directory.
#[derive(Clone)]
pub struct DeckServices {
    pub registry: RegistryService,
    pub aliases: AliasService,
    pub settings: SettingsService,
    pub events: EventLog,
    pub dispatch: DispatchService,
}

pub struct BootstrapResources {
    pub directories_created: Vec<String>,
    pub services: DeckServices,
}

/// Prepares the data directory and wires the service graph together.
/// Missing store files start as empty documents, so a fresh directory
/// needs no seeding step.
pub fn initialize(config: &DeckConfig) -> Result<BootstrapResources> {
    let mut directories_created = Vec::new();
    create_dir_if_missing(&config.paths.data_dir, &mut directories_created)?;

    if config.api_token == DEFAULT_API_TOKEN {
        tracing::warn!("PROXYDECK_API_TOKEN is unset, the console accepts the default token");
    }

    let settings = SettingsService::new(JsonStore::open_with(
        &config.paths.settings_file,
        ConsoleSettings {
            timezone: config.default_timezone,
        },
    ));
    let aliases = AliasService::new(JsonStore::open(&config.paths.alias_file));
    let events = EventLog::new(&config.paths.event_log_file, settings.clone());
    let registry = RegistryService::new(
        JsonStore::open(&config.paths.registry_file),
        aliases.clone(),
        settings.clone(),
        events.clone(),
    );
    let dispatch = DispatchService::new(
        registry.clone(),
        aliases.clone(),
        events.clone(),
        config.api_token.clone(),
        config.dispatch.worker_port,
    )?;

    Ok(BootstrapResources {
        directories_created,
        services: DeckServices {
            registry,
            aliases,
            settings,
            events,
            dispatch,
        },
    })
}

fn create_dir_if_missing(dir: &Path, created: &mut Vec<String>) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
        created.push(dir.display().to_string());
    }
    Ok(())
}
