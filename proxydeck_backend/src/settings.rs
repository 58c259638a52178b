use crate::config::DEFAULT_TIMEZONE;
use crate::store::JsonStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Operator-tunable console settings, persisted as `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSettings {
    pub timezone: i32,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

/// Partial update applied over the current settings. Absent fields keep
/// their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub timezone: Option<i32>,
}

#[derive(Clone)]
pub struct SettingsService {
    store: JsonStore<ConsoleSettings>,
}

impl SettingsService {
    pub fn new(store: JsonStore<ConsoleSettings>) -> Self {
        Self { store }
    }

    pub fn current(&self) -> Result<ConsoleSettings> {
        self.store.read(|settings| settings.clone())
    }

    /// The display timezone, falling back to the default when the store is
    /// unreadable. Timestamp rendering must never fail a request.
    pub fn timezone(&self) -> i32 {
        self.store
            .read(|settings| settings.timezone)
            .unwrap_or(DEFAULT_TIMEZONE)
    }

    pub fn apply(&self, update: SettingsUpdate) -> Result<ConsoleSettings> {
        self.store.update(|settings| {
            if let Some(timezone) = update.timezone {
                settings.timezone = timezone;
            }
            settings.clone()
        })
    }
}
