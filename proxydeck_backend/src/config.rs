use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_PORT: u16 = 5000;
pub const DEFAULT_WORKER_PORT: u16 = 4444;
pub const DEFAULT_API_TOKEN: &str = "changeme";
pub const DEFAULT_ADMIN_PATH: &str = "/secret_panel";
pub const DEFAULT_TIMEZONE: i32 = 8;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct DeckConfig {
    pub api_port: u16,
    pub api_token: String,
    pub admin_path: String,
    pub default_timezone: i32,
    pub dispatch: DispatchConfig,
    pub paths: DeckPaths,
}

impl DeckConfig {
    pub fn from_env() -> Self {
        let api_port = env::var("PROXYDECK_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_API_PORT);
        let api_token = env::var("PROXYDECK_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_TOKEN.to_string());
        let admin_path = sanitize_admin_path(
            env::var("PROXYDECK_ADMIN_PATH")
                .as_deref()
                .unwrap_or(DEFAULT_ADMIN_PATH),
        );
        let default_timezone = env::var("PROXYDECK_TIMEZONE")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_TIMEZONE);
        let data_dir = env::var("PROXYDECK_DATA_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| ".".to_string());

        Self {
            api_port,
            api_token,
            admin_path,
            default_timezone,
            dispatch: DispatchConfig::from_env(),
            paths: DeckPaths::from_data_dir(data_dir),
        }
    }

    /// Constructor used by tests that need full control over ports and paths.
    pub fn new(api_port: u16, api_token: impl Into<String>, paths: DeckPaths) -> Self {
        Self {
            api_port,
            api_token: api_token.into(),
            admin_path: DEFAULT_ADMIN_PATH.to_string(),
            default_timezone: DEFAULT_TIMEZONE,
            dispatch: DispatchConfig::default(),
            paths,
        }
    }
}

/// Settings for the outbound refresh dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub worker_port: u16,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let worker_port = env::var("PROXYDECK_WORKER_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_WORKER_PORT);
        Self { worker_port }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_port: DEFAULT_WORKER_PORT,
        }
    }
}

/// Locations of every file the console persists under its data directory.
#[derive(Debug, Clone)]
pub struct DeckPaths {
    pub data_dir: PathBuf,
    pub registry_file: PathBuf,
    pub alias_file: PathBuf,
    pub settings_file: PathBuf,
    pub event_log_file: PathBuf,
}

impl DeckPaths {
    pub fn from_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            registry_file: data_dir.join("proxies.json"),
            alias_file: data_dir.join("aliases.json"),
            settings_file: data_dir.join("config.json"),
            event_log_file: data_dir.join("events.log"),
            data_dir,
        }
    }
}

/// The admin prefix must be non-root and slash-anchored so routes like
/// `{prefix}/login` stay valid. Anything unusable falls back to the default.
fn sanitize_admin_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_ADMIN_PATH.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
