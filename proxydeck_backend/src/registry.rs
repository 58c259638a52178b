use crate::aliases::AliasService;
use crate::events::EventLog;
use crate::settings::SettingsService;
use crate::store::JsonStore;
use crate::utils::timestamp_with_offset;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATUS_CHANGING: &str = "changing";
pub const DEFAULT_STATUS: &str = "online";
pub const DEFAULT_TIER: &str = "UNKNOWN";
pub const UNKNOWN_IP: &str = "unknown";

const ROTATION_NOTE: &str = "IP rotation in progress";

/// Known worker nodes in first-report order, persisted as `proxies.json`.
pub type RegistryDocument = IndexMap<String, ProxyRecord>;

/// Last self-reported state of one worker node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub id: String,
    pub ip: String,
    pub socks_port: Option<u16>,
    pub http_port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub region: Option<String>,
    pub tier: String,
    pub status: String,
    pub last_seen: String,
}

/// A worker self-report as it arrives on the wire. Everything except the id
/// is optional; absent fields fall back to placeholder values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportInput {
    pub id: Option<String>,
    pub ip: Option<String>,
    pub socks_port: Option<u16>,
    pub http_port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub region: Option<String>,
    pub tier: Option<String>,
    pub status: Option<String>,
}

/// A registry entry decorated for display: resolved alias plus a rotation
/// note while the node reports `changing`.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyView {
    pub id: String,
    pub alias: String,
    pub ip: String,
    pub socks_port: Option<u16>,
    pub http_port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub region: Option<String>,
    pub tier: String,
    pub status: String,
    pub last_seen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ProxyView {
    fn from_record(record: ProxyRecord, alias: String) -> Self {
        let note = (record.status == STATUS_CHANGING).then(|| ROTATION_NOTE.to_string());
        Self {
            id: record.id,
            alias,
            ip: record.ip,
            socks_port: record.socks_port,
            http_port: record.http_port,
            user: record.user,
            pass: record.pass,
            region: record.region,
            tier: record.tier,
            status: record.status,
            last_seen: record.last_seen,
            note,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("missing node id")]
    MissingId,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// What a fresh report means for the node's lifecycle, judged against the
/// record it replaces.
enum Transition {
    RotationStarted,
    RotationCompleted { old_ip: String },
    NodeOnline,
    Steady,
}

fn classify_transition(status: &str, previous_ip: Option<&str>, new_ip: &str) -> Transition {
    if status == STATUS_CHANGING {
        return Transition::RotationStarted;
    }
    match previous_ip {
        Some(old_ip) if old_ip != new_ip => Transition::RotationCompleted {
            old_ip: old_ip.to_string(),
        },
        Some(_) => Transition::Steady,
        None => Transition::NodeOnline,
    }
}

#[derive(Clone)]
pub struct RegistryService {
    store: JsonStore<RegistryDocument>,
    aliases: AliasService,
    settings: SettingsService,
    events: EventLog,
}

impl RegistryService {
    pub fn new(
        store: JsonStore<RegistryDocument>,
        aliases: AliasService,
        settings: SettingsService,
        events: EventLog,
    ) -> Self {
        Self {
            store,
            aliases,
            settings,
            events,
        }
    }

    /// Records a worker self-report. The stored record is replaced wholesale,
    /// so fields omitted this time revert to their placeholders. Lifecycle
    /// transitions are written to the event log after the record persists.
    pub fn report(&self, input: ReportInput) -> Result<ProxyRecord, RegistryError> {
        let id = input
            .id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            return Err(RegistryError::MissingId);
        }

        let record = ProxyRecord {
            id: id.clone(),
            ip: input.ip.unwrap_or_else(|| UNKNOWN_IP.to_string()),
            socks_port: input.socks_port,
            http_port: input.http_port,
            user: input.user,
            pass: input.pass,
            region: input.region,
            tier: input.tier.unwrap_or_else(|| DEFAULT_TIER.to_string()),
            status: input.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            last_seen: timestamp_with_offset(self.settings.timezone()),
        };

        let transition = self.store.update(|registry| {
            let previous_ip = registry.get(&id).map(|prior| prior.ip.clone());
            let transition = classify_transition(&record.status, previous_ip.as_deref(), &record.ip);
            registry.insert(id.clone(), record.clone());
            transition
        })?;

        let name = self.aliases.resolve(&id);
        match transition {
            Transition::RotationStarted => {
                self.events.append(&format!("rotation started: {name}"));
            }
            Transition::RotationCompleted { old_ip } => {
                self.events.append(&format!(
                    "rotation completed: {name} | {old_ip} -> {new_ip} ({tier})",
                    new_ip = record.ip,
                    tier = record.tier,
                ));
            }
            Transition::NodeOnline => {
                self.events.append(&format!(
                    "new node online: {name} | {ip} ({tier})",
                    ip = record.ip,
                    tier = record.tier,
                ));
            }
            Transition::Steady => {}
        }

        Ok(record)
    }

    /// Every known node in first-report order, decorated for display.
    pub fn list(&self) -> anyhow::Result<Vec<ProxyView>> {
        let records = self
            .store
            .read(|registry| registry.values().cloned().collect::<Vec<_>>())?;
        Ok(records
            .into_iter()
            .map(|record| {
                let alias = self.aliases.resolve(&record.id);
                ProxyView::from_record(record, alias)
            })
            .collect())
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<ProxyRecord>> {
        self.store.read(|registry| registry.get(id).cloned())
    }

    /// A point-in-time copy of the whole registry, for callers that need a
    /// consistent view across several lookups.
    pub fn document_snapshot(&self) -> anyhow::Result<RegistryDocument> {
        self.store.read(|registry| registry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeckPaths;
    use crate::events::EVENT_TAIL_LIMIT;
    use crate::settings::ConsoleSettings;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        registry: RegistryService,
        aliases: AliasService,
        events: EventLog,
        paths: DeckPaths,
        _dir: TempDir,
    }

    fn setup() -> Harness {
        let dir = tempdir().expect("tempdir");
        let paths = DeckPaths::from_data_dir(dir.path());
        let settings = SettingsService::new(JsonStore::open_with(
            &paths.settings_file,
            ConsoleSettings { timezone: 0 },
        ));
        let aliases = AliasService::new(JsonStore::open(&paths.alias_file));
        let events = EventLog::new(&paths.event_log_file, settings.clone());
        let registry = RegistryService::new(
            JsonStore::open(&paths.registry_file),
            aliases.clone(),
            settings,
            events.clone(),
        );
        Harness {
            registry,
            aliases,
            events,
            paths,
            _dir: dir,
        }
    }

    fn report_of(id: &str, ip: &str) -> ReportInput {
        ReportInput {
            id: Some(id.to_string()),
            ip: Some(ip.to_string()),
            ..ReportInput::default()
        }
    }

    #[test]
    fn report_without_id_is_rejected() {
        let h = setup();
        assert!(matches!(
            h.registry.report(ReportInput::default()),
            Err(RegistryError::MissingId)
        ));
        assert!(matches!(
            h.registry.report(ReportInput {
                id: Some("   ".to_string()),
                ..ReportInput::default()
            }),
            Err(RegistryError::MissingId)
        ));
    }

    #[test]
    fn absent_fields_get_placeholders() {
        let h = setup();
        let record = h
            .registry
            .report(ReportInput {
                id: Some("n1".to_string()),
                ..ReportInput::default()
            })
            .expect("report");
        assert_eq!(record.ip, UNKNOWN_IP);
        assert_eq!(record.status, DEFAULT_STATUS);
        assert_eq!(record.tier, DEFAULT_TIER);
        assert!(record.socks_port.is_none());
    }

    #[test]
    fn first_report_logs_node_online() {
        let h = setup();
        h.registry.report(report_of("n1", "1.1.1.1")).expect("report");

        let lines = h.events.tail(EVENT_TAIL_LIMIT);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("new node online: n1 | 1.1.1.1 (UNKNOWN)"));
    }

    #[test]
    fn ip_change_logs_rotation_completed_once() {
        let h = setup();
        h.registry.report(report_of("n1", "1.1.1.1")).expect("first");
        h.registry.report(report_of("n1", "2.2.2.2")).expect("second");

        let completed: Vec<_> = h
            .events
            .tail(EVENT_TAIL_LIMIT)
            .into_iter()
            .filter(|line| line.contains("rotation completed"))
            .collect();
        assert_eq!(completed.len(), 1);
        assert!(completed[0].contains("1.1.1.1 -> 2.2.2.2"));
    }

    #[test]
    fn changing_status_wins_over_ip_change() {
        let h = setup();
        h.registry.report(report_of("n1", "1.1.1.1")).expect("first");
        h.registry
            .report(ReportInput {
                status: Some(STATUS_CHANGING.to_string()),
                ..report_of("n1", "2.2.2.2")
            })
            .expect("second");

        let lines = h.events.tail(EVENT_TAIL_LIMIT);
        assert!(lines.iter().any(|line| line.ends_with("rotation started: n1")));
        assert!(!lines.iter().any(|line| line.contains("rotation completed")));
    }

    #[test]
    fn steady_report_stays_silent() {
        let h = setup();
        h.registry.report(report_of("n1", "1.1.1.1")).expect("first");
        h.registry.report(report_of("n1", "1.1.1.1")).expect("second");
        assert_eq!(h.events.tail(EVENT_TAIL_LIMIT).len(), 1);
    }

    #[test]
    fn events_use_the_alias_when_present() {
        let h = setup();
        h.aliases.set("n1", "tokyo-1").expect("alias");
        h.registry.report(report_of("n1", "1.1.1.1")).expect("report");

        let lines = h.events.tail(EVENT_TAIL_LIMIT);
        assert!(lines[0].contains("new node online: tokyo-1"));
    }

    #[test]
    fn report_replaces_the_record_wholesale() {
        let h = setup();
        h.registry
            .report(ReportInput {
                user: Some("u".to_string()),
                tier: Some("premium".to_string()),
                ..report_of("n1", "1.1.1.1")
            })
            .expect("first");
        h.registry.report(report_of("n1", "1.1.1.1")).expect("second");

        let record = h.registry.get("n1").expect("get").expect("present");
        assert!(record.user.is_none());
        assert_eq!(record.tier, DEFAULT_TIER);
    }

    #[test]
    fn list_keeps_first_report_order_and_decorates() {
        let h = setup();
        h.registry.report(report_of("n1", "1.1.1.1")).expect("n1");
        h.registry
            .report(ReportInput {
                status: Some(STATUS_CHANGING.to_string()),
                ..report_of("n2", "2.2.2.2")
            })
            .expect("n2");
        h.aliases.set("n2", "osaka-2").expect("alias");
        h.registry.report(report_of("n1", "1.1.1.9")).expect("n1 again");

        let views = h.registry.list().expect("list");
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, "n1");
        assert_eq!(views[0].alias, "n1");
        assert!(views[0].note.is_none());
        assert_eq!(views[1].id, "n2");
        assert_eq!(views[1].alias, "osaka-2");
        assert_eq!(views[1].note.as_deref(), Some(ROTATION_NOTE));
    }

    #[test]
    fn registry_survives_reopen() {
        let h = setup();
        h.registry.report(report_of("n1", "1.1.1.1")).expect("report");

        let reopened: JsonStore<RegistryDocument> = JsonStore::open(&h.paths.registry_file);
        let ip = reopened
            .read(|registry| registry.get("n1").map(|record| record.ip.clone()))
            .expect("read");
        assert_eq!(ip.as_deref(), Some("1.1.1.1"));
    }
}
