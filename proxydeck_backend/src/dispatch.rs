use crate::aliases::AliasService;
use crate::events::EventLog;
use crate::registry::{ProxyRecord, RegistryService};
use crate::utils::APP_NAME;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How long one worker callback may take before the dispatcher moves on.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Rotation mode requested from workers. Matching ignores case but is
/// otherwise exact; anything else coerces to `standard` rather than
/// failing the broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Premium,
    Toggle,
}

impl Tier {
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("premium") => Tier::Premium,
            Some("toggle") => Tier::Toggle,
            _ => Tier::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Premium => "premium",
            Tier::Toggle => "toggle",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target selection for one refresh broadcast. A true `all` beats `ids`,
/// which beats `id`; a selector that is present but matches nothing still
/// decides, it does not fall through.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    pub id: Option<String>,
    pub ids: Option<Vec<String>>,
    pub all: Option<bool>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    SentTimeout,
}

/// Per-target result of a broadcast. `sent` means the worker answered with
/// something; `sent_timeout` means it could not be reached in time.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub id: String,
    pub alias: String,
    pub status: DispatchStatus,
    pub tier: Tier,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no targets found")]
    NoTargets,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct DispatchService {
    registry: RegistryService,
    aliases: AliasService,
    events: EventLog,
    http_client: reqwest::Client,
    api_token: String,
    worker_port: u16,
}

impl DispatchService {
    pub fn new(
        registry: RegistryService,
        aliases: AliasService,
        events: EventLog,
        api_token: String,
        worker_port: u16,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .context("failed to build dispatch HTTP client")?;

        Ok(Self {
            registry,
            aliases,
            events,
            http_client,
            api_token,
            worker_port,
        })
    }

    /// Broadcasts a refresh command to the selected workers, one at a time.
    /// Each target is attempted independently; an unreachable worker
    /// downgrades its own outcome instead of failing the call.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let tier = Tier::parse_lenient(request.tier.as_deref());
        let targets = self.resolve_targets(&request)?;
        if targets.is_empty() {
            return Err(DispatchError::NoTargets);
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            outcomes.push(self.dispatch_one(&target, tier).await);
        }
        Ok(outcomes)
    }

    /// Selector precedence mirrors the request shape: `all`, then `ids`
    /// (request order, unknown ids dropped), then `id`.
    fn resolve_targets(&self, request: &RefreshRequest) -> anyhow::Result<Vec<ProxyRecord>> {
        let registry = self.registry.document_snapshot()?;

        if request.all.unwrap_or(false) {
            return Ok(registry.into_values().collect());
        }
        if let Some(ids) = &request.ids {
            return Ok(ids
                .iter()
                .filter_map(|id| registry.get(id).cloned())
                .collect());
        }
        if let Some(id) = &request.id {
            return Ok(registry.get(id).cloned().into_iter().collect());
        }
        Ok(Vec::new())
    }

    async fn dispatch_one(&self, target: &ProxyRecord, tier: Tier) -> DispatchOutcome {
        let alias = self.aliases.resolve(&target.id);
        let url = format!("http://{}:{}/refresh", target.ip, self.worker_port);
        let attempt = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_token.as_str()), ("tier", tier.as_str())])
            .send()
            .await;

        let status = match attempt {
            Ok(_) => {
                self.events.append(&format!(
                    "refresh command sent: {alias} ({ip}) [{tier}]",
                    ip = target.ip,
                ));
                DispatchStatus::Sent
            }
            Err(err) => {
                tracing::debug!(id = %target.id, url = %url, error = %err, "worker unreachable");
                self.events.append(&format!(
                    "refresh command sent (timeout): {alias} ({ip}) [{tier}]",
                    ip = target.ip,
                ));
                DispatchStatus::SentTimeout
            }
        };

        DispatchOutcome {
            id: target.id.clone(),
            alias,
            status,
            tier,
        }
    }
}
