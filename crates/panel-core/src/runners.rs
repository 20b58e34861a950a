//! Runner units on a host: `github-runner@<name>.service`, one per
//! registered repository.

use crate::error::{PanelError, Result};
use crate::output;
use crate::remote::{RemoteCommand, RemoteExecutor};
use crate::settings::Settings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const RUNNER_UNIT_PREFIX: &str = "github-runner@";

/// Marker in a unit description that precedes the repository name, as in
/// `GitHub Actions Runner for octo/app`.
const REPO_MARKER: &str = "for ";

// ---------------------------------------------------------------------------
// ActiveState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveState {
    Active,
    Inactive,
    Activating,
    Deactivating,
    Failed,
    Reloading,
    Maintenance,
    Unknown,
}

impl ActiveState {
    pub const ALL: [ActiveState; 8] = [
        ActiveState::Active,
        ActiveState::Inactive,
        ActiveState::Activating,
        ActiveState::Deactivating,
        ActiveState::Failed,
        ActiveState::Reloading,
        ActiveState::Maintenance,
        ActiveState::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveState::Active => "active",
            ActiveState::Inactive => "inactive",
            ActiveState::Activating => "activating",
            ActiveState::Deactivating => "deactivating",
            ActiveState::Failed => "failed",
            ActiveState::Reloading => "reloading",
            ActiveState::Maintenance => "maintenance",
            ActiveState::Unknown => "unknown",
        }
    }

    /// Parse an `ActiveState` value as reported by systemd. Anything other
    /// than exactly one known value (after trimming) is `Unknown`; remote
    /// output sometimes arrives concatenated with unrelated text.
    pub fn from_remote(text: &str) -> Self {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .filter(|s| *s != ActiveState::Unknown)
            .find(|s| s.as_str() == text)
            .unwrap_or(ActiveState::Unknown)
    }
}

impl std::fmt::Display for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunnerUnit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerUnit {
    pub service: String,
    /// Repository the runner serves, or empty when the description names none.
    pub repo: String,
    /// `repo` with `/` replaced by `-`, as used in runner directory names.
    pub escaped_repo: String,
    pub status: ActiveState,
    pub description: String,
}

impl RunnerUnit {
    fn new(service: String, description: String, status: ActiveState) -> Self {
        let repo = repo_from_description(&description);
        Self {
            service,
            escaped_repo: repo.replace('/', "-"),
            repo,
            status,
            description,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

static SERVICE_RE: OnceLock<Regex> = OnceLock::new();

fn service_re() -> &'static Regex {
    SERVICE_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9@._:\-]+$").unwrap())
}

/// Reject anything that is not a plain unit name before it is spliced into a
/// remote shell command.
pub fn validate_service(service: &str) -> Result<()> {
    if service.is_empty() || service.len() > 256 || !service_re().is_match(service) {
        return Err(PanelError::InvalidService(service.to_string()));
    }
    Ok(())
}

/// Unit names in `systemctl list-units` output, in order, without duplicates.
/// Names that fail [`validate_service`] are dropped so they never reach a
/// follow-up shell command.
pub fn parse_unit_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in output::payload_lines(raw) {
        let Some(unit) = line
            .split_whitespace()
            .find(|t| t.starts_with(RUNNER_UNIT_PREFIX))
        else {
            continue;
        };
        if let Err(e) = validate_service(unit) {
            tracing::warn!("ignoring listed unit: {e}");
            continue;
        }
        if !names.iter().any(|n| n == unit) {
            names.push(unit.to_string());
        }
    }
    names
}

/// `(Description, ActiveState)` from `systemctl show --property=...` output.
/// Only the first occurrence of each property is used.
pub fn parse_unit_properties(raw: &str) -> (String, ActiveState) {
    let mut description = None;
    let mut state = None;
    for line in output::payload_lines(raw) {
        if let Some(value) = line.strip_prefix("Description=") {
            description.get_or_insert_with(|| value.to_string());
        } else if let Some(value) = line.strip_prefix("ActiveState=") {
            state.get_or_insert_with(|| ActiveState::from_remote(value));
        }
    }
    (
        description.unwrap_or_default(),
        state.unwrap_or(ActiveState::Unknown),
    )
}

/// The text after the first `for ` in a unit description.
pub fn repo_from_description(description: &str) -> String {
    description
        .split_once(REPO_MARKER)
        .map(|(_, repo)| repo.trim().to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// List every runner unit on `host` with its description and state.
///
/// A failure listing units is returned; a failure describing a single unit
/// reports that unit as `unknown` and moves on.
pub fn list_runners(
    executor: &dyn RemoteExecutor,
    settings: &Settings,
    host: &str,
) -> Result<Vec<RunnerUnit>> {
    let timeout = settings.status.probe_timeout();
    let runner_user = &settings.remote.runner_user;

    let list = RemoteCommand::new(
        format!("systemctl list-units --type=service | grep {RUNNER_UNIT_PREFIX}"),
        timeout,
    )
    .become_user(runner_user);
    let listed = executor.execute(host, &list)?;
    let services = parse_unit_names(&listed.stdout);
    tracing::debug!(host, count = services.len(), "listed runner units");

    let mut runners = Vec::with_capacity(services.len());
    for service in services {
        let show = RemoteCommand::new(
            format!("systemctl show {service} --property=Description,ActiveState"),
            timeout,
        )
        .become_user(runner_user);
        let (description, state) = match executor.execute(host, &show) {
            Ok(out) => parse_unit_properties(&out.stdout),
            Err(e) => {
                tracing::warn!(host, service = %service, "error describing runner: {e}");
                (String::new(), ActiveState::Unknown)
            }
        };
        runners.push(RunnerUnit::new(service, description, state));
    }
    Ok(runners)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
