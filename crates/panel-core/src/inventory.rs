//! Ansible INI inventory: the list of runner hosts the panel manages.
//!
//! Only the lines that name a host are interpreted:
//!
//! ```text
//! [runner-hosts]
//! # build boxes
//! builder-1 ansible_host=10.0.0.11 ansible_user=root
//! ```
//!
//! Everything else (section headers, group vars, comments, malformed lines)
//! is skipped without error.

use crate::error::{PanelError, Result};
use crate::io;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The section new hosts are inserted under.
pub const RUNNER_HOSTS_SECTION: &str = "[runner-hosts]";

const HOST_KEY: &str = "ansible_host";
const USER_KEY: &str = "ansible_user";

/// `ansible_user` written for new entries when none is given.
pub const DEFAULT_USER: &str = "root";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Unknown => write!(f, "unknown"),
            ServerStatus::Online => write!(f, "online"),
            ServerStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub status: ServerStatus,
}

impl ServerRecord {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            user: None,
            status: ServerStatus::Unknown,
        }
    }

    /// Fold a fresh status into this record.
    pub fn merge(&mut self, status: ServerStatus) {
        self.status = status;
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse inventory text into server records, in file order.
pub fn parse_servers(text: &str) -> Vec<ServerRecord> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ServerRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let mut tokens = trimmed.split_whitespace();
    let name = tokens.next()?;
    if name.contains('=') || name.starts_with('[') {
        return None;
    }

    let mut host = None;
    let mut user = None;
    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            HOST_KEY if !value.is_empty() => host = Some(value.to_string()),
            USER_KEY if !value.is_empty() => user = Some(value.to_string()),
            _ => {}
        }
    }

    let mut record = ServerRecord::new(name, host?);
    record.user = user;
    Some(record)
}

/// Load servers from the inventory at `path`.
///
/// A missing or unreadable file yields an empty list; the failure is logged
/// so the panel can still render with what it has.
pub fn load_servers(path: &Path) -> Vec<ServerRecord> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_servers(&text),
        Err(e) => {
            tracing::error!(path = %path.display(), "error loading servers: {e}");
            Vec::new()
        }
    }
}

pub fn find_by_host<'a>(servers: &'a [ServerRecord], host: &str) -> Option<&'a ServerRecord> {
    servers.iter().find(|s| s.host == host)
}

pub fn find_by_name<'a>(servers: &'a [ServerRecord], name: &str) -> Option<&'a ServerRecord> {
    servers.iter().find(|s| s.name == name)
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

fn validate_field(field: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value.contains(char::is_whitespace)
        || value.contains('=')
        || value.starts_with('#')
        || value.starts_with('[')
    {
        return Err(PanelError::InvalidInput(format!(
            "{field} '{value}' must be a single token without '='"
        )));
    }
    Ok(())
}

/// Insert a host entry under `[runner-hosts]`, after any comment or blank
/// lines that directly follow the section header.
pub fn add_server(path: &Path, name: &str, host: &str, user: &str) -> Result<()> {
    validate_field("name", name)?;
    validate_field("host", host)?;
    validate_field("user", user)?;

    let content = std::fs::read_to_string(path)?;
    if find_by_name(&parse_servers(&content), name).is_some() {
        return Err(PanelError::InvalidInput(format!("server '{name}' already exists")));
    }
    let mut lines: Vec<&str> = content.lines().collect();

    let Some(idx) = lines.iter().position(|l| l.trim() == RUNNER_HOSTS_SECTION) else {
        return Err(PanelError::SectionNotFound(RUNNER_HOSTS_SECTION.to_string()));
    };

    let mut insert_at = idx + 1;
    while insert_at < lines.len() {
        let l = lines[insert_at].trim();
        if l.is_empty() || l.starts_with('#') {
            insert_at += 1;
        } else {
            break;
        }
    }

    let entry = format!("{name} {HOST_KEY}={host} {USER_KEY}={user}");
    lines.insert(insert_at, &entry);

    let mut updated = lines.join("\n");
    updated.push('\n');
    io::atomic_write(path, updated.as_bytes())?;
    tracing::info!(name, host, "added server to inventory");
    Ok(())
}

/// Remove every entry for `name`. Returns `true` if a line was dropped.
pub fn remove_server(path: &Path, name: &str) -> Result<bool> {
    validate_field("name", name)?;

    let content = std::fs::read_to_string(path)?;
    let prefix = format!("{name} ");
    let before = content.lines().count();
    let kept: Vec<&str> = content
        .lines()
        .filter(|l| {
            let t = l.trim();
            !(t == name || t.starts_with(&prefix))
        })
        .collect();

    if kept.len() == before {
        return Ok(false);
    }

    let mut updated = kept.join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    io::atomic_write(path, updated.as_bytes())?;
    tracing::info!(name, "removed server from inventory");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
