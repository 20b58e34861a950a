//! The vault: a YAML mapping of credentials and automation settings shared
//! with the Ansible playbooks (`group_vars/runner-hosts/vault.yml`).
//!
//! Recognized keys:
//!   github_token           personal access token used to register runners
//!   github_username        account the runners are registered under
//!   scan_interval_minutes  how often the automation timer rescans repos

use crate::error::Result;
use crate::io;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const TOKEN_KEY: &str = "github_token";
pub const USERNAME_KEY: &str = "github_username";
pub const SCAN_INTERVAL_KEY: &str = "scan_interval_minutes";

/// Prefixes of GitHub-issued tokens. Anything else is treated as a
/// placeholder left in the vault template.
const TOKEN_PREFIXES: &[&str] = &["ghp_", "github_pat_", "gho_"];

pub type VaultVars = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Secrets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_interval_minutes: Option<u32>,
}

impl Secrets {
    /// Extract the recognized keys from a parsed vault document.
    pub fn from_value(doc: &Value) -> Self {
        let Some(map) = doc.as_mapping() else {
            return Self::default();
        };
        let get = |key: &str| map.get(key);

        let github_token = get(TOKEN_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| looks_like_token(t))
            .map(str::to_string);
        let github_username = get(USERNAME_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let scan_interval_minutes = get(SCAN_INTERVAL_KEY).and_then(|v| match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Self {
            github_token,
            github_username,
            scan_interval_minutes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Flat string view: `github_token`, `github_username`, `scan_interval`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(t) = &self.github_token {
            map.insert(TOKEN_KEY.to_string(), t.clone());
        }
        if let Some(u) = &self.github_username {
            map.insert(USERNAME_KEY.to_string(), u.clone());
        }
        if let Some(i) = self.scan_interval_minutes {
            map.insert("scan_interval".to_string(), i.to_string());
        }
        map
    }

    /// Copy with the token reduced to a display hint.
    pub fn masked(&self) -> Self {
        Self {
            github_token: self.github_token.as_deref().map(mask_token),
            ..self.clone()
        }
    }
}

fn looks_like_token(token: &str) -> bool {
    TOKEN_PREFIXES.iter().any(|p| token.starts_with(p) && token.len() > p.len())
}

/// `ghp_abcdef123456` → `ghp_…3456`. Short values are hidden entirely.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "\u{2026}".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}\u{2026}{tail}")
}

/// Load the recognized settings from the vault at `path`.
///
/// Missing, unreadable, or malformed files (an encrypted vault parses as a
/// plain string) yield empty secrets; the failure is logged.
pub fn load_secrets(path: &Path) -> Secrets {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(path = %path.display(), "error loading config: {e}");
            return Secrets::default();
        }
    };
    match serde_yaml::from_str::<Value>(&text) {
        Ok(doc) => {
            if !doc.is_mapping() && !doc.is_null() {
                tracing::error!(path = %path.display(), "vault is not a key/value mapping");
            }
            Secrets::from_value(&doc)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), "error parsing vault: {e}");
            Secrets::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Raw vault variables
// ---------------------------------------------------------------------------

/// Read every top-level key of the vault. A missing file is an empty vault.
pub fn load_vault_vars(path: &Path) -> Result<VaultVars> {
    if !path.exists() {
        return Ok(VaultVars::new());
    }
    let text = std::fs::read_to_string(path)?;
    let doc: Value = serde_yaml::from_str(&text)?;
    if doc.is_null() {
        return Ok(VaultVars::new());
    }
    Ok(serde_yaml::from_value(doc)?)
}

/// Apply `updates` to the vault and write it back.
///
/// Empty values, and a token equal to the masked form of the stored one, are
/// skipped so a form echoing masked values leaves the credential untouched.
pub fn update_vault_vars(path: &Path, updates: &BTreeMap<String, String>) -> Result<VaultVars> {
    let mut vars = load_vault_vars(path)?;

    for (key, value) in updates {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if key == TOKEN_KEY {
            let current_mask = vars.get(TOKEN_KEY).and_then(Value::as_str).map(mask_token);
            if current_mask.as_deref() == Some(value) {
                continue;
            }
        }
        let yaml = match (key.as_str(), value.parse::<u64>()) {
            (SCAN_INTERVAL_KEY, Ok(n)) => Value::Number(n.into()),
            _ => Value::String(value.to_string()),
        };
        vars.insert(key.clone(), yaml);
    }

    let data = serde_yaml::to_string(&vars)?;
    io::atomic_write(path, data.as_bytes())?;
    tracing::info!(path = %path.display(), keys = updates.len(), "vault updated");
    Ok(vars)
}

/// Copy of `vars` safe to show: the token is masked.
pub fn masked_vars(vars: &VaultVars) -> VaultVars {
    let mut out = vars.clone();
    if let Some(Value::String(token)) = out.get_mut(TOKEN_KEY) {
        *token = mask_token(token);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
