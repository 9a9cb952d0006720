use crate::core::error::ToolError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// GraphQL endpoint every request goes to. Fixed at build time; the persisted
/// configuration never carries it.
pub const GRAPHQL_ENDPOINT: &str = match option_env!("ONEAGENT_GRAPHQL_ENDPOINT") {
    Some(endpoint) => endpoint,
    None => "https://api.oneagent.app/graphql",
};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: u32 = 3;
pub const MAX_RETRIES: u32 = 5;

/// Substrings that mark a value as an unfilled template placeholder.
pub const PLACEHOLDER_MARKERS: [&str; 3] = ["your_", "placeholder", "_here"];

pub fn looks_like_placeholder(value: &str) -> bool {
    PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| value.contains(marker))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Identity token sent as `Authorization-API`
    pub api_key: Option<String>,
    pub organization_id: Option<String>,
    pub user_id: Option<String>,
    /// Remote call timeout in milliseconds
    #[serde(rename = "timeout", default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            organization_id: None,
            user_id: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Partial update as accepted by `config_set`. Absent fields are left alone.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigPatch {
    pub api_key: Option<String>,
    pub organization_id: Option<String>,
    pub user_id: Option<String>,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    /// Accepted only so a caller can echo the fixed value back.
    #[serde(alias = "graphqlEndpoint")]
    pub endpoint: Option<String>,
}

impl ConfigPatch {
    pub fn from_json(value: serde_json::Value) -> Result<Self, ToolError> {
        serde_json::from_value(value).map_err(|err| ToolError::InvalidConfiguration(err.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }

    /// Human labels of the fields this patch touches, in a stable order.
    pub fn updated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.api_key.is_some() {
            fields.push("API Key");
        }
        if self.timeout.is_some() {
            fields.push("Timeout");
        }
        if self.retries.is_some() {
            fields.push("Retries");
        }
        if self.organization_id.is_some() {
            fields.push("Organization ID");
        }
        if self.user_id.is_some() {
            fields.push("User ID");
        }
        fields
    }
}

impl Config {
    pub fn merged(&self, patch: &ConfigPatch) -> Result<Config, ToolError> {
        if let Some(endpoint) = patch.endpoint.as_deref() {
            if endpoint != GRAPHQL_ENDPOINT {
                return Err(ToolError::InvalidConfiguration(format!(
                    "the GraphQL endpoint is fixed to {GRAPHQL_ENDPOINT} and cannot be changed"
                )));
            }
        }

        let mut next = self.clone();
        if let Some(api_key) = &patch.api_key {
            next.api_key = non_empty(api_key);
        }
        if let Some(organization_id) = &patch.organization_id {
            next.organization_id = non_empty(organization_id);
        }
        if let Some(user_id) = &patch.user_id {
            next.user_id = non_empty(user_id);
        }
        if let Some(timeout) = patch.timeout {
            next.timeout_ms = timeout;
        }
        if let Some(retries) = patch.retries {
            next.retries = retries;
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ToolError::InvalidConfiguration(format!(
                "timeout must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} milliseconds (got {})",
                self.timeout_ms
            )));
        }
        if self.retries > MAX_RETRIES {
            return Err(ToolError::InvalidConfiguration(format!(
                "retries must be between 0 and {MAX_RETRIES} (got {})",
                self.retries
            )));
        }
        Ok(())
    }

    pub fn is_minimally_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn is_fully_configured(&self) -> bool {
        self.api_key.is_some() && self.organization_id.is_some() && self.user_id.is_some()
    }

    pub fn api_key(&self) -> Result<&str, ToolError> {
        self.api_key
            .as_deref()
            .ok_or(ToolError::MissingField { field: "apiKey" })
    }

    /// Configured default owner. Placeholder values are refused so they never
    /// reach the remote.
    pub fn organization_id(&self) -> Result<&str, ToolError> {
        configured_id("organizationId", self.organization_id.as_deref())
    }

    pub fn user_id(&self) -> Result<&str, ToolError> {
        configured_id("userId", self.user_id.as_deref())
    }
}

fn configured_id<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ToolError> {
    let value = value.ok_or(ToolError::MissingField { field })?;
    if looks_like_placeholder(value) {
        return Err(ToolError::InvalidConfiguration(format!(
            "the configured {field} '{value}' is a template placeholder. Set a real value with config_set, or pass {field} explicitly."
        )));
    }
    Ok(value)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Masks a secret for display, keeping only the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
