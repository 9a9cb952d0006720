use crate::core::config::data::{Config, ConfigPatch};
use crate::core::config::io::ConfigError;
use crate::core::error::ToolError;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Settings supplied through the process environment. They are folded into
/// the configuration on first load only and are never written back on their
/// own.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    api_key: Option<String>,
    organization_id: Option<String>,
    user_id: Option<String>,
    timeout: Option<String>,
    retries: Option<String>,
}

impl EnvOverrides {
    pub fn from_process_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            api_key: read("API_KEY"),
            organization_id: read("ORGANIZATION_ID"),
            user_id: read("USER_ID"),
            timeout: read("TIMEOUT"),
            retries: read("RETRIES"),
        }
    }

    fn apply(&self, config: &mut Config) {
        if let Some(api_key) = &self.api_key {
            config.api_key = Some(api_key.clone());
        }
        if let Some(organization_id) = &self.organization_id {
            config.organization_id = Some(organization_id.clone());
        }
        if let Some(user_id) = &self.user_id {
            config.user_id = Some(user_id.clone());
        }
        if let Some(raw) = &self.timeout {
            match raw.trim().parse::<u64>() {
                Ok(timeout) => config.timeout_ms = timeout,
                Err(_) => warn!(value = %raw, "Ignoring non-numeric TIMEOUT override"),
            }
        }
        if let Some(raw) = &self.retries {
            match raw.trim().parse::<u32>() {
                Ok(retries) => config.retries = retries,
                Err(_) => warn!(value = %raw, "Ignoring non-numeric RETRIES override"),
            }
        }
    }
}

/// Owns the in-memory configuration and keeps it consistent with the file.
///
/// The cache is filled on first access. Every mutation writes the file first
/// and swaps the cached value while still holding the lock, so no caller sees
/// a half-applied update.
pub struct ConfigStore {
    path: PathBuf,
    overrides: EnvOverrides,
    state: Mutex<Option<Config>>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, overrides: EnvOverrides) -> Self {
        Self {
            path,
            overrides,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Result<Config, ToolError> {
        let mut state = self.state.lock().await;
        Ok(self.ensure_loaded(&mut state).await?.clone())
    }

    pub async fn update(&self, patch: &ConfigPatch) -> Result<Config, ToolError> {
        let mut state = self.state.lock().await;
        let current = self.ensure_loaded(&mut state).await?;
        let merged = current.merged(patch)?;
        self.persist(merged.clone()).await?;
        *state = Some(merged.clone());
        debug!(fields = ?patch.updated_fields(), "Configuration updated");
        Ok(merged)
    }

    pub async fn reset(&self) -> Result<Config, ToolError> {
        let mut state = self.state.lock().await;
        let defaults = Config::default();
        self.persist(defaults.clone()).await?;
        *state = Some(defaults.clone());
        debug!(path = %self.path.display(), "Configuration reset to defaults");
        Ok(defaults)
    }

    pub async fn is_minimally_configured(&self) -> Result<bool, ToolError> {
        Ok(self.get().await?.is_minimally_configured())
    }

    pub async fn is_fully_configured(&self) -> Result<bool, ToolError> {
        Ok(self.get().await?.is_fully_configured())
    }

    async fn ensure_loaded<'a>(
        &self,
        state: &'a mut Option<Config>,
    ) -> Result<&'a Config, ToolError> {
        if state.is_none() {
            let path = self.path.clone();
            let mut config = run_blocking(move || Config::load_from_path(&path)).await?;
            self.overrides.apply(&mut config);
            debug!(path = %self.path.display(), "Configuration loaded");
            *state = Some(config);
        }
        state
            .as_ref()
            .ok_or_else(|| ToolError::handler("Configuration cache is empty after load"))
    }

    async fn persist(&self, config: Config) -> Result<(), ToolError> {
        let path = self.path.clone();
        run_blocking(move || config.save_to_path(&path)).await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, ToolError>
where
    F: FnOnce() -> Result<T, ConfigError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ToolError::handler(format!("Configuration task failed: {err}")))?
        .map_err(|err| ToolError::handler(err.to_string()))
}
