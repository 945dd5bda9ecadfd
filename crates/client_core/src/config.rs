use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use shared::BACKEND_EVENT_CHANNEL;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "runtime.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub backend_url: String,
    pub event_channel: String,
    pub watch_enable_op: String,
    pub watch_disable_op: String,
    /// `None` leaves in-flight invokes unbounded.
    pub invoke_timeout: Option<Duration>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:1420".into(),
            event_channel: BACKEND_EVENT_CHANNEL.into(),
            watch_enable_op: "watch_enable".into(),
            watch_disable_op: "watch_disable".into(),
            invoke_timeout: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend_url '{url}' is not a valid url: {source}")]
    InvalidBackendUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("backend_url '{0}' must use http or https")]
    UnsupportedScheme(String),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl RuntimeSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.backend_url).map_err(|source| {
            ConfigError::InvalidBackendUrl {
                url: self.backend_url.clone(),
                source,
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(self.backend_url.clone()));
        }
        if self.event_channel.trim().is_empty() {
            return Err(ConfigError::Empty("event_channel"));
        }
        if self.watch_enable_op.trim().is_empty() {
            return Err(ConfigError::Empty("watch_enable_op"));
        }
        if self.watch_disable_op.trim().is_empty() {
            return Err(ConfigError::Empty("watch_disable_op"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    event_channel: Option<String>,
    watch_enable_op: Option<String>,
    watch_disable_op: Option<String>,
    invoke_timeout_ms: Option<u64>,
}

/// Defaults, then `runtime.toml` in the working directory, then `APP__*` env vars.
pub fn load_settings() -> RuntimeSettings {
    let mut settings = RuntimeSettings::default();
    if let Ok(raw) = fs::read_to_string(DEFAULT_SETTINGS_FILE) {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            apply_file_settings(&mut settings, file_cfg);
        }
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

/// Strict variant for an explicitly named file: unreadable or malformed files
/// are errors instead of being skipped.
pub fn load_settings_from(path: &Path) -> anyhow::Result<RuntimeSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let file_cfg = toml::from_str::<FileSettings>(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;

    let mut settings = RuntimeSettings::default();
    apply_file_settings(&mut settings, file_cfg);
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

pub fn settings_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
        default.exists().then_some(default)
    })
}

fn apply_file_settings(settings: &mut RuntimeSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.event_channel {
        settings.event_channel = v;
    }
    if let Some(v) = file_cfg.watch_enable_op {
        settings.watch_enable_op = v;
    }
    if let Some(v) = file_cfg.watch_disable_op {
        settings.watch_disable_op = v;
    }
    if let Some(ms) = file_cfg.invoke_timeout_ms {
        settings.invoke_timeout = timeout_from_millis(ms);
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut RuntimeSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("APP__BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = lookup("APP__EVENT_CHANNEL") {
        settings.event_channel = v;
    }
    if let Some(v) = lookup("APP__WATCH_ENABLE_OP") {
        settings.watch_enable_op = v;
    }
    if let Some(v) = lookup("APP__WATCH_DISABLE_OP") {
        settings.watch_disable_op = v;
    }
    if let Some(v) = lookup("APP__INVOKE_TIMEOUT_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            settings.invoke_timeout = timeout_from_millis(ms);
        }
    }
}

/// Zero disables the timeout.
fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
