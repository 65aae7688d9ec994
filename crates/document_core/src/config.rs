use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SETTINGS_FILE: &str = "documents.toml";

/// Which document becomes active when the active one is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseActivation {
    /// The document that was active most recently before the closed one.
    #[default]
    MostRecent,
    /// The list neighbour that took the closed document's position.
    Adjacent,
}

impl FromStr for CloseActivation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "most_recent" => Ok(CloseActivation::MostRecent),
            "adjacent" => Ok(CloseActivation::Adjacent),
            other => Err(format!("unknown close activation policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub event_capacity: usize,
    pub base_dir: Option<PathBuf>,
    pub close_activation: CloseActivation,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            base_dir: None,
            close_activation: CloseActivation::default(),
        }
    }
}

impl Settings {
    /// Directory relative document paths are resolved against.
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

/// Reads `documents.toml` from the working directory when present, then
/// applies `APP__*` environment overrides.
pub fn load_settings() -> Settings {
    let mut settings = match fs::read_to_string(SETTINGS_FILE) {
        Ok(raw) => parse_settings(&raw).unwrap_or_else(|error| {
            warn!(file = SETTINGS_FILE, %error, "ignoring invalid settings file");
            Settings::default()
        }),
        Err(_) => Settings::default(),
    };
    apply_env_overrides(&mut settings, |key| env::var(key).ok());
    settings
}

pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let mut settings = parse_settings(&raw)
        .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    apply_env_overrides(&mut settings, |key| env::var(key).ok());
    Ok(settings)
}

fn parse_settings(raw: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(raw)
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__EVENT_CAPACITY") {
        match v.trim().parse::<usize>() {
            Ok(capacity) if capacity > 0 => settings.event_capacity = capacity,
            _ => warn!(value = %v, "ignoring invalid APP__EVENT_CAPACITY"),
        }
    }

    if let Some(v) = lookup("APP__BASE_DIR") {
        if !v.trim().is_empty() {
            settings.base_dir = Some(PathBuf::from(v));
        }
    }

    if let Some(v) = lookup("APP__CLOSE_ACTIVATION") {
        match v.parse::<CloseActivation>() {
            Ok(policy) => settings.close_activation = policy,
            Err(error) => warn!(%error, "ignoring APP__CLOSE_ACTIVATION"),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
