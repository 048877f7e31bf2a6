use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use shared::config::KilnConfig;

const DEFAULT_CONFIG_FILE: &str = "kiln.toml";
/// Variables honoured from before the `APP__` scheme existed.
const LEGACY_VARS: [&str; 2] = ["SERVER_BIND", "DATABASE_URL"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub log_filter: String,
    pub kiln: KilnConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:8081".into(),
            database_url: "sqlite://./data/kiln.db".into(),
            log_filter: "info".into(),
            kiln: KilnConfig::default(),
        }
    }
}

/// Defaults, then `kiln.toml` (or `$KILN_CONFIG`), then legacy variables,
/// then `APP__*` variables, later layers winning.
pub fn load_settings() -> anyhow::Result<Settings> {
    let file = env::var_os("KILN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    load_settings_from(Some(&file), env::vars().collect())
}

pub(crate) fn load_settings_from(
    file: Option<&Path>,
    vars: HashMap<String, String>,
) -> anyhow::Result<Settings> {
    let legacy: HashMap<String, String> = vars
        .iter()
        .filter(|(key, _)| LEGACY_VARS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut builder =
        Config::builder().add_source(Config::try_from(&Settings::default()).context("defaults")?);
    if let Some(file) = file {
        builder = builder.add_source(
            File::new(&file.to_string_lossy(), FileFormat::Toml).required(false),
        );
    }
    let settings = builder
        .add_source(Environment::default().source(Some(legacy)))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars)),
        )
        .build()
        .context("failed to assemble settings")?
        .try_deserialize::<Settings>()
        .context("invalid settings")?;
    settings
        .kiln
        .validate()
        .context("invalid kiln settings")?;
    Ok(settings)
}

/// Accepts either a sqlx URL or a bare file path.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
