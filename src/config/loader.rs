// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AccuPathConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[".accupath.json", ".accupath.yaml", "accupath.config.json"];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".accupath";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Environment variables read by [`load_env_config`].
pub const ENV_SERVICE: &str = "DD_SERVICE";
pub const ENV_ENV: &str = "DD_ENV";
pub const ENV_HOSTNAME: &str = "DD_HOSTNAME";
pub const ENV_API_KEY: &str = "DD_API_KEY";
pub const ENV_URL: &str = "DD_ACCUPATH_URL";
pub const ENV_ENABLED: &str = "DD_ACCUPATH_ENABLED";
pub const ENV_TAG: &str = "DD_ACCUPATH_TAG";

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.accupath/config.json.
pub fn load_global_config() -> Result<Option<AccuPathConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the first of [`CONFIG_FILES`] present.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<AccuPathConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<AccuPathConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Read overrides from the process environment.
pub fn load_env_config() -> Result<AccuPathConfig, ConfigError> {
    env_config_from(|name| std::env::var(name).ok())
}

/// Read overrides through `lookup`; empty values count as unset.
pub fn env_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AccuPathConfig, ConfigError> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let enabled = match get(ENV_ENABLED) {
        Some(raw) => Some(parse_bool(ENV_ENABLED, &raw)?),
        None => None,
    };

    Ok(AccuPathConfig {
        service: get(ENV_SERVICE),
        env: get(ENV_ENV),
        hostname: get(ENV_HOSTNAME),
        api_key: get(ENV_API_KEY),
        base_url: get(ENV_URL),
        tag: get(ENV_TAG),
        enabled,
        ..Default::default()
    })
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}
