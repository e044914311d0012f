// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for AccuPath.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.accupath/config.json
//! - Workspace config: .accupath.json, .accupath.yaml, or accupath.config.json
//! - Environment: DD_SERVICE, DD_ENV, DD_HOSTNAME, DD_API_KEY, DD_ACCUPATH_*
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > env > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    env_config_from, get_global_config_path, load_config_file, load_env_config,
    load_global_config, load_workspace_config, CONFIG_FILES, ENV_API_KEY, ENV_ENABLED, ENV_ENV,
    ENV_HOSTNAME, ENV_SERVICE, ENV_TAG, ENV_URL, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{AccuPathConfig, ResolvedConfig, DEFAULT_INTERVAL_SECS};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading.
pub fn load_config(workspace_root: &Path, cli_options: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    load_config_with_env(workspace_root, cli_options, load_env_config()?)
}

/// Like [`load_config`], with the environment layer supplied by the caller.
pub fn load_config_with_env(
    workspace_root: &Path,
    cli_options: CliOptions,
    env: AccuPathConfig,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = match cli_options.config_file.as_deref() {
        Some(path) => Some(load_config_file(path)?),
        None => load_workspace_config(workspace_root)?,
    };

    let config = merge_config(global, workspace, env, cli_options);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config =
            load_config_with_env(temp.path(), CliOptions::default(), AccuPathConfig::default())
                .unwrap();
        // Service could come from a global config; just check it resolved
        assert!(!config.service.is_empty());
    }

    #[test]
    fn test_load_config_with_workspace_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".accupath.json"),
            r#"{"service": "orders", "bucketSizeSecs": 30}"#,
        )
        .unwrap();

        let config =
            load_config_with_env(temp.path(), CliOptions::default(), AccuPathConfig::default())
                .unwrap();
        assert_eq!(config.service, "orders");
        assert_eq!(config.bucket_size_secs, 30);
    }

    #[test]
    fn test_explicit_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        std::fs::write(&path, "service: custom\ntag: nightly\n").unwrap();
        std::fs::write(temp.path().join(".accupath.json"), r#"{"service": "ignored"}"#).unwrap();

        let cli = CliOptions {
            config_file: Some(path),
            ..Default::default()
        };
        let config = load_config_with_env(temp.path(), cli, AccuPathConfig::default()).unwrap();
        assert_eq!(config.service, "custom");
        assert_eq!(config.tag, "nightly");
    }

    #[test]
    fn test_env_overrides_file_and_cli_overrides_env() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".accupath.json"),
            r#"{"service": "file", "env": "file-env"}"#,
        )
        .unwrap();

        let env = AccuPathConfig {
            service: Some("from-env".to_string()),
            env: Some("env-env".to_string()),
            ..Default::default()
        };
        let cli = CliOptions {
            env: Some("cli-env".to_string()),
            ..Default::default()
        };

        let config = load_config_with_env(temp.path(), cli, env).unwrap();
        assert_eq!(config.service, "from-env");
        assert_eq!(config.env, "cli-env");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".accupath.json"), r#"{"timeoutSecs": 0}"#).unwrap();

        let result =
            load_config_with_env(temp.path(), CliOptions::default(), AccuPathConfig::default());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
