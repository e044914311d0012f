// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{AccuPathConfig, ResolvedConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Explicit config file, replacing the workspace search
    pub config_file: Option<PathBuf>,
    pub service: Option<String>,
    pub env: Option<String>,
    pub hostname: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub tag: Option<String>,
    pub flush_interval_secs: Option<u64>,
    pub bucket_size_secs: Option<u64>,
    pub verify_chain: Option<bool>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Environment (`DD_*`)
/// 3. Workspace config (.accupath.json)
/// 4. Global config (~/.accupath/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<AccuPathConfig>,
    workspace: Option<AccuPathConfig>,
    env: AccuPathConfig,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    if let Some(config) = global {
        apply_config(&mut result, &config);
    }

    if let Some(config) = workspace {
        apply_config(&mut result, &config);
    }

    apply_config(&mut result, &env);

    // Apply CLI options (highest precedence)
    apply_cli_options(&mut result, &cli);

    result
}

fn apply_config(result: &mut ResolvedConfig, config: &AccuPathConfig) {
    if let Some(ref service) = config.service {
        result.service = service.clone();
    }

    if let Some(ref env) = config.env {
        result.env = env.clone();
    }

    if let Some(ref hostname) = config.hostname {
        result.hostname = hostname.clone();
    }

    if config.api_key.is_some() {
        result.api_key = config.api_key.clone();
    }

    if let Some(ref base_url) = config.base_url {
        result.base_url = base_url.clone();
    }

    if let Some(ref endpoint) = config.endpoint {
        result.endpoint = endpoint.clone();
    }

    if let Some(secs) = config.flush_interval_secs {
        result.flush_interval_secs = secs;
    }

    if let Some(secs) = config.bucket_size_secs {
        result.bucket_size_secs = secs;
    }

    if let Some(secs) = config.timeout_secs {
        result.timeout_secs = secs;
    }

    if let Some(ref tag) = config.tag {
        result.tag = tag.clone();
    }

    if let Some(enabled) = config.enabled {
        result.enabled = enabled;
    }

    if let Some(verify) = config.verify_chain {
        result.verify_chain = verify;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref service) = cli.service {
        result.service = service.clone();
    }

    if let Some(ref env) = cli.env {
        result.env = env.clone();
    }

    if let Some(ref hostname) = cli.hostname {
        result.hostname = hostname.clone();
    }

    if cli.api_key.is_some() {
        result.api_key = cli.api_key.clone();
    }

    if let Some(ref base_url) = cli.base_url {
        result.base_url = base_url.clone();
    }

    if let Some(ref tag) = cli.tag {
        result.tag = tag.clone();
    }

    if let Some(secs) = cli.flush_interval_secs {
        result.flush_interval_secs = secs;
    }

    if let Some(secs) = cli.bucket_size_secs {
        result.bucket_size_secs = secs;
    }

    if let Some(verify) = cli.verify_chain {
        result.verify_chain = verify;
    }
}
