// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::Config;

/// Config file names to search for in the workspace root (in order).
pub const CONFIG_FILES: &[&str] = &["coderev.yaml", "coderev.yml", "coderev.json"];

/// Global config directory under the platform config dir.
pub const GLOBAL_CONFIG_DIR: &str = "coderev";

/// Find the first config file for a workspace root, falling back to the
/// global config directory.
pub fn find_config_file(workspace_root: &Path) -> Option<PathBuf> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return Some(path);
        }
    }

    let global = dirs::config_dir()?.join(GLOBAL_CONFIG_DIR);
    for filename in &["config.yaml", "config.yml", "config.json"] {
        let path = global.join(filename);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Load a configuration file (JSON or YAML by extension).
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content).map_err(ConfigError::from),
        _ => serde_yaml::from_str(&content).map_err(ConfigError::from),
    }
}

/// Load configuration for a workspace: file layer (if any) plus environment
/// overrides. Missing files are not an error; defaults apply.
pub fn load_config(workspace_root: &Path) -> Result<Config, ConfigError> {
    let mut config = match find_config_file(workspace_root) {
        Some(path) => load_config_file(&path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply environment variable overrides on top of the file layer.
///
/// API keys in particular should come from the environment rather than be
/// committed to a workspace config file.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.is_empty() {
            config.claude.api_key = Some(key);
        }
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            config.gemini.api_key = Some(key);
        }
    }
    if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
        if !url.is_empty() {
            config.ollama.base_url = Some(url);
        }
    }
    if let Ok(provider) = std::env::var("CODEREV_PROVIDER") {
        if !provider.is_empty() {
            config.default_provider = provider;
        }
    }
}
