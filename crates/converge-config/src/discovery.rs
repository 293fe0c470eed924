//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/converge/config.toml` (user config)
//! 2. `./converge.toml` (project-local)
//! 3. An explicit `--config` file (handled by the caller via [`load_config_file`])

use std::path::{Path, PathBuf};

use crate::{ConfigError, ConvergeConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "converge.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "converge";

/// Environment variable to override the user config directory.
const CONFIG_DIR_ENV: &str = "CONVERGE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: ConvergeConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext tokens).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    /// Merge an explicitly requested file on top of the discovered layers.
    ///
    /// Unlike discovered layers, a missing or broken explicit file is an error.
    pub fn overlay_file(&mut self, path: &Path) -> Result<()> {
        let layer = load_config_file(path)?;
        self.config.merge(layer);
        self.sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
        check_plaintext_token(&self.config, &mut self.warnings);
        Ok(())
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `CONVERGE_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = ConvergeConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    check_plaintext_token(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
///
/// `.yaml`/`.yml` files are parsed as YAML, everything else as TOML.
pub fn load_config_file(path: &Path) -> Result<ConvergeConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ConvergeConfig::from_yaml(&contents),
        _ => ConvergeConfig::from_toml(&contents),
    }
}

/// Get the user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory.
///
/// Checks `CONVERGE_CONFIG_DIR` first, then falls back to the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(config: &mut ConvergeConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            tracing::debug!(path = %path.display(), "loaded config layer");
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

/// Warn about a token stored in plain text.
fn check_plaintext_token(config: &ConvergeConfig, warnings: &mut Vec<String>) {
    let warning = format!(
        "API token is stored in plaintext in a config file. Consider setting {} instead.",
        crate::TOKEN_ENV
    );
    if let Some(connection) = &config.connection
        && connection.has_plaintext_token()
        && !warnings.contains(&warning)
    {
        warnings.push(warning);
    }
}
