//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Failed to parse YAML.
    #[error("failed to parse YAML config: {0}")]
    ParseYaml(String),

    /// Module not defined in any loaded config.
    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    /// Module definition is malformed.
    #[error("invalid module '{module}': {reason}")]
    InvalidModule { module: String, reason: String },

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },
}

impl ConfigError {
    /// Create an invalid-module error.
    pub fn invalid_module(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidModule {
            module: module.into(),
            reason: reason.into(),
        }
    }
}
