//! CLI command handlers.

pub mod modules;
pub mod run;
pub mod validate;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use converge_client::ApiClient;
use converge_config::{LoadedConfig, TOKEN_ENV, load_config, resolve_api_token};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration with its sources.
    pub loaded: LoadedConfig,
    /// API URL given on the command line or via environment.
    pub api_url: Option<String>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Discover config layers, then apply an explicit `--config` file.
    pub fn load(explicit: Option<&Path>, api_url: Option<String>, verbose: bool) -> Result<Self> {
        let mut loaded = load_config(None).context("failed to load configuration")?;
        if let Some(path) = explicit {
            loaded
                .overlay_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }

        Ok(Self {
            loaded,
            api_url,
            verbose,
        })
    }

    /// Build an API client from the connection settings.
    pub fn client(&self) -> Result<ApiClient> {
        let connection = self.loaded.config.connection.clone().unwrap_or_default();

        let Some(api_url) = self.api_url.clone().or(connection.api_url.clone()) else {
            bail!(
                "no API URL configured: pass --api-url, set CONVERGE_API_URL or add api_url to [connection]"
            );
        };
        let Some(token) = resolve_api_token(connection.token.as_deref()) else {
            bail!("no API token configured: set {TOKEN_ENV} or add token to [connection]");
        };
        tracing::debug!(url = %api_url, token_source = %token.source, "connecting");

        ApiClient::builder()
            .base_url(api_url)
            .token(token.value)
            .timeout(Duration::from_secs(connection.timeout_secs()))
            .retries(connection.retries())
            .build()
            .context("failed to create API client")
    }
}
