//! Configuration for the converge reconciliation engine.
//!
//! Provides TOML (or YAML) configuration with:
//! - Connection settings (`[connection]`: API URL, token, timeouts)
//! - Module definitions (`[modules.<name>]`): the static operation table,
//!   resolver specs, composite keys and update-tracked fields that a
//!   generated module hands to the engine
//! - Config file layering (user config dir + project-local overrides)
//! - API token resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, TOKEN_ENV, resolve_api_token};
pub use types::*;
