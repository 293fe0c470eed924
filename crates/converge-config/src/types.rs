//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [connection]               # API endpoint and credentials
//! [modules.project]          # one module definition per resource type
//! [modules.project.resolvers.customer]
//! [modules.instance.wait]    # state names used while polling
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default query parameter used for name lookups.
pub const DEFAULT_NAME_QUERY_PARAM: &str = "name";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of transport retries.
pub const DEFAULT_RETRIES: u32 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., a project-local
/// file that only adds modules) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Remote API connection settings.
    pub connection: Option<ConnectionConfig>,

    /// Module definitions keyed by module name.
    pub modules: BTreeMap<String, ModuleDefinition>,
}

impl ConvergeConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Parse from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        serde_yaml::from_str(yaml_str).map_err(|e| ConfigError::ParseYaml(e.to_string()))
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Connection settings merge field by field; modules are replaced whole.
    pub fn merge(&mut self, other: ConvergeConfig) {
        match (&mut self.connection, other.connection) {
            (Some(current), Some(next)) => current.merge(next),
            (current @ None, Some(next)) => *current = Some(next),
            (_, None) => {}
        }

        for (name, module) in other.modules {
            self.modules.insert(name, module);
        }
    }

    /// Look up a module definition by name.
    pub fn module(&self, name: &str) -> Result<&ModuleDefinition> {
        self.modules
            .get(name)
            .ok_or_else(|| ConfigError::ModuleNotFound(name.to_string()))
    }

    /// Module names in sorted order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Validate every module definition.
    pub fn validate(&self) -> Result<()> {
        for (name, module) in &self.modules {
            module.validate(name)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// Remote API connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base URL of the remote API.
    pub api_url: Option<String>,
    /// API token (prefer the env var; warns if set here).
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Retries for transport-level failures.
    pub retries: Option<u32>,
}

impl ConnectionConfig {
    /// Merge another connection section on top of this one.
    pub fn merge(&mut self, other: ConnectionConfig) {
        if other.api_url.is_some() {
            self.api_url = other.api_url;
        }
        if other.token.is_some() {
            self.token = other.token;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.retries.is_some() {
            self.retries = other.retries;
        }
    }

    /// Returns true if a token is stored directly in the config file.
    pub fn has_plaintext_token(&self) -> bool {
        self.token.is_some()
    }

    /// Effective request timeout.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Effective transport retry count.
    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Reconciliation strategy of a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Plain create/update/destroy endpoints.
    #[default]
    Crud,
    /// Marketplace order workflow (order, poll, terminate).
    Order,
    /// Read-only lookup.
    Facts,
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleKind::Crud => f.write_str("crud"),
            ModuleKind::Order => f.write_str("order"),
            ModuleKind::Facts => f.write_str("facts"),
        }
    }
}

/// Static description of one resource type, as produced by the generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDefinition {
    /// Reconciliation strategy.
    pub kind: ModuleKind,

    /// Human-readable resource type (used in messages and command descriptions).
    pub resource_type: Option<String>,

    /// List endpoint, also used for existence checks.
    pub list_op: String,

    /// Detail endpoint template (`{uuid}` placeholder). Defaults to `<list_op>{uuid}/`.
    pub retrieve_op: Option<String>,

    /// Create endpoint template (crud only). May contain placeholders filled
    /// from `create_path_params`.
    pub create_op: Option<String>,

    /// Partial update endpoint template.
    pub update_op: Option<String>,

    /// Destroy endpoint template (crud only).
    pub destroy_op: Option<String>,

    /// Query parameter used for name matches.
    pub name_query_param: Option<String>,

    /// Fields whose combined values identify a resource.
    pub composite_keys: Vec<String>,

    /// Field → remote filter key used when checking existence.
    pub check_filter_keys: BTreeMap<String, String>,

    /// Reference resolvers keyed by field name.
    pub resolvers: BTreeMap<String, ResolverSpec>,

    /// Resolution order; resolvers not listed run afterwards in name order.
    pub resolver_order: Vec<String>,

    /// Fields sent in the create payload (crud).
    pub create_fields: Vec<String>,

    /// Create path placeholder → field whose resolved UUID fills it.
    pub create_path_params: BTreeMap<String, String>,

    /// Fields compared against the existing resource to decide on an update.
    #[serde(alias = "update_fields")]
    pub update_check_fields: Vec<String>,

    /// Updates applied through dedicated action endpoints, keyed by action name.
    pub update_actions: BTreeMap<String, UpdateAction>,

    /// Fields nested under `attributes` in an order payload (order).
    pub attribute_fields: Vec<String>,

    /// Field → termination attribute key (order).
    pub termination_attributes: BTreeMap<String, String>,

    /// Return every match instead of exactly one (facts).
    pub many: bool,

    /// State names used while waiting.
    pub wait: WaitStates,
}

impl ModuleDefinition {
    /// Display name for messages.
    pub fn resource_type(&self) -> &str {
        self.resource_type.as_deref().unwrap_or("resource")
    }

    /// Effective detail endpoint template.
    pub fn retrieve_op(&self) -> String {
        self.retrieve_op
            .clone()
            .unwrap_or_else(|| format!("{}{{uuid}}/", self.list_op))
    }

    /// Effective name query parameter.
    pub fn name_query_param(&self) -> &str {
        self.name_query_param
            .as_deref()
            .unwrap_or(DEFAULT_NAME_QUERY_PARAM)
    }

    /// Resolver names in the order they must run.
    pub fn resolver_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = self.resolver_order.iter().map(String::as_str).collect();
        for name in self.resolvers.keys() {
            if !order.contains(&name.as_str()) {
                order.push(name);
            }
        }
        order
    }

    /// Check the definition for internal consistency.
    pub fn validate(&self, module: &str) -> Result<()> {
        let fail = |reason: String| Err(ConfigError::invalid_module(module, reason));

        if self.list_op.trim().is_empty() {
            return fail("list_op is required".to_string());
        }

        for (i, key) in self.composite_keys.iter().enumerate() {
            if self.composite_keys[..i].contains(key) {
                return fail(format!("composite key '{}' is listed twice", key));
            }
        }

        if !self.update_check_fields.is_empty() && self.update_op.is_none() {
            return fail("update_check_fields requires update_op".to_string());
        }

        for (name, action) in &self.update_actions {
            if action.param.trim().is_empty() || action.path.trim().is_empty() {
                return fail(format!("update action '{}' needs both param and path", name));
            }
        }

        for name in &self.resolver_order {
            if !self.resolvers.contains_key(name) {
                return fail(format!("resolver_order names unknown resolver '{}'", name));
            }
        }

        let order = self.resolver_order();
        for (position, name) in order.iter().enumerate() {
            let spec = &self.resolvers[*name];
            if spec.list_op.trim().is_empty() {
                return fail(format!("resolver '{}' has no list_op", name));
            }
            for dep in &spec.filter_by {
                match order.iter().position(|n| *n == dep.source_param) {
                    Some(p) if p < position => {}
                    Some(_) => {
                        return fail(format!(
                            "resolver '{}' depends on '{}', which resolves later",
                            name, dep.source_param
                        ));
                    }
                    None => {
                        return fail(format!(
                            "resolver '{}' depends on unknown resolver '{}'",
                            name, dep.source_param
                        ));
                    }
                }
            }
        }

        for (placeholder, field) in &self.create_path_params {
            if !self.resolvers.contains_key(field) {
                return fail(format!(
                    "create path parameter '{}' maps to '{}', which has no resolver",
                    placeholder, field
                ));
            }
        }

        match self.kind {
            ModuleKind::Crud => {
                if self.create_op.is_none() && !self.create_fields.is_empty() {
                    return fail("create_fields requires create_op".to_string());
                }
            }
            ModuleKind::Order => {
                for required in ["project", "offering"] {
                    if !self.resolvers.contains_key(required) {
                        return fail(format!("order modules need a '{}' resolver", required));
                    }
                }
            }
            ModuleKind::Facts => {}
        }

        Ok(())
    }
}

/// How to turn a user-facing value into a canonical reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSpec {
    /// List endpoint queried by name.
    #[serde(alias = "url")]
    pub list_op: String,

    /// Detail endpoint template. Defaults to `<list_op>{uuid}/`.
    pub retrieve_op: Option<String>,

    /// Query parameter used for name matches (`name_exact` on Waldur).
    pub name_query_param: Option<String>,

    /// Context entry → remote query parameter applied to name lookups.
    pub filter_key_map: BTreeMap<String, String>,

    /// Message used when nothing matches; `{value}` is substituted.
    #[serde(alias = "error_message")]
    pub error_template: Option<String>,

    /// Filters derived from previously resolved references.
    pub filter_by: Vec<DependencyFilter>,

    /// The field holds a list of references.
    pub is_list: bool,

    /// Wrap each resolved list item as `{<key>: url}`.
    pub list_item_key: Option<String>,
}

impl ResolverSpec {
    /// Create a resolver for a list endpoint.
    pub fn new(list_op: impl Into<String>) -> Self {
        Self {
            list_op: list_op.into(),
            ..Default::default()
        }
    }

    /// Set the not-found message template.
    pub fn with_error_template(mut self, template: impl Into<String>) -> Self {
        self.error_template = Some(template.into());
        self
    }

    /// Set the query parameter used for name matches.
    pub fn with_name_query_param(mut self, param: impl Into<String>) -> Self {
        self.name_query_param = Some(param.into());
        self
    }

    /// Effective name query parameter.
    pub fn name_query_param(&self) -> &str {
        self.name_query_param
            .as_deref()
            .unwrap_or(DEFAULT_NAME_QUERY_PARAM)
    }

    /// Map a context entry onto a remote query parameter.
    pub fn with_filter_key(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.filter_key_map.insert(local.into(), remote.into());
        self
    }

    /// Add a dependency filter.
    pub fn with_dependency(mut self, filter: DependencyFilter) -> Self {
        self.filter_by.push(filter);
        self
    }

    /// Mark the field as a list of references.
    pub fn list_of(mut self, item_key: Option<&str>) -> Self {
        self.is_list = true;
        self.list_item_key = item_key.map(str::to_string);
        self
    }

    /// Effective detail endpoint template.
    pub fn retrieve_op(&self) -> String {
        self.retrieve_op
            .clone()
            .unwrap_or_else(|| format!("{}{{uuid}}/", self.list_op))
    }

    /// Render the not-found message for a value.
    pub fn not_found_message(&self, field: &str, value: &str) -> String {
        match &self.error_template {
            Some(template) => template.replace("{value}", value),
            None => format!("{} '{}' was not found.", field, value),
        }
    }
}

/// Filter a resolver's lookup by a key of an earlier resolved object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyFilter {
    /// Field whose resolved object supplies the value.
    pub source_param: String,
    /// Key read from that object.
    pub source_key: String,
    /// Query parameter sent with the lookup.
    pub target_key: String,
}

impl DependencyFilter {
    /// Create a dependency filter.
    pub fn new(
        source_param: impl Into<String>,
        source_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            source_param: source_param.into(),
            source_key: source_key.into(),
            target_key: target_key.into(),
        }
    }
}

/// A field changed by POSTing to an action endpoint rather than by PATCH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateAction {
    /// Field carrying the desired value.
    pub param: String,
    /// Key of the observed resource to compare with. Defaults to `param`.
    pub compare_key: Option<String>,
    /// Action endpoint template (`{uuid}` placeholder).
    pub path: String,
    /// Keys that identify an item when comparing lists of objects.
    pub idempotency_keys: Vec<String>,
    /// Send `{<param>: value}` instead of the bare value.
    pub wrap_in_object: bool,
}

impl UpdateAction {
    /// Create an action for `param` posted to `path`.
    pub fn new(param: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn compare_key(&self) -> &str {
        self.compare_key.as_deref().unwrap_or(&self.param)
    }
}

/// State names consulted while polling a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitStates {
    /// Field carrying the resource state.
    pub state_field: String,
    /// States that mean an asynchronous action finished.
    pub ok_states: Vec<String>,
    /// States that mean a termination is still in progress.
    pub terminating_states: Vec<String>,
    /// States that mean a termination or action failed.
    pub erred_states: Vec<String>,
}

impl Default for WaitStates {
    fn default() -> Self {
        Self {
            state_field: "state".to_string(),
            ok_states: vec!["OK".to_string()],
            terminating_states: vec![
                "Terminating".to_string(),
                "Deleting".to_string(),
                "Deletion Scheduled".to_string(),
            ],
            erred_states: vec!["Erred".to_string()],
        }
    }
}
