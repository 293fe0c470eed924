//! Declared intent for one resource.

use std::collections::BTreeMap;
use std::time::Duration;

use converge_config::{ModuleDefinition, ResolverSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};
use crate::resolver::is_uuid;

/// Parameters consumed by the engine itself rather than forwarded as fields.
const RESERVED_PARAMS: &[&str] = &["state", "uuid", "wait", "timeout", "interval"];

/// Whether the resource should exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

impl std::str::FromStr for DesiredState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(DesiredState::Present),
            "absent" => Ok(DesiredState::Absent),
            other => Err(EngineError::config(format!(
                "state must be 'present' or 'absent', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredState::Present => f.write_str("present"),
            DesiredState::Absent => f.write_str("absent"),
        }
    }
}

/// Bounded waiting for asynchronous remote work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Whether to wait at all.
    pub wait: bool,
    /// Upper bound on the total wait.
    pub timeout: Duration,
    /// Delay between polls.
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            wait: true,
            timeout: Duration::from_secs(600),
            interval: Duration::from_secs(20),
        }
    }
}

/// The declared target for a single resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceIntent {
    /// Whether the resource should exist.
    pub state: DesiredState,
    /// Field values as supplied. Absent fields are never touched.
    pub fields: Map<String, Value>,
    /// Explicit identity, bypassing name lookups.
    pub uuid: Option<String>,
    /// Fields that carry references to other resources.
    pub resolvers: BTreeMap<String, ResolverSpec>,
    /// Resolver names in the order they must run.
    pub resolver_order: Vec<String>,
    /// Fields that jointly identify the resource instead of its name.
    pub composite_keys: Vec<String>,
    /// Waiting behavior for orders and terminations.
    pub wait: WaitPolicy,
    /// Report what would change without mutating anything.
    pub check_mode: bool,
}

impl ResourceIntent {
    /// Create an intent with the given fields and no references.
    pub fn new(state: DesiredState, fields: Map<String, Value>) -> Self {
        Self {
            state,
            fields: fields.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            ..Default::default()
        }
    }

    /// Build an intent from user parameters, taking references, identity
    /// rules and resolver order from the module definition.
    ///
    /// `state`, `uuid`, `wait`, `timeout` and `interval` are engine
    /// parameters; every other non-null entry becomes a field.
    pub fn from_params(definition: &ModuleDefinition, params: Value) -> Result<Self> {
        let Value::Object(mut params) = params else {
            return Err(EngineError::config("parameters must be a JSON object"));
        };

        let state = match params.get("state") {
            None | Some(Value::Null) => DesiredState::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(EngineError::config(format!(
                    "state must be a string, got {other}"
                )));
            }
        };

        let uuid = match params.get("uuid") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                scalar_string(v)
                    .ok_or_else(|| EngineError::config("uuid must be a string"))?,
            ),
        };

        let mut wait = WaitPolicy::default();
        if let Some(v) = params.get("wait").filter(|v| !v.is_null()) {
            wait.wait = v
                .as_bool()
                .ok_or_else(|| EngineError::config("wait must be a boolean"))?;
        }
        if let Some(v) = params.get("timeout").filter(|v| !v.is_null()) {
            wait.timeout = seconds(v, "timeout")?;
        }
        if let Some(v) = params.get("interval").filter(|v| !v.is_null()) {
            wait.interval = seconds(v, "interval")?;
        }

        for key in RESERVED_PARAMS {
            params.remove(*key);
        }

        let intent = Self {
            state,
            fields: params.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            uuid,
            resolvers: definition.resolvers.clone(),
            resolver_order: definition
                .resolver_order()
                .into_iter()
                .map(str::to_string)
                .collect(),
            composite_keys: definition.composite_keys.clone(),
            wait,
            check_mode: false,
        };
        intent.validate()?;
        Ok(intent)
    }

    /// Add a reference field.
    pub fn with_resolver(mut self, field: impl Into<String>, spec: ResolverSpec) -> Self {
        let field = field.into();
        if !self.resolver_order.contains(&field) {
            self.resolver_order.push(field.clone());
        }
        self.resolvers.insert(field, spec);
        self
    }

    /// Identify the resource by these fields instead of its name.
    pub fn with_composite_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    /// Check invariants that must hold before any remote call.
    pub fn validate(&self) -> Result<()> {
        if let Some(uuid) = &self.uuid
            && !is_uuid(uuid)
        {
            return Err(EngineError::config(format!("uuid '{uuid}' is not a valid UUID")));
        }
        for key in &self.composite_keys {
            if self.field(key).is_none() {
                return Err(EngineError::config(format!(
                    "parameter '{key}' is required: it is part of the key identifying this resource"
                )));
            }
        }
        Ok(())
    }

    /// Supplied, non-null value of a field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Supplied scalar value of a field, rendered as a string.
    pub fn field_str(&self, name: &str) -> Option<String> {
        self.field(name).and_then(scalar_string)
    }

    /// The `name` field, if supplied.
    pub fn name(&self) -> Option<&str> {
        self.field("name").and_then(Value::as_str)
    }

    /// Resolver order restricted to the given fields.
    pub(crate) fn ordered_references<'a>(&'a self, fields: &[&str]) -> Vec<&'a str> {
        self.resolver_order
            .iter()
            .map(String::as_str)
            .filter(|name| fields.contains(name) && self.resolvers.contains_key(*name))
            .collect()
    }
}

/// Render a scalar JSON value as a query-friendly string.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn seconds(value: &Value, name: &str) -> Result<Duration> {
    value
        .as_u64()
        .map(Duration::from_secs)
        .ok_or_else(|| EngineError::config(format!("{name} must be a whole number of seconds")))
}
