//! Reference resolution.
//!
//! Users refer to related resources by name or UUID; the API wants URLs in
//! payloads and UUIDs in filters. A [`ReferenceResolver`] performs these
//! lookups for one run, caching every answer so that a value is fetched at
//! most once no matter how many times it is referenced.
//!
//! Resolution of a field may depend on earlier ones in two ways:
//!
//! - *context filters*: a resolver's `filter_key_map` maps the names of
//!   previously resolved fields onto query parameters carrying their UUID;
//! - *dependency filters*: `filter_by` copies an arbitrary key of a
//!   previously resolved object into the query.

use std::collections::{BTreeMap, HashMap};

use converge_client::{ResourceApi, expand_path};
use converge_config::ResolverSpec;
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};
use crate::intent::scalar_string;

/// Canonical form of a referenced resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValue {
    /// What the user wrote.
    pub raw_input: String,
    /// UUID of the referenced resource.
    pub canonical_id: String,
    /// URL of the referenced resource.
    pub canonical_url: String,
    /// The full remote object.
    pub object: Value,
}

/// Per-run reference resolver.
pub struct ReferenceResolver<'a> {
    api: &'a dyn ResourceApi,
    cache: HashMap<(String, String), ResolvedValue>,
    /// Last object resolved for each field, read by dependency filters.
    objects: HashMap<String, Value>,
    context: BTreeMap<String, String>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(api: &'a dyn ResourceApi) -> Self {
        Self {
            api,
            cache: HashMap::new(),
            objects: HashMap::new(),
            context: BTreeMap::new(),
        }
    }

    /// Seed a context entry visible to `filter_key_map` lookups.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Resolve one user-supplied value of `field`.
    ///
    /// A UUID is fetched directly; anything else is looked up by name and
    /// must match exactly one resource.
    pub fn resolve(&mut self, field: &str, raw: &str, spec: &ResolverSpec) -> Result<ResolvedValue> {
        let key = (field.to_string(), raw.to_string());
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(field, value = raw, "resolver cache hit");
            return Ok(hit.clone());
        }

        let object = if is_uuid(raw) {
            self.retrieve(field, raw, spec)?
        } else {
            self.lookup_by_name(field, raw, spec)?
        };

        let resolved = canonicalize(raw, object, spec)?;
        tracing::debug!(field, value = raw, uuid = %resolved.canonical_id, "resolved reference");

        self.objects.insert(field.to_string(), resolved.object.clone());
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolve every reference inside `value` into URL form.
    ///
    /// Objects are walked key by key, so nested fields with their own
    /// resolvers are handled too. List resolvers turn each element into a
    /// URL, or into `{list_item_key: url}` when an item key is configured.
    /// Values without a resolver pass through unchanged.
    pub fn resolve_value(
        &mut self,
        field: &str,
        value: &Value,
        resolvers: &BTreeMap<String, ResolverSpec>,
    ) -> Result<Value> {
        let spec = resolvers.get(field);
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, inner) in map {
                    out.insert(key.clone(), self.resolve_value(key, inner, resolvers)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => match spec {
                Some(spec) if spec.is_list => items
                    .iter()
                    .map(|item| self.resolve_list_item(field, item, spec))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                _ => items
                    .iter()
                    .map(|item| self.resolve_value(field, item, resolvers))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
            },
            scalar => match (spec, scalar_string(scalar)) {
                (Some(spec), Some(raw)) => {
                    let resolved = self.resolve(field, &raw, spec)?;
                    Ok(Value::String(resolved.canonical_url))
                }
                _ => Ok(scalar.clone()),
            },
        }
    }

    /// Canonical UUID form of a reference value: a string, or an array of
    /// strings for list references.
    pub fn canonical_ids(&mut self, field: &str, value: &Value, spec: &ResolverSpec) -> Result<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.canonical_ids(field, item, spec))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => {
                let raw = scalar_string(other).ok_or_else(|| {
                    EngineError::config(format!("'{field}' must be a name or UUID"))
                })?;
                Ok(Value::String(self.resolve(field, &raw, spec)?.canonical_id))
            }
        }
    }

    /// Load the object behind an observed reference (a URL, UUID or object)
    /// so that dependency filters can read it. Fields already resolved in
    /// this run are left alone.
    pub fn prime(&mut self, field: &str, reference: &Value, spec: &ResolverSpec) -> Result<()> {
        if self.objects.contains_key(field) {
            return Ok(());
        }
        let Some(uuid) = reference_id(reference).as_str().map(str::to_string) else {
            return Ok(());
        };

        let key = (field.to_string(), uuid.clone());
        let resolved = match self.cache.get(&key) {
            Some(hit) => hit.clone(),
            None => {
                let object = self.retrieve(field, &uuid, spec)?;
                canonicalize(&uuid, object, spec)?
            }
        };
        tracing::debug!(field, uuid = %resolved.canonical_id, "primed reference from existing resource");

        self.objects.insert(field.to_string(), resolved.object.clone());
        self.cache.insert(key, resolved);
        Ok(())
    }

    /// Object most recently resolved for `field`.
    pub fn resolved_object(&self, field: &str) -> Option<&Value> {
        self.objects.get(field)
    }

    fn resolve_list_item(&mut self, field: &str, item: &Value, spec: &ResolverSpec) -> Result<Value> {
        let raw = scalar_string(item)
            .ok_or_else(|| EngineError::config(format!("items of '{field}' must be names or UUIDs")))?;
        let url = self.resolve(field, &raw, spec)?.canonical_url;
        Ok(match &spec.list_item_key {
            Some(key) => {
                let mut wrapped = Map::new();
                wrapped.insert(key.clone(), Value::String(url));
                Value::Object(wrapped)
            }
            None => Value::String(url),
        })
    }

    fn retrieve(&self, field: &str, uuid: &str, spec: &ResolverSpec) -> Result<Value> {
        match self.api.retrieve(&spec.retrieve_op(), uuid) {
            Ok(object) => Ok(object),
            Err(e) if e.is_not_found() => Err(EngineError::not_found(spec.not_found_message(field, uuid))),
            Err(e) => Err(e.into()),
        }
    }

    fn lookup_by_name(&self, field: &str, raw: &str, spec: &ResolverSpec) -> Result<Value> {
        let mut query = vec![(spec.name_query_param().to_string(), raw.to_string())];
        query.extend(self.context_query(spec));
        query.extend(self.dependency_query(field, spec)?);

        let mut matches = self.api.list(&spec.list_op, &query)?;
        match matches.len() {
            0 => Err(EngineError::not_found(spec.not_found_message(field, raw))),
            1 => Ok(matches.remove(0)),
            count => Err(EngineError::Ambiguous {
                subject: format!("{field} '{raw}'"),
                count,
            }),
        }
    }

    /// Context entries are seeded values plus the UUIDs of every field
    /// resolved so far.
    fn context_query(&self, spec: &ResolverSpec) -> Vec<(String, String)> {
        spec.filter_key_map
            .iter()
            .filter_map(|(local, remote)| {
                let value = self.context.get(local).cloned().or_else(|| {
                    self.objects
                        .get(local)
                        .and_then(|o| o.get("uuid"))
                        .and_then(scalar_string)
                })?;
                Some((remote.clone(), value))
            })
            .collect()
    }

    fn dependency_query(&self, field: &str, spec: &ResolverSpec) -> Result<Vec<(String, String)>> {
        spec.filter_by
            .iter()
            .map(|filter| -> Result<(String, String)> {
                let source = self.objects.get(&filter.source_param).ok_or_else(|| {
                    EngineError::config(format!(
                        "'{field}' is filtered by '{}', which has not been resolved",
                        filter.source_param
                    ))
                })?;
                let value = source
                    .get(&filter.source_key)
                    .and_then(scalar_string)
                    .ok_or_else(|| {
                        EngineError::config(format!(
                            "resolved '{}' has no '{}' to filter '{field}' by",
                            filter.source_param, filter.source_key
                        ))
                    })?;
                Ok((filter.target_key.clone(), value))
            })
            .collect()
    }
}

/// Whether a string is a UUID (hyphenated or simple form).
pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

/// Canonical id of an observed reference: a UUID, a URL whose last path
/// segment is the UUID, or an object carrying either.
pub(crate) fn reference_id(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(last_segment(s).to_string()),
        Value::Object(map) => map
            .get("uuid")
            .cloned()
            .or_else(|| map.get("url").map(reference_id))
            .unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(items.iter().map(reference_id).collect()),
        other => other.clone(),
    }
}

fn last_segment(s: &str) -> &str {
    s.trim_end_matches('/').rsplit('/').next().unwrap_or(s)
}

fn canonicalize(raw: &str, object: Value, spec: &ResolverSpec) -> Result<ResolvedValue> {
    let url = object.get("url").and_then(Value::as_str).map(str::to_string);
    let uuid = object
        .get("uuid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| url.as_deref().map(|u| last_segment(u).to_string()))
        .ok_or_else(|| {
            EngineError::Transport(format!(
                "object returned for '{raw}' carries neither uuid nor url"
            ))
        })?;
    let url = match url {
        Some(url) => url,
        None => expand_path(&spec.retrieve_op(), &[("uuid", uuid.as_str())])?,
    };

    Ok(ResolvedValue {
        raw_input: raw.to_string(),
        canonical_id: uuid,
        canonical_url: url,
        object,
    })
}
