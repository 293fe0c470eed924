//! Does the declared resource already exist?

use converge_client::ResourceApi;
use converge_config::ModuleDefinition;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::intent::{ResourceIntent, scalar_string};
use crate::resolver::{ReferenceResolver, is_uuid};

/// Outcome of an existence check.
#[derive(Debug, Clone, PartialEq)]
pub enum ExistenceResult {
    NotFound,
    Found(Value),
    /// The lookup matched this many resources.
    Ambiguous(usize),
}

impl ExistenceResult {
    fn from_matches(mut items: Vec<Value>) -> Self {
        match items.len() {
            0 => ExistenceResult::NotFound,
            1 => ExistenceResult::Found(items.remove(0)),
            n => ExistenceResult::Ambiguous(n),
        }
    }
}

/// Find the remote resource an intent refers to.
///
/// Identity is decided in priority order:
///
/// 1. an explicit `uuid`, or a `name` that is itself a UUID, is retrieved
///    directly;
/// 2. composite keys, each present in the intent, filter the list endpoint;
///    reference keys filter by the UUID they resolve to;
/// 3. otherwise the name filters the list endpoint, narrowed by any
///    supplied `check_filter_keys`.
pub fn check_existence(
    api: &dyn ResourceApi,
    resolver: &mut ReferenceResolver<'_>,
    definition: &ModuleDefinition,
    intent: &ResourceIntent,
) -> Result<ExistenceResult> {
    if let Some(uuid) = &intent.uuid {
        return retrieve(api, definition, uuid);
    }

    if !intent.composite_keys.is_empty() {
        intent.validate()?;
        let query = composite_query(resolver, definition, intent)?;
        tracing::debug!(?query, "checking existence by composite key");
        return Ok(ExistenceResult::from_matches(api.list(&definition.list_op, &query)?));
    }

    let name = intent.field_str("name").ok_or_else(|| {
        EngineError::config(format!(
            "parameter 'name' is required to identify the {}",
            definition.resource_type()
        ))
    })?;
    if is_uuid(&name) {
        return retrieve(api, definition, &name);
    }

    let query = filter_query(resolver, definition, intent, true)?;
    tracing::debug!(?query, "checking existence by name");
    Ok(ExistenceResult::from_matches(api.list(&definition.list_op, &query)?))
}

/// Query built from the name (optionally) and the supplied
/// `check_filter_keys` fields.
pub fn filter_query(
    resolver: &mut ReferenceResolver<'_>,
    definition: &ModuleDefinition,
    intent: &ResourceIntent,
    include_name: bool,
) -> Result<Vec<(String, String)>> {
    let mut query = Vec::new();
    if include_name && let Some(name) = intent.field_str("name") {
        query.push((definition.name_query_param().to_string(), name));
    }

    let supplied: Vec<&str> = definition
        .check_filter_keys
        .keys()
        .map(String::as_str)
        .filter(|field| intent.field(field).is_some())
        .collect();
    resolve_sources(resolver, intent, &supplied, None)?;
    for field in intent.ordered_references(&supplied) {
        resolve_id(resolver, intent, field)?;
    }

    for field in supplied {
        let remote = &definition.check_filter_keys[field];
        query.push((remote.clone(), filter_value(resolver, intent, field)?));
    }
    Ok(query)
}

fn composite_query(
    resolver: &mut ReferenceResolver<'_>,
    definition: &ModuleDefinition,
    intent: &ResourceIntent,
) -> Result<Vec<(String, String)>> {
    let keys: Vec<&str> = intent.composite_keys.iter().map(String::as_str).collect();
    resolve_sources(resolver, intent, &keys, None)?;
    for field in intent.ordered_references(&keys) {
        resolve_id(resolver, intent, field)?;
    }

    keys.into_iter()
        .map(|key| -> Result<(String, String)> {
            let remote = match definition.check_filter_keys.get(key) {
                Some(remote) => remote.clone(),
                None if intent.resolvers.contains_key(key) => format!("{key}_uuid"),
                None if key == "name" => definition.name_query_param().to_string(),
                None => key.to_string(),
            };
            Ok((remote, filter_value(resolver, intent, key)?))
        })
        .collect()
}

fn filter_value(
    resolver: &mut ReferenceResolver<'_>,
    intent: &ResourceIntent,
    field: &str,
) -> Result<String> {
    if intent.resolvers.contains_key(field) {
        return resolve_id(resolver, intent, field);
    }
    intent
        .field(field)
        .and_then(scalar_string)
        .ok_or_else(|| EngineError::config(format!("parameter '{field}' must be a scalar to filter by")))
}

/// Resolve the references that the resolvers of `fields` filter by,
/// following resolver order.
///
/// A source the user supplied is resolved from that value; one left out is
/// primed from the reference held by `existing`, when there is one.
pub(crate) fn resolve_sources(
    resolver: &mut ReferenceResolver<'_>,
    intent: &ResourceIntent,
    fields: &[&str],
    existing: Option<&Value>,
) -> Result<()> {
    let mut pending: Vec<&str> = fields
        .iter()
        .filter_map(|field| intent.resolvers.get_key_value(*field))
        .map(|(name, _)| name.as_str())
        .collect();
    let mut sources: Vec<&str> = Vec::new();
    while let Some(field) = pending.pop() {
        let spec = &intent.resolvers[field];
        let dependencies = spec
            .filter_by
            .iter()
            .map(|filter| filter.source_param.as_str())
            .chain(spec.filter_key_map.keys().map(String::as_str));
        for dependency in dependencies {
            if let Some((name, _)) = intent.resolvers.get_key_value(dependency)
                && !sources.contains(&name.as_str())
            {
                sources.push(name.as_str());
                pending.push(name.as_str());
            }
        }
    }

    for field in intent.ordered_references(&sources) {
        if resolver.resolved_object(field).is_some() {
            continue;
        }
        if intent.field_str(field).is_some() {
            resolve_id(resolver, intent, field)?;
        } else if let Some(reference) = existing.and_then(|e| e.get(field)).filter(|v| !v.is_null()) {
            resolver
                .prime(field, reference, &intent.resolvers[field])
                .map_err(|e| EngineError::resolving(field, e))?;
        }
    }
    Ok(())
}

/// Resolve a reference field to its UUID.
pub(crate) fn resolve_id(
    resolver: &mut ReferenceResolver<'_>,
    intent: &ResourceIntent,
    field: &str,
) -> Result<String> {
    let spec = intent
        .resolvers
        .get(field)
        .ok_or_else(|| EngineError::config(format!("'{field}' has no resolver")))?;
    let raw = intent
        .field_str(field)
        .ok_or_else(|| EngineError::config(format!("parameter '{field}' must be a name or UUID")))?;
    resolver
        .resolve(field, &raw, spec)
        .map(|resolved| resolved.canonical_id)
        .map_err(|e| EngineError::resolving(field, e))
}

fn retrieve(api: &dyn ResourceApi, definition: &ModuleDefinition, uuid: &str) -> Result<ExistenceResult> {
    match api.retrieve(&definition.retrieve_op(), uuid) {
        Ok(object) => Ok(ExistenceResult::Found(object)),
        Err(e) if e.is_not_found() => Ok(ExistenceResult::NotFound),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::DesiredState;
    use crate::testing::{Call, MockApi, resource};
    use converge_config::ResolverSpec;
    use serde_json::{Map, json};

    const UUID: &str = "0b1c2d3e4f5a4b6c8d7e9f0a1b2c3d4e";

    fn intent(fields: Value) -> ResourceIntent {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object")
        };
        ResourceIntent::new(DesiredState::Present, fields)
    }

    fn definition() -> ModuleDefinition {
        ModuleDefinition {
            resource_type: Some("project".into()),
            list_op: "/api/projects/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_uuid_is_retrieved() {
        let api = MockApi::new();
        api.on_retrieve(&format!("/api/projects/{UUID}/"), resource("projects", UUID, "proj-a"));
        let mut resolver = ReferenceResolver::new(&api);

        let result = check_existence(
            &api,
            &mut resolver,
            &definition(),
            &intent(json!({"name": "proj-a"})).with_uuid(UUID),
        )
        .unwrap();

        assert!(matches!(result, ExistenceResult::Found(_)));
        assert_eq!(api.list_calls(), 0);
    }

    #[test]
    fn test_name_that_is_uuid_is_retrieved() {
        let api = MockApi::new();
        let mut resolver = ReferenceResolver::new(&api);

        let result =
            check_existence(&api, &mut resolver, &definition(), &intent(json!({"name": UUID})))
                .unwrap();

        assert_eq!(result, ExistenceResult::NotFound);
        assert_eq!(
            api.calls(),
            vec![Call::Retrieve {
                path: format!("/api/projects/{UUID}/")
            }]
        );
    }

    #[test]
    fn test_name_with_check_filter_keys() {
        let api = MockApi::new();
        api.on_list("/api/customers/", &[("name", "Acme")], vec![resource("customers", "c1", "Acme")]);
        api.on_list(
            "/api/projects/",
            &[("name", "proj-a"), ("customer", "c1")],
            vec![resource("projects", "p1", "proj-a")],
        );
        let mut definition = definition();
        definition
            .check_filter_keys
            .insert("customer".into(), "customer".into());
        let intent = intent(json!({"name": "proj-a", "customer": "Acme"}))
            .with_resolver("customer", ResolverSpec::new("/api/customers/"));
        let mut resolver = ReferenceResolver::new(&api);

        let result = check_existence(&api, &mut resolver, &definition, &intent).unwrap();
        match result {
            ExistenceResult::Found(found) => assert_eq!(found["uuid"], "p1"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_name_is_configuration_error() {
        let api = MockApi::new();
        let mut resolver = ReferenceResolver::new(&api);
        let err = check_existence(
            &api,
            &mut resolver,
            &definition(),
            &ResourceIntent::new(DesiredState::Present, Map::new()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "configuration_invalid");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_composite_keys_filter_by_resolved_uuid() {
        let api = MockApi::new();
        api.on_list("/api/users/", &[("name", "alice")], vec![resource("users", "u1", "alice")]);
        api.on_list(
            "/api/user-invitations/",
            &[("user_uuid", "u1"), ("role", "admin")],
            vec![resource("user-invitations", "i1", "")],
        );
        let definition = ModuleDefinition {
            list_op: "/api/user-invitations/".into(),
            ..Default::default()
        };
        let intent = intent(json!({"user": "alice", "role": "admin"}))
            .with_resolver("user", ResolverSpec::new("/api/users/"))
            .with_composite_keys(["user", "role"]);
        let mut resolver = ReferenceResolver::new(&api);

        let result = check_existence(&api, &mut resolver, &definition, &intent).unwrap();
        assert!(matches!(result, ExistenceResult::Found(_)));
    }

    #[test]
    fn test_composite_key_missing_fails_before_network() {
        let api = MockApi::new();
        let intent = intent(json!({"user": "alice"})).with_composite_keys(["user", "role"]);
        let mut resolver = ReferenceResolver::new(&api);

        let err = check_existence(&api, &mut resolver, &definition(), &intent).unwrap_err();
        assert_eq!(err.kind(), "configuration_invalid");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_filter_key_dependency_is_resolved_first() {
        let api = MockApi::new();
        api.on_list("/api/tenants/", &[("name", "t")], vec![resource("tenants", "t1", "t")]);
        api.on_list(
            "/api/subnets/",
            &[("name", "sub"), ("tenant_uuid", "t1")],
            vec![resource("subnets", "n1", "sub")],
        );
        api.on_list(
            "/api/ports/",
            &[("name", "port-1"), ("subnet_uuid", "n1")],
            vec![resource("ports", "x1", "port-1")],
        );
        let mut definition = ModuleDefinition {
            list_op: "/api/ports/".into(),
            ..Default::default()
        };
        definition
            .check_filter_keys
            .insert("subnet".into(), "subnet_uuid".into());
        let intent = intent(json!({"name": "port-1", "subnet": "sub", "tenant": "t"}))
            .with_resolver("tenant", ResolverSpec::new("/api/tenants/"))
            .with_resolver(
                "subnet",
                ResolverSpec::new("/api/subnets/").with_filter_key("tenant", "tenant_uuid"),
            );
        let mut resolver = ReferenceResolver::new(&api);

        let result = check_existence(&api, &mut resolver, &definition, &intent).unwrap();
        match result {
            ExistenceResult::Found(found) => assert_eq!(found["uuid"], "x1"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_match_is_reported() {
        let api = MockApi::new();
        api.on_list(
            "/api/projects/",
            &[("name", "proj-a")],
            vec![resource("projects", "p1", "proj-a"), resource("projects", "p2", "proj-a")],
        );
        let mut resolver = ReferenceResolver::new(&api);

        let result =
            check_existence(&api, &mut resolver, &definition(), &intent(json!({"name": "proj-a"})))
                .unwrap();
        assert_eq!(result, ExistenceResult::Ambiguous(2));
    }

    #[test]
    fn test_unresolvable_filter_reference() {
        let api = MockApi::new();
        let mut definition = definition();
        definition
            .check_filter_keys
            .insert("customer".into(), "customer_uuid".into());
        let intent = intent(json!({"name": "proj-a", "customer": "Nope"}))
            .with_resolver("customer", ResolverSpec::new("/api/customers/"));
        let mut resolver = ReferenceResolver::new(&api);

        let err = check_existence(&api, &mut resolver, &definition, &intent).unwrap_err();
        assert!(matches!(err, EngineError::ResolutionFailed { ref field, .. } if field == "customer"));
    }
}
