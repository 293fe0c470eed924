//! Read-only lookups.

use serde_json::Value;

use super::Session;
use crate::error::{EngineError, Result};
use crate::existence::filter_query;

/// Return the matching resource, or every match when the module lists many.
/// Never mutates.
pub(crate) fn reconcile(session: &mut Session<'_>) -> Result<Option<Value>> {
    let definition = session.definition;

    if definition.many && session.intent.uuid.is_none() {
        let query = filter_query(&mut session.resolver, definition, session.intent, true)?;
        tracing::debug!(?query, "listing resources");
        let items = session.api.list(&definition.list_op, &query)?;
        return Ok(Some(Value::Array(items)));
    }

    match session.existing()? {
        Some(resource) if definition.many => Ok(Some(Value::Array(vec![resource]))),
        Some(resource) => Ok(Some(resource)),
        None => Err(EngineError::not_found(format!("{} was not found.", session.subject()))),
    }
}

#[cfg(test)]
mod tests {
    use crate::intent::ResourceIntent;
    use crate::reconcile::Engine;
    use crate::testing::{MockApi, resource};
    use converge_config::{ModuleDefinition, ModuleKind, ResolverSpec};
    use serde_json::json;

    fn offering_facts(many: bool) -> ModuleDefinition {
        let mut definition = ModuleDefinition {
            kind: ModuleKind::Facts,
            resource_type: Some("offering".into()),
            list_op: "/api/marketplace-public-offerings/".into(),
            check_filter_keys: [("customer".to_string(), "customer_uuid".to_string())].into(),
            many,
            ..Default::default()
        };
        definition
            .resolvers
            .insert("customer".into(), ResolverSpec::new("/api/customers/"));
        definition
    }

    #[test]
    fn test_single_lookup() {
        let api = MockApi::new();
        api.on_list(
            "/api/marketplace-public-offerings/",
            &[("name", "Volumes")],
            vec![resource("marketplace-public-offerings", "o1", "Volumes")],
        );
        let intent = ResourceIntent::from_params(&offering_facts(false), json!({"name": "Volumes"})).unwrap();

        let outcome = Engine::new(&api).reconcile(&offering_facts(false), &intent);

        assert!(outcome.is_success());
        assert!(!outcome.changed);
        assert_eq!(outcome.resource.unwrap()["uuid"], "o1");
    }

    #[test]
    fn test_missing_is_an_error() {
        let api = MockApi::new();
        let intent = ResourceIntent::from_params(&offering_facts(false), json!({"name": "Nope"})).unwrap();

        let outcome = Engine::new(&api).reconcile(&offering_facts(false), &intent);

        let error = outcome.error.unwrap();
        assert_eq!(error.kind, "not_found");
        assert_eq!(error.message, "offering 'Nope' was not found.");
    }

    #[test]
    fn test_many_lists_with_filters() {
        let api = MockApi::new();
        api.on_list(
            "/api/customers/",
            &[("name", "Acme")],
            vec![resource("customers", "c1", "Acme")],
        );
        api.on_list(
            "/api/marketplace-public-offerings/",
            &[("customer_uuid", "c1")],
            vec![
                resource("marketplace-public-offerings", "o1", "Volumes"),
                resource("marketplace-public-offerings", "o2", "VMs"),
            ],
        );
        let intent = ResourceIntent::from_params(&offering_facts(true), json!({"customer": "Acme"})).unwrap();

        let outcome = Engine::new(&api).reconcile(&offering_facts(true), &intent);

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.resource.unwrap().as_array().unwrap().len(), 2);
        assert!(api.mutations().is_empty());
    }

    #[test]
    fn test_ambiguous_single_lookup() {
        let api = MockApi::new();
        api.on_list(
            "/api/marketplace-public-offerings/",
            &[("name", "Volumes")],
            vec![
                resource("marketplace-public-offerings", "o1", "Volumes"),
                resource("marketplace-public-offerings", "o2", "Volumes"),
            ],
        );
        let intent = ResourceIntent::from_params(&offering_facts(false), json!({"name": "Volumes"})).unwrap();

        let outcome = Engine::new(&api).reconcile(&offering_facts(false), &intent);
        assert_eq!(outcome.error.unwrap().kind, "ambiguous");
    }
}
