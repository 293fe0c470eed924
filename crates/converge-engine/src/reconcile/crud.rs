//! Direct create/update/delete reconciliation.

use converge_client::expand_path;
use serde_json::Value;

use super::{Session, resource_uuid};
use crate::error::{EngineError, Result};
use crate::existence::{resolve_id, resolve_sources};
use crate::intent::DesiredState;
use crate::outcome::PlannedCommand;

pub(crate) fn reconcile(session: &mut Session<'_>) -> Result<Option<Value>> {
    let existing = session.existing()?;
    match (session.intent.state, existing) {
        (DesiredState::Present, None) => create(session),
        (DesiredState::Present, Some(existing)) => session.update(existing),
        (DesiredState::Absent, Some(existing)) => destroy(session, &existing).map(|()| None),
        (DesiredState::Absent, None) => Ok(None),
    }
}

fn create(session: &mut Session<'_>) -> Result<Option<Value>> {
    let definition = session.definition;
    let intent = session.intent;
    let create_op = definition.create_op.as_deref().ok_or_else(|| {
        EngineError::config(format!(
            "{} cannot be created: no create_op is defined",
            definition.resource_type()
        ))
    })?;

    // Path parameters of nested endpoints take the UUID of a referenced resource.
    let path_fields: Vec<&str> = definition.create_path_params.values().map(String::as_str).collect();
    resolve_sources(&mut session.resolver, intent, &path_fields, None)?;
    let mut path_params = Vec::with_capacity(definition.create_path_params.len());
    for (placeholder, field) in &definition.create_path_params {
        if intent.field(field).is_none() {
            return Err(EngineError::config(format!(
                "parameter '{field}' is required to create the {}",
                definition.resource_type()
            )));
        }
        let id = if intent.resolvers.contains_key(field) {
            resolve_id(&mut session.resolver, intent, field)?
        } else {
            intent.field_str(field).ok_or_else(|| {
                EngineError::config(format!("parameter '{field}' must be a scalar"))
            })?
        };
        path_params.push((placeholder.as_str(), id));
    }

    let fields: Vec<&str> = if definition.create_fields.is_empty() {
        intent.fields.keys().map(String::as_str).collect()
    } else {
        definition.create_fields.iter().map(String::as_str).collect()
    };
    let body = Value::Object(session.resolve_fields(&fields)?);

    let params: Vec<(&str, &str)> = path_params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let path = expand_path(create_op, &params)?;
    let command = PlannedCommand::new("POST", path, format!("Create {}", session.subject()))
        .with_body(body.clone());
    if !session.plan(command) {
        return Ok(None);
    }

    let created = session.api.create(create_op, &params, &body)?;
    session.changed = true;
    Ok(Some(created))
}

fn destroy(session: &mut Session<'_>, existing: &Value) -> Result<()> {
    let definition = session.definition;
    let destroy_op = definition.destroy_op.as_deref().ok_or_else(|| {
        EngineError::config(format!(
            "{} cannot be deleted: no destroy_op is defined",
            definition.resource_type()
        ))
    })?;
    let uuid = resource_uuid(existing, &session.subject())?;
    let path = expand_path(destroy_op, &[("uuid", uuid.as_str())])?;
    if !session.plan(PlannedCommand::new("DELETE", path, format!("Delete {}", session.subject()))) {
        return Ok(());
    }

    session.api.destroy(destroy_op, &uuid)?;
    session.changed = true;
    Ok(())
}
