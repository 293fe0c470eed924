//! Updates applied through resource action endpoints.
//!
//! Some fields cannot be PATCHed; the API exposes a dedicated action instead
//! (`/api/openstack-instances/{uuid}/update_security_groups/`). An action runs
//! only when the resolved value differs from the observed one. Lists compare
//! without regard to order.

use converge_client::expand_path;
use converge_config::UpdateAction;
use serde_json::{Map, Value};

use super::{Session, resource_uuid};
use crate::error::{EngineError, Result};
use crate::existence::resolve_sources;
use crate::outcome::PlannedCommand;
use crate::poll::{PollStatus, poll_until};

/// Run every configured action whose parameter was supplied and differs.
///
/// Returns the resource as it stands afterwards, or `None` if it went away
/// while an accepted action was being waited on.
pub(crate) fn apply(session: &mut Session<'_>, existing: Value) -> Result<Option<Value>> {
    let definition = session.definition;
    let intent = session.intent;
    let mut resource = existing;
    let mut refetch = false;

    for (name, action) in &definition.update_actions {
        let Some(value) = intent.field(&action.param) else {
            continue;
        };
        resolve_sources(&mut session.resolver, intent, &[action.param.as_str()], Some(&resource))?;
        let desired = session
            .resolver
            .resolve_value(&action.param, value, &intent.resolvers)
            .map_err(|e| EngineError::resolving(&action.param, e))?;
        let observed = resource.get(action.compare_key()).cloned().unwrap_or(Value::Null);
        if !differs(&desired, &observed, &action.idempotency_keys) {
            tracing::debug!(action = %name, "action target already in desired state");
            continue;
        }

        let uuid = resource_uuid(&resource, &session.subject())?;
        let payload = payload(action, desired);
        let path = expand_path(&action.path, &[("uuid", uuid.as_str())])?;
        let command = PlannedCommand::new(
            "POST",
            path,
            format!("Run {name} on {}", session.subject()),
        )
        .with_body(payload.clone());
        if !session.plan(command) {
            continue;
        }

        let response = session.api.action(&action.path, &uuid, &payload)?;
        session.changed = true;
        if response.is_accepted() && intent.wait.wait {
            match wait_for_state(session, name, &uuid)? {
                Some(current) => resource = current,
                None => return Ok(None),
            }
        } else {
            refetch = true;
        }
    }

    if refetch {
        let uuid = resource_uuid(&resource, &session.subject())?;
        resource = session.api.retrieve(&definition.retrieve_op(), &uuid)?;
    }
    Ok(Some(resource))
}

fn payload(action: &UpdateAction, desired: Value) -> Value {
    if !action.wrap_in_object {
        return desired;
    }
    let mut wrapped = Map::new();
    wrapped.insert(action.param.clone(), desired);
    Value::Object(wrapped)
}

/// Whether the observed value has to change to match the desired one.
pub(crate) fn differs(desired: &Value, observed: &Value, idempotency_keys: &[String]) -> bool {
    // Observed relations are often rich objects while the desired value is a
    // list of URLs; compare URL to URL.
    let observed = match (desired, observed) {
        (Value::Array(want), Value::Array(have))
            if want.first().is_some_and(|v| !v.is_object())
                && have.first().is_some_and(Value::is_object) =>
        {
            Value::Array(have.iter().filter_map(|item| item.get("url").cloned()).collect())
        }
        _ => observed.clone(),
    };
    normalize(desired, idempotency_keys) != normalize(&observed, idempotency_keys)
}

/// Order-insensitive form of a list. Objects are reduced to their
/// identity keys; lists that cannot be reduced are returned unchanged.
fn normalize(value: &Value, idempotency_keys: &[String]) -> Value {
    let Value::Array(items) = value else {
        return value.clone();
    };
    let by_identity = !idempotency_keys.is_empty() && items.first().is_some_and(Value::is_object);

    let mut forms = Vec::with_capacity(items.len());
    for item in items {
        let form = match item {
            Value::Object(map) if by_identity => {
                let identity: Map<String, Value> = idempotency_keys
                    .iter()
                    .map(|key| (key.clone(), map.get(key).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(identity).to_string()
            }
            Value::Object(_) | Value::Array(_) => return value.clone(),
            scalar if !by_identity => scalar.to_string(),
            _ => return value.clone(),
        };
        forms.push(form);
    }
    forms.sort();
    forms.dedup();
    Value::Array(forms.into_iter().map(Value::String).collect())
}

/// Poll the resource until it reaches an ok state. `None` means it was
/// deleted in the meantime.
fn wait_for_state(session: &Session<'_>, action: &str, uuid: &str) -> Result<Option<Value>> {
    let api = session.api;
    let states = &session.definition.wait;
    let retrieve_op = session.definition.retrieve_op();
    let subject = session.subject();

    poll_until(
        session.clock,
        &session.intent.wait,
        &format!("{action} on {subject}"),
        || {
            let resource = match api.retrieve(&retrieve_op, uuid) {
                Ok(resource) => resource,
                Err(e) if e.is_not_found() => return Ok(PollStatus::Ready(None)),
                Err(e) => return Err(e.into()),
            };
            let state = resource
                .get(&states.state_field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if states.ok_states.contains(&state) {
                return Ok(PollStatus::Ready(Some(resource)));
            }
            if states.erred_states.contains(&state) {
                return Err(EngineError::OrderFailed {
                    state,
                    message: format!("{action} left {subject} in an error state"),
                });
            }
            Ok(PollStatus::Pending(state))
        },
    )
}
