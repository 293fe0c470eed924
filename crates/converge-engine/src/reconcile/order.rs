//! Marketplace order reconciliation.
//!
//! Marketplace resources are never created or deleted directly. Creation
//! submits an order and polls it until it finishes; deletion asks the
//! marketplace to terminate the resource and then waits for it to go away.
//! Updates use the plain update endpoint like any other resource.

use converge_client::{ORDERS_PATH, TERMINATE_PATH, expand_path};
use serde_json::{Map, Value, json};

use super::{Session, resource_uuid};
use crate::error::{EngineError, Result};
use crate::existence::{resolve_id, resolve_sources};
use crate::intent::DesiredState;
use crate::outcome::PlannedCommand;
use crate::poll::{PollStatus, poll_until};

/// Lifecycle state of a marketplace order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Awaiting approval (`pending-consumer`, `pending-provider`, ...).
    Pending,
    Executing,
    Done,
    Erred,
    Canceled,
    Rejected,
}

impl OrderState {
    /// Parse a remote state name. Unknown names yield `None`.
    pub fn parse(state: &str) -> Option<Self> {
        let state = state.to_ascii_lowercase();
        match state.as_str() {
            s if s.starts_with("pending") => Some(OrderState::Pending),
            "executing" => Some(OrderState::Executing),
            "done" => Some(OrderState::Done),
            "erred" => Some(OrderState::Erred),
            "canceled" | "cancelled" => Some(OrderState::Canceled),
            "rejected" => Some(OrderState::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderState::Pending | OrderState::Executing)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            OrderState::Erred | OrderState::Canceled | OrderState::Rejected
        )
    }
}

pub(crate) fn reconcile(session: &mut Session<'_>) -> Result<Option<Value>> {
    let existing = session.existing()?;
    match (session.intent.state, existing) {
        (DesiredState::Present, None) => create(session),
        (DesiredState::Present, Some(existing)) => session.update(existing),
        (DesiredState::Absent, Some(existing)) => terminate(session, &existing).map(|()| None),
        (DesiredState::Absent, None) => Ok(None),
    }
}

fn create(session: &mut Session<'_>) -> Result<Option<Value>> {
    let definition = session.definition;
    let intent = session.intent;

    let mut references = vec!["project", "offering"];
    for required in &references {
        if intent.field(required).is_none() {
            return Err(EngineError::config(format!(
                "parameter '{required}' is required to order a {}",
                definition.resource_type()
            )));
        }
    }
    if intent.field("plan").is_some() {
        references.push("plan");
    }
    let resolved = session.resolve_fields(&references)?;

    let attribute_fields: Vec<&str> = definition
        .attribute_fields
        .iter()
        .map(String::as_str)
        .filter(|f| *f != "name")
        .collect();
    let mut attributes = session.resolve_fields(&attribute_fields)?;
    if let Some(name) = intent.field("name") {
        attributes.insert("name".to_string(), name.clone());
    }

    let mut body = Map::new();
    for (key, value) in resolved {
        body.insert(key, value);
    }
    body.insert(
        "limits".to_string(),
        intent.field("limits").cloned().unwrap_or_else(|| json!({})),
    );
    body.insert("attributes".to_string(), Value::Object(attributes));
    body.insert("accepting_terms_of_service".to_string(), Value::Bool(true));
    let body = Value::Object(body);

    let command = PlannedCommand::new(
        "POST",
        ORDERS_PATH,
        format!("Order {}", session.subject()),
    )
    .with_body(body.clone());
    if !session.plan(command) {
        return Ok(None);
    }

    let order = session.api.order_create(&body)?;
    session.changed = true;
    let order_uuid = order
        .get("uuid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Transport("order was accepted without a uuid".to_string()))?;
    tracing::info!(order = %order_uuid, "order submitted");
    session.order_uuid = Some(order_uuid.clone());

    if !intent.wait.wait {
        return Ok(None);
    }

    let order = wait_for_order(session, &order_uuid)?;
    if let Some(resource) = session.existing()? {
        return Ok(Some(resource));
    }

    // Not visible by name yet; the finished order knows which resource it made.
    let retrieve_op = definition.retrieve_op();
    for key in ["resource_uuid", "marketplace_resource_uuid"] {
        let Some(uuid) = order.get(key).and_then(Value::as_str) else {
            continue;
        };
        match session.api.retrieve(&retrieve_op, uuid) {
            Ok(resource) => return Ok(Some(resource)),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
    }
    tracing::warn!(order = %order_uuid, "order completed but the resource is not visible yet");
    Ok(None)
}

fn wait_for_order(session: &Session<'_>, order_uuid: &str) -> Result<Value> {
    let api = session.api;
    poll_until(
        session.clock,
        &session.intent.wait,
        &format!("order {order_uuid}"),
        || {
            let order = api.order_poll(order_uuid)?;
            let state = order
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match OrderState::parse(&state) {
                Some(OrderState::Done) => Ok(PollStatus::Ready(order)),
                Some(parsed) if parsed.is_failure() => {
                    let message = order
                        .get("error_message")
                        .and_then(Value::as_str)
                        .filter(|m| !m.is_empty())
                        .unwrap_or("no error message was reported")
                        .to_string();
                    Err(EngineError::OrderFailed { state, message })
                }
                Some(_) => Ok(PollStatus::Pending(state)),
                None => {
                    tracing::warn!(state = %state, "unknown order state");
                    Ok(PollStatus::Pending(state))
                }
            }
        },
    )
}

fn terminate(session: &mut Session<'_>, existing: &Value) -> Result<()> {
    let definition = session.definition;
    let intent = session.intent;
    let subject = session.subject();

    let marketplace_uuid = existing
        .get("marketplace_resource_uuid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::Transport(format!(
                "{subject} has no marketplace_resource_uuid and cannot be terminated"
            ))
        })?;

    let attribute_fields: Vec<&str> = definition
        .termination_attributes
        .keys()
        .map(String::as_str)
        .collect();
    resolve_sources(&mut session.resolver, intent, &attribute_fields, Some(existing))?;
    let mut attributes = Map::new();
    for (field, key) in &definition.termination_attributes {
        if let Some(value) = intent.field(field) {
            let value = if intent.resolvers.contains_key(field) {
                Value::String(resolve_id(&mut session.resolver, intent, field)?)
            } else {
                value.clone()
            };
            attributes.insert(key.clone(), value);
        }
    }
    let body = if attributes.is_empty() {
        json!({})
    } else {
        json!({"attributes": attributes})
    };

    let path = expand_path(TERMINATE_PATH, &[("uuid", marketplace_uuid.as_str())])?;
    let command = PlannedCommand::new("POST", path, format!("Terminate {subject}")).with_body(body.clone());
    if !session.plan(command) {
        return Ok(());
    }

    let response = session.api.terminate(&marketplace_uuid, &body)?;
    session.changed = true;
    if let Some(order_uuid) = response.get("order_uuid").and_then(Value::as_str) {
        session.order_uuid = Some(order_uuid.to_string());
    }

    if intent.wait.wait {
        let uuid = resource_uuid(existing, &subject)?;
        wait_for_removal(session, &uuid)?;
    }
    Ok(())
}

/// Poll the resource until it disappears or leaves its terminating states.
fn wait_for_removal(session: &Session<'_>, uuid: &str) -> Result<()> {
    let api = session.api;
    let states = &session.definition.wait;
    let retrieve_op = session.definition.retrieve_op();

    poll_until(
        session.clock,
        &session.intent.wait,
        &format!("termination of {}", session.subject()),
        || {
            let resource = match api.retrieve(&retrieve_op, uuid) {
                Ok(resource) => resource,
                Err(e) if e.is_not_found() => return Ok(PollStatus::Ready(())),
                Err(e) => return Err(e.into()),
            };
            let state = resource
                .get(&states.state_field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if states.erred_states.contains(&state) {
                return Err(EngineError::OrderFailed {
                    state,
                    message: "resource entered an error state while terminating".to_string(),
                });
            }
            if states.terminating_states.contains(&state) {
                return Ok(PollStatus::Pending(state));
            }
            Ok(PollStatus::Ready(()))
        },
    )
}
