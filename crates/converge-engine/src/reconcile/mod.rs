//! Reconciliation strategies and the engine entry point.

mod actions;
mod crud;
mod facts;
mod order;

pub use order::OrderState;

use std::collections::BTreeMap;

use converge_client::{ResourceApi, expand_path};
use converge_config::{ModuleDefinition, ModuleKind};
use serde_json::{Map, Value};

use crate::changes::detect_changes;
use crate::error::{EngineError, Result};
use crate::existence::{ExistenceResult, check_existence, resolve_sources};
use crate::intent::ResourceIntent;
use crate::outcome::{Outcome, PlannedCommand};
use crate::poll::{Clock, SystemClock};
use crate::resolver::ReferenceResolver;

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// How a module drives its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Direct create, update and delete endpoints.
    Sync,
    /// Marketplace orders, polled to completion.
    Order,
    /// Read-only lookup.
    Facts,
}

impl Strategy {
    pub fn for_kind(kind: ModuleKind) -> Self {
        match kind {
            ModuleKind::Crud => Strategy::Sync,
            ModuleKind::Order => Strategy::Order,
            ModuleKind::Facts => Strategy::Facts,
        }
    }

    fn execute(self, session: &mut Session<'_>) -> Result<Option<Value>> {
        match self {
            Strategy::Sync => crud::reconcile(session),
            Strategy::Order => order::reconcile(session),
            Strategy::Facts => facts::reconcile(session),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Sync => f.write_str("sync"),
            Strategy::Order => f.write_str("order"),
            Strategy::Facts => f.write_str("facts"),
        }
    }
}

/// Drives resources toward their declared state.
pub struct Engine<'a> {
    api: &'a dyn ResourceApi,
    clock: &'a dyn Clock,
}

impl<'a> Engine<'a> {
    pub fn new(api: &'a dyn ResourceApi) -> Self {
        Self {
            api,
            clock: &SYSTEM_CLOCK,
        }
    }

    /// Use a different time source for polling.
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Reconcile one resource. Failures are reported in [`Outcome::error`].
    pub fn reconcile(&self, definition: &ModuleDefinition, intent: &ResourceIntent) -> Outcome {
        let (session, result) = self.drive(definition, intent);
        let (resource, error) = match result {
            Ok(resource) => (resource, None),
            Err(e) => (None, Some(e.descriptor())),
        };
        session.into_outcome(resource, error)
    }

    /// Reconcile one resource, returning failures as typed errors.
    pub fn try_reconcile(
        &self,
        definition: &ModuleDefinition,
        intent: &ResourceIntent,
    ) -> Result<Outcome> {
        let (session, result) = self.drive(definition, intent);
        let resource = result?;
        Ok(session.into_outcome(resource, None))
    }

    fn drive<'s>(
        &'s self,
        definition: &'s ModuleDefinition,
        intent: &'s ResourceIntent,
    ) -> (Session<'s>, Result<Option<Value>>) {
        let strategy = Strategy::for_kind(definition.kind);
        let span = tracing::info_span!(
            "reconcile",
            resource = definition.resource_type(),
            %strategy,
            state = %intent.state,
            check_mode = intent.check_mode,
        );
        let _guard = span.enter();

        let mut session = Session::new(self.api, self.clock, definition, intent);
        let result = intent.validate().and_then(|()| strategy.execute(&mut session));
        match &result {
            Ok(_) => tracing::info!(changed = session.changed, "reconciled"),
            Err(e) => tracing::warn!(error = %e, changed = session.changed, "reconciliation failed"),
        }
        (session, result)
    }
}

/// State shared by the strategies during one run.
pub(crate) struct Session<'a> {
    pub(crate) api: &'a dyn ResourceApi,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) definition: &'a ModuleDefinition,
    pub(crate) intent: &'a ResourceIntent,
    pub(crate) resolver: ReferenceResolver<'a>,
    pub(crate) changed: bool,
    pub(crate) order_uuid: Option<String>,
    commands: Vec<PlannedCommand>,
}

impl<'a> Session<'a> {
    fn new(
        api: &'a dyn ResourceApi,
        clock: &'a dyn Clock,
        definition: &'a ModuleDefinition,
        intent: &'a ResourceIntent,
    ) -> Self {
        Self {
            api,
            clock,
            definition,
            intent,
            resolver: ReferenceResolver::new(api),
            changed: false,
            order_uuid: None,
            commands: Vec::new(),
        }
    }

    fn into_outcome(self, resource: Option<Value>, error: Option<crate::ErrorDescriptor>) -> Outcome {
        Outcome {
            changed: self.changed,
            resource,
            order_uuid: self.order_uuid,
            error,
            commands: self.commands,
        }
    }

    /// "project 'proj-a'", or just the resource type when unnamed.
    pub(crate) fn subject(&self) -> String {
        let kind = self.definition.resource_type();
        match self.intent.field_str("name") {
            Some(name) => format!("{kind} '{name}'"),
            None => kind.to_string(),
        }
    }

    /// The unique existing resource, if any.
    pub(crate) fn existing(&mut self) -> Result<Option<Value>> {
        match check_existence(self.api, &mut self.resolver, self.definition, self.intent)? {
            ExistenceResult::Found(resource) => Ok(Some(resource)),
            ExistenceResult::NotFound => Ok(None),
            ExistenceResult::Ambiguous(count) => Err(EngineError::Ambiguous {
                subject: self.subject(),
                count,
            }),
        }
    }

    /// Supplied values of `fields` with every reference resolved to URL form.
    ///
    /// References run in resolver order so dependency filters see their
    /// sources.
    pub(crate) fn resolve_fields(&mut self, fields: &[&str]) -> Result<Map<String, Value>> {
        let intent = self.intent;
        resolve_sources(&mut self.resolver, intent, fields, None)?;
        let mut out = Map::new();
        let ordered = intent.ordered_references(fields);
        let rest = fields.iter().copied().filter(|f| !ordered.contains(f));

        for field in ordered.iter().copied().chain(rest) {
            let Some(value) = intent.field(field) else {
                continue;
            };
            let resolved = self
                .resolver
                .resolve_value(field, value, &intent.resolvers)
                .map_err(|e| EngineError::resolving(field, e))?;
            out.insert(field.to_string(), resolved);
        }
        Ok(out)
    }

    /// Record a mutating call. Returns whether it should be executed.
    pub(crate) fn plan(&mut self, command: PlannedCommand) -> bool {
        tracing::info!(
            method = %command.method,
            path = %command.path,
            check_mode = self.intent.check_mode,
            "{}",
            command.description
        );
        self.commands.push(command);
        if self.intent.check_mode {
            self.changed = true;
            return false;
        }
        true
    }

    /// Bring an existing resource in line: PATCH first, then actions.
    pub(crate) fn update(&mut self, existing: Value) -> Result<Option<Value>> {
        let patched = self.apply_updates(existing)?;
        actions::apply(self, patched)
    }

    /// PATCH the tracked fields that differ from `existing`.
    pub(crate) fn apply_updates(&mut self, existing: Value) -> Result<Value> {
        let definition = self.definition;
        let intent = self.intent;
        let Some(update_op) = definition.update_op.as_deref() else {
            return Ok(existing);
        };

        let supplied: Vec<&str> = definition
            .update_check_fields
            .iter()
            .map(String::as_str)
            .filter(|field| intent.field(field).is_some())
            .collect();
        if supplied.is_empty() {
            return Ok(existing);
        }
        resolve_sources(&mut self.resolver, intent, &supplied, Some(&existing))?;

        let mut references = BTreeMap::new();
        for field in intent.ordered_references(&supplied) {
            if let Some(value) = intent.field(field) {
                let ids = self
                    .resolver
                    .canonical_ids(field, value, &intent.resolvers[field])
                    .map_err(|e| EngineError::resolving(field, e))?;
                references.insert(field.to_string(), ids);
            }
        }

        let changed = detect_changes(
            &existing,
            &intent.fields,
            &definition.update_check_fields,
            &references,
        );
        if changed.is_empty() {
            tracing::debug!("resource is up to date");
            return Ok(existing);
        }

        let changed_refs: Vec<&str> = changed.iter().map(String::as_str).collect();
        let payload = Value::Object(self.resolve_fields(&changed_refs)?);
        let uuid = resource_uuid(&existing, &self.subject())?;
        let path = expand_path(update_op, &[("uuid", uuid.as_str())])?;
        let command = PlannedCommand::new(
            "PATCH",
            path,
            format!("Update {} ({})", self.subject(), changed.join(", ")),
        )
        .with_body(payload.clone());
        if !self.plan(command) {
            return Ok(existing);
        }

        let updated = self.api.update(update_op, &uuid, &payload)?;
        self.changed = true;
        Ok(merge_object(existing, updated))
    }
}

/// UUID of an observed resource.
pub(crate) fn resource_uuid(resource: &Value, subject: &str) -> Result<String> {
    resource
        .get("uuid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Transport(format!("{subject} was returned without a uuid")))
}

fn merge_object(mut base: Value, update: Value) -> Value {
    if let (Some(base), Value::Object(update)) = (base.as_object_mut(), update) {
        base.extend(update);
    }
    base
}
