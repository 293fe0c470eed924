//! Reconciliation engine for declaratively managed remote resources.
//!
//! Given a [`ResourceIntent`] and the static [`ModuleDefinition`] of its
//! resource type, the engine:
//!
//! 1. resolves human-friendly references (names, UUIDs) into canonical
//!    identifiers ([`resolver`]),
//! 2. decides whether the resource already exists ([`existence`]),
//! 3. drives it toward the declared state with the strategy matching the
//!    module kind ([`reconcile`]): plain CRUD calls, the marketplace order
//!    workflow, or a read-only lookup.
//!
//! Every run is a single blocking sequence of API calls. Nothing is cached
//! across runs.
//!
//! # Example
//!
//! ```no_run
//! use converge_client::ApiClient;
//! use converge_config::load_config;
//! use converge_engine::{Engine, ResourceIntent};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let loaded = load_config(None)?;
//! let module = loaded.config.module("project")?;
//! let client = ApiClient::builder()
//!     .base_url("https://waldur.example.com")
//!     .token("secret")
//!     .build()?;
//!
//! let params = serde_json::json!({"name": "proj-a", "customer": "Acme"});
//! let intent = ResourceIntent::from_params(module, params)?;
//! let outcome = Engine::new(&client).reconcile(module, &intent);
//! println!("changed: {}", outcome.changed);
//! # Ok(())
//! # }
//! ```
//!
//! [`ModuleDefinition`]: converge_config::ModuleDefinition

pub mod changes;
pub mod error;
pub mod existence;
pub mod intent;
pub mod outcome;
pub mod poll;
pub mod reconcile;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

pub use changes::detect_changes;
pub use error::{EngineError, ErrorDescriptor, Result};
pub use existence::ExistenceResult;
pub use intent::{DesiredState, ResourceIntent, WaitPolicy};
pub use outcome::{Outcome, PlannedCommand};
pub use poll::{Clock, PollStatus, SystemClock};
pub use reconcile::{Engine, OrderState, Strategy};
pub use resolver::{ReferenceResolver, ResolvedValue};
