//! Blocking REST adapter for the converge reconciliation engine.
//!
//! The engine never talks HTTP directly. It drives a [`ResourceApi`], an
//! opaque capability exposing the logical operations a reconciliation needs:
//!
//! - **list** / **retrieve**: read-only lookups by query or by UUID
//! - **create** / **update** / **destroy** / **action**: type-specific mutations
//! - **order_create** / **order_poll** / **terminate**: the marketplace
//!   order workflow shared by every order-managed resource type
//!
//! Operation identifiers are path templates such as
//! `/api/openstack-ports/{uuid}/`, supplied by module definitions.
//!
//! # Example
//!
//! ```no_run
//! use converge_client::{ApiClient, ResourceApi, Result};
//!
//! # fn example() -> Result<()> {
//! let client = ApiClient::builder()
//!     .base_url("https://waldur.example.com")
//!     .token("secret")
//!     .build()?;
//!
//! let query = vec![("name".to_string(), "proj-a".to_string())];
//! let projects = client.list("/api/projects/", &query)?;
//! println!("found {} projects", projects.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;

pub use api::{
    ActionResponse, ORDER_DETAIL_PATH, ORDERS_PATH, OrdersApi, ResourceApi, TERMINATE_PATH,
};
pub use client::{ApiClient, ClientBuilder, expand_path};
pub use error::{Error, Result};

/// Query parameters for list calls. Keys may repeat.
pub type Query = [(String, String)];
