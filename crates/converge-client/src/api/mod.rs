//! Logical API operations used by the reconciliation engine.

mod orders;
mod resources;

pub use orders::{ORDER_DETAIL_PATH, ORDERS_PATH, OrdersApi, TERMINATE_PATH};
pub use resources::{ActionResponse, ResourceApi};
