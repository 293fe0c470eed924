//! Marketplace orders API.
//!
//! Order-managed resources are created through a type-specific order but
//! terminated through one polymorphic endpoint.

use reqwest::Method;
use serde_json::Value;

use crate::client::{ApiClient, expand_path};
use crate::error::Result;

/// Collection endpoint for submitting orders.
pub const ORDERS_PATH: &str = "/api/marketplace-orders/";

/// Detail endpoint for polling an order.
pub const ORDER_DETAIL_PATH: &str = "/api/marketplace-orders/{uuid}/";

/// Generic termination endpoint for marketplace resources.
pub const TERMINATE_PATH: &str = "/api/marketplace-resources/{uuid}/terminate/";

/// Orders API client.
pub struct OrdersApi {
    client: ApiClient,
}

impl OrdersApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Submit a new order.
    pub fn create(&self, body: &Value) -> Result<Value> {
        let order = self.client.send(Method::POST, ORDERS_PATH, &[], Some(body))?;
        Ok(order.unwrap_or(Value::Null))
    }

    /// Fetch the current representation of an order.
    pub fn poll(&self, order_uuid: &str) -> Result<Value> {
        let path = expand_path(ORDER_DETAIL_PATH, &[("uuid", order_uuid)])?;
        let order = self.client.send(Method::GET, &path, &[], None)?;
        Ok(order.unwrap_or(Value::Null))
    }

    /// Request termination of a marketplace resource.
    pub fn terminate(&self, resource_uuid: &str, body: &Value) -> Result<Value> {
        let path = expand_path(TERMINATE_PATH, &[("uuid", resource_uuid)])?;
        let response = self.client.send(Method::POST, &path, &[], Some(body))?;
        Ok(response.unwrap_or(Value::Null))
    }
}
