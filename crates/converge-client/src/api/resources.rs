//! The `ResourceApi` capability and its HTTP implementation.

use reqwest::Method;
use serde_json::Value;

use crate::Query;
use crate::client::{ApiClient, expand_path};
use crate::error::{Error, Result};

/// Response of a resource action endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    /// HTTP status of the success response.
    pub status: u16,
    /// Decoded body, if any.
    pub body: Option<Value>,
}

impl ActionResponse {
    /// The server accepted the action and finishes it in the background.
    pub fn is_accepted(&self) -> bool {
        self.status == 202
    }
}

/// Remote operations the reconciliation engine depends on.
///
/// `op` arguments are path templates taken from module definitions. Detail
/// templates carry a `{uuid}` placeholder; create templates may carry
/// additional placeholders for nested endpoints.
pub trait ResourceApi {
    /// List resources matching the query.
    fn list(&self, op: &str, query: &Query) -> Result<Vec<Value>>;

    /// Retrieve a single resource by UUID.
    fn retrieve(&self, op: &str, uuid: &str) -> Result<Value>;

    /// Create a resource.
    fn create(&self, op: &str, path_params: &[(&str, &str)], body: &Value) -> Result<Value>;

    /// Partially update a resource.
    fn update(&self, op: &str, uuid: &str, body: &Value) -> Result<Value>;

    /// Delete a resource.
    fn destroy(&self, op: &str, uuid: &str) -> Result<()>;

    /// POST to an action endpoint of a resource.
    fn action(&self, op: &str, uuid: &str, body: &Value) -> Result<ActionResponse>;

    /// Submit a marketplace order.
    fn order_create(&self, body: &Value) -> Result<Value>;

    /// Fetch an order by UUID.
    fn order_poll(&self, order_uuid: &str) -> Result<Value>;

    /// Terminate a marketplace resource.
    fn terminate(&self, resource_uuid: &str, body: &Value) -> Result<Value>;
}

impl ResourceApi for ApiClient {
    fn list(&self, op: &str, query: &Query) -> Result<Vec<Value>> {
        match self.send(Method::GET, op, query, None)? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(Error::UnexpectedResponse {
                url: op.to_string(),
                message: format!("expected a JSON array, got {}", json_kind(&other)),
            }),
        }
    }

    fn retrieve(&self, op: &str, uuid: &str) -> Result<Value> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        match self.send(Method::GET, &path, &[], None)? {
            Some(value) => Ok(value),
            None => Err(Error::UnexpectedResponse {
                url: path,
                message: "empty body".to_string(),
            }),
        }
    }

    fn create(&self, op: &str, path_params: &[(&str, &str)], body: &Value) -> Result<Value> {
        let path = expand_path(op, path_params)?;
        let created = self.send(Method::POST, &path, &[], Some(body))?;
        Ok(created.unwrap_or(Value::Null))
    }

    fn update(&self, op: &str, uuid: &str, body: &Value) -> Result<Value> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        let updated = self.send(Method::PATCH, &path, &[], Some(body))?;
        Ok(updated.unwrap_or(Value::Null))
    }

    fn destroy(&self, op: &str, uuid: &str) -> Result<()> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        self.send(Method::DELETE, &path, &[], None)?;
        Ok(())
    }

    fn action(&self, op: &str, uuid: &str, body: &Value) -> Result<ActionResponse> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        let (status, body) = self.send_with_status(Method::POST, &path, &[], Some(body))?;
        Ok(ActionResponse { status, body })
    }

    fn order_create(&self, body: &Value) -> Result<Value> {
        self.orders().create(body)
    }

    fn order_poll(&self, order_uuid: &str) -> Result<Value> {
        self.orders().poll(order_uuid)
    }

    fn terminate(&self, resource_uuid: &str, body: &Value) -> Result<Value> {
        self.orders().terminate(resource_uuid, body)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
