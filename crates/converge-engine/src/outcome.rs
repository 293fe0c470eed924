//! Reconciliation results.

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorDescriptor;

/// A mutating API call, recorded whether or not it was executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedCommand {
    pub method: String,
    pub path: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl PlannedCommand {
    pub fn new(method: &str, path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            path: path.into(),
            description: description.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    /// Whether anything was (or, in check mode, would be) mutated.
    pub changed: bool,
    /// Final observed resource; `null` when absent or unknown.
    pub resource: Option<Value>,
    /// Order submitted during this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
    /// Mutating calls in the order they were planned.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<PlannedCommand>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let outcome = Outcome {
            changed: true,
            resource: None,
            commands: vec![
                PlannedCommand::new("DELETE", "/api/keys/k1/", "Delete key 'deploy'"),
            ],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "changed": true,
                "resource": null,
                "commands": [{
                    "method": "DELETE",
                    "path": "/api/keys/k1/",
                    "description": "Delete key 'deploy'",
                }],
            })
        );
        assert!(outcome.is_success());
    }
}
