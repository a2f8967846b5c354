// SPDX-FileCopyrightText: © 2025 FlowKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! HTTP request node.
//!
//! Performs one request per sequential-phase invocation. The URL, headers,
//! and body typically come from templates referencing upstream outputs.

use async_trait::async_trait;
use flowkit_core::{
    FieldSchema, FlowKitError, Node, PortSchema, PrimitiveType, Result, WorkflowContext,
    WorkflowNode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::time::Duration;

pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FlowKitError::Runtime(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WorkflowNode for HttpRequestNode {
    fn output_ports(&self) -> IndexMap<String, PortSchema> {
        IndexMap::from([(
            "response".to_string(),
            PortSchema::value_record([
                ("status", FieldSchema::of(PrimitiveType::Integer)),
                ("body", FieldSchema::of(PrimitiveType::Any)),
            ]),
        )])
    }

    fn config_fields(&self) -> IndexMap<String, FieldSchema> {
        IndexMap::from([
            ("url".to_string(), FieldSchema::required(PrimitiveType::String)),
            (
                "method".to_string(),
                FieldSchema::with_default(PrimitiveType::String, json!("GET")),
            ),
            (
                "headers".to_string(),
                FieldSchema::with_default(PrimitiveType::Dict, json!({})),
            ),
            ("body".to_string(), FieldSchema::of(PrimitiveType::Any)),
            (
                "timeout_secs".to_string(),
                FieldSchema::with_default(PrimitiveType::Integer, json!(30)),
            ),
        ])
    }

    async fn run(&self, node: &Node, ctx: &WorkflowContext) -> Result<Option<Value>> {
        let url = node
            .get_config("url")
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| FlowKitError::Runtime("http request is missing 'url'".to_string()))?;
        let method = node
            .get_config("method")
            .and_then(|v| v.as_str().map(str::to_uppercase))
            .unwrap_or_else(|| "GET".to_string());
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| FlowKitError::Runtime(format!("invalid HTTP method: {method}")))?;
        let timeout = node
            .get_config("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(30);

        let mut request =
            self.client.request(method, &url).timeout(Duration::from_secs(timeout));
        if let Some(headers) = node.get_config("headers").and_then(|v| {
            v.as_object().cloned()
        }) {
            for (name, value) in headers {
                let value = value.as_str().map_or_else(|| value.to_string(), String::from);
                request = request.header(name, value);
            }
        }
        if let Some(body) = node.get_config("body") {
            request = request.json(&body);
        }

        ctx.log_info(format!("http request: {url}"));
        let response = request
            .send()
            .await
            .map_err(|e| FlowKitError::Runtime(format!("http request failed: {e}")))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| FlowKitError::Runtime(format!("cannot read response body: {e}")))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        let result = json!({"status": status, "body": body});
        node.set_output_value("response", result.clone())?;
        ctx.log_info(format!("http response: {status}"));
        Ok(Some(result))
    }
}

pub(crate) fn register(registry: &mut flowkit_core::NodeRegistry) {
    registry.register("http_request", |_config| Ok(Box::new(HttpRequestNode::new()?)));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flowkit_core::ConnectionManager;
    use std::sync::Arc;

    #[test]
    fn test_url_is_required() {
        let behavior = Box::new(HttpRequestNode::new().unwrap());
        let err = Node::new(
            "fetch",
            None,
            None,
            behavior,
            Some(json!({})),
            Arc::new(ConnectionManager::new()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_defaults_applied() {
        let behavior = Box::new(HttpRequestNode::new().unwrap());
        let node = Node::new(
            "fetch",
            None,
            None,
            behavior,
            Some(json!({"url": "https://example.com"})),
            Arc::new(ConnectionManager::new()),
        )
        .unwrap();
        assert_eq!(node.get_config("method"), Some(json!("GET")));
        assert_eq!(node.get_config("timeout_secs"), Some(json!(30)));
    }
}
