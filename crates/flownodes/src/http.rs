use async_trait::async_trait;
use flowcore::{Config, Node, NodeContext, NodeError, NodeOutput};
use flowruntime::{NodeFactory, NodeMetadata};
use serde_json::json;

/// HTTP request node
///
/// Config: `url` (required), `method` (default GET), `headers` (object of
/// strings) and `body` (JSON, sent for POST/PUT). A non-2xx response is a
/// `FAIL` result; an abort request drops the in-flight request.
pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, ctx: &NodeContext) -> Result<reqwest::RequestBuilder, NodeError> {
        let url = ctx.require_str("url")?;
        let method_value = ctx.get_config_or("method", json!("GET"));
        let method = method_value.as_str().unwrap_or("GET");

        ctx.events.info(format!("{} {}", method, url));

        let body = ctx.config().get("body");
        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "DELETE" => self.client.delete(url),
            "POST" => with_body(self.client.post(url), body),
            "PUT" => with_body(self.client.put(url), body),
            _ => return Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
        };

        // Add headers if provided
        let request = match ctx.config().get("headers").and_then(|h| h.as_object()) {
            Some(headers) => headers.iter().fold(request, |req, (key, value)| match value.as_str() {
                Some(val_str) => req.header(key, val_str),
                None => req,
            }),
            None => request,
        };
        Ok(request)
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

fn with_body(
    request: reqwest::RequestBuilder,
    body: Option<&serde_json::Value>,
) -> reqwest::RequestBuilder {
    match body {
        Some(serde_json::Value::String(text)) => request.body(text.clone()),
        Some(json) => request.json(json),
        None => request,
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    fn node_type(&self) -> &str {
        "http.request"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let request = self.build_request(&ctx)?;

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            let headers: serde_json::Map<String, serde_json::Value> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or(""))))
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| {
                    NodeError::ExecutionFailed(format!("Failed to read response: {}", e))
                })?;
            Ok::<_, NodeError>((status, headers, body))
        };

        let (status, headers, body) = tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                return Ok(NodeOutput::aborted_with_message("HTTP request aborted"));
            }
            result = exchange => result?,
        };

        ctx.events.info(format!("Response status: {}", status));

        let data = json!({
            "status": status.as_u16(),
            "body": body,
            "headers": headers,
        });
        if status.is_success() {
            Ok(NodeOutput::pass(data))
        } else {
            Ok(NodeOutput::fail(data))
        }
    }
}

pub struct HttpRequestNodeFactory;

impl NodeFactory for HttpRequestNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn Node>, NodeError> {
        if !config.get("url").is_some_and(|v| v.is_string()) {
            return Err(NodeError::MissingConfig("url".to_string()));
        }
        Ok(Box::new(HttpRequestNode::new()))
    }

    fn node_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}
