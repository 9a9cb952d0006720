//! MCP method routing on top of the tool dispatcher.

use crate::core::clock::Clock;
use crate::core::failures::FailureTracker;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::{parse_request, Request, Response};
use crate::tools::ToolContext;
use rust_mcp_schema::{
    CallToolRequestParams, Implementation, InitializeResult, ListToolsResult, RpcError,
    ServerCapabilities, ServerCapabilitiesTools, LATEST_PROTOCOL_VERSION,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "oneagent-mcp";

/// One protocol endpoint: owns a dispatcher and with it a failure tracker.
pub struct McpHandler {
    dispatcher: Dispatcher,
}

impl McpHandler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Builds a handler with its own failure tracker.
    pub fn for_context(ctx: ToolContext, clock: Arc<dyn Clock>) -> Self {
        Self::new(Dispatcher::new(ctx, Arc::new(FailureTracker::new(clock))))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handles one raw message. Returns `None` for notifications.
    pub async fn handle_message(&self, raw: &str) -> Option<Response> {
        match parse_request(raw) {
            Ok(request) => self.handle_request(request).await,
            Err((id, err)) => {
                warn!(error = %err.message, "Rejected malformed message");
                Some(Response::error(id, err))
            }
        }
    }

    pub async fn handle_request(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "Notification received");
            return None;
        };
        let params = request.params.unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => self.initialize(&params),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await,
            other => {
                warn!(method = %other, "Unknown method");
                Err(RpcError::method_not_found()
                    .with_message(&format!("Method not found: {other}")))
            }
        };
        Some(match result {
            Ok(value) => Response::success(id, value),
            Err(err) => Response::error(Some(id), err),
        })
    }

    fn initialize(&self, params: &Value) -> Result<Value, RpcError> {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(LATEST_PROTOCOL_VERSION)
            .to_string();
        info!(protocol = %protocol_version, "Client initialized");
        to_value(&InitializeResult {
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools::default()),
                ..ServerCapabilities::default()
            },
            instructions: Some(
                "Configure the server with config_set before using the theme, upload or document tools."
                    .to_string(),
            ),
            meta: None,
            protocol_version,
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("OneAgent MCP Server".to_string()),
                description: Some(
                    "Organization theming, file upload and document tools for OneAgent".to_string(),
                ),
                icons: Vec::new(),
                website_url: None,
            },
        })
    }

    fn list_tools(&self) -> Result<Value, RpcError> {
        to_value(&ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: self.dispatcher.list_tools(),
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, RpcError> {
        let params: CallToolRequestParams =
            serde_json::from_value(params).map_err(|err| {
                RpcError::invalid_params().with_message(&format!("Invalid params: {err}"))
            })?;
        debug!(tool = %params.name, "tools/call");
        let result = self.dispatcher.invoke(&params.name, params.arguments).await;
        to_value(&result)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|err| RpcError::internal_error().with_message(&format!("Internal error: {err}")))
}

/// Encodes a response as a single line of JSON.
pub fn encode_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        let fallback = Response::error(
            response.id.clone(),
            RpcError::internal_error().with_message(&format!("Internal error: {err}")),
        );
        serde_json::to_string(&fallback).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#
                .to_string()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use crate::core::config::{ConfigStore, EnvOverrides};
    use crate::core::pdf::PopplerInspector;
    use crate::core::upload::tests::FakeRemote;
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> McpHandler {
        let ctx = ToolContext::new(
            Arc::new(ConfigStore::new(
                dir.path().join("config.toml"),
                EnvOverrides::default(),
            )),
            Arc::new(FakeRemote::default()),
            Arc::new(PopplerInspector),
        );
        McpHandler::for_context(ctx, Arc::new(SystemClock))
    }

    async fn roundtrip(handler: &McpHandler, raw: Value) -> Value {
        let response = handler
            .handle_message(&raw.to_string())
            .await
            .expect("response");
        serde_json::to_value(response).expect("encode")
    }

    #[tokio::test]
    async fn initialize_advertises_tools() {
        let dir = TempDir::new().expect("tempdir");
        let handler = handler(&dir);
        let response = roundtrip(
            &handler,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1"}
            }}),
        )
        .await;
        assert_eq!(response["result"]["protocolVersion"], json!("2025-06-18"));
        assert_eq!(response["result"]["serverInfo"]["name"], json!(SERVER_NAME));
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let dir = TempDir::new().expect("tempdir");
        let handler = handler(&dir);
        let raw = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(handler.handle_message(&raw.to_string()).await.is_none());
    }

    #[tokio::test]
    async fn tools_list_and_call_use_the_dispatcher() {
        let dir = TempDir::new().expect("tempdir");
        let handler = handler(&dir);

        let listed = roundtrip(
            &handler,
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}),
        )
        .await;
        let tools = listed["result"]["tools"].as_array().expect("tools");
        assert_eq!(tools.len(), 10);
        assert_eq!(tools[0]["name"], json!("update_organization_theme"));
        assert!(tools[0]["inputSchema"]["properties"]["themeTokens"].is_object());

        let called = roundtrip(
            &handler,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "upload_file",
                "arguments": {"filePath": "/tmp/x.txt"}
            }}),
        )
        .await;
        assert_eq!(called["id"], json!(2));
        assert_eq!(called["result"]["isError"], json!(true));
        let text = called["result"]["content"][0]["text"].as_str().expect("text");
        assert!(text.contains("config_set"));
    }

    #[tokio::test]
    async fn protocol_errors_use_json_rpc_codes() {
        let dir = TempDir::new().expect("tempdir");
        let handler = handler(&dir);

        let unknown = roundtrip(
            &handler,
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
        )
        .await;
        assert_eq!(unknown["error"]["code"], json!(-32601));

        let bad_params = roundtrip(
            &handler,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"arguments": {}}}),
        )
        .await;
        assert_eq!(bad_params["error"]["code"], json!(-32602));

        let garbage = handler.handle_message("not json").await.expect("response");
        assert_eq!(garbage.id, None);
        assert_eq!(garbage.error.map(|err| err.code), Some(crate::mcp::protocol::PARSE_ERROR));
    }
}
