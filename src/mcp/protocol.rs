//! JSON-RPC 2.0 envelopes for the server side of MCP.
//!
//! Ids and error objects come from `rust_mcp_schema`; the envelopes stay
//! local because a response to an unparseable message carries `"id": null`.

use rust_mcp_schema::{RequestId, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;

/// An incoming request or notification. Notifications carry no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// `None` serializes as `null`, used when the request id is unknown.
    pub id: Option<RequestId>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

pub fn parse_error(detail: &str) -> RpcError {
    RpcError {
        code: PARSE_ERROR,
        message: format!("Parse error: {detail}"),
        data: None,
    }
}

pub fn invalid_request(detail: &str) -> RpcError {
    RpcError {
        code: INVALID_REQUEST,
        message: format!("Invalid request: {detail}"),
        data: None,
    }
}

/// Parses one message. Requests that fail to parse but still expose an id
/// get that id back on the error.
pub fn parse_request(raw: &str) -> Result<Request, (Option<RequestId>, RpcError)> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| (None, parse_error(&err.to_string())))?;
    let id: Option<RequestId> = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value(id).ok());
    let request: Request = serde_json::from_value(value)
        .map_err(|err| (id.clone(), invalid_request(&err.to_string())))?;
    if request.jsonrpc != JSONRPC_VERSION {
        let detail = format!("unsupported jsonrpc version {}", request.jsonrpc);
        return Err((id, invalid_request(&detail)));
    }
    Ok(request)
}
