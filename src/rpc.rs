//! JSON RPC types for the PHD2 wire protocol

use serde::{Deserialize, Serialize};

/// JSON RPC request sent to PHD2
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub id: u64,
}

impl RpcRequest {
    /// Build a request, normalizing `params` the way PHD2 expects:
    /// absent stays absent, a bare scalar becomes a one-element array,
    /// arrays and objects pass through unchanged.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params: params.map(normalize_params),
            id,
        }
    }
}

fn normalize_params(params: serde_json::Value) -> serde_json::Value {
    match params {
        v @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => v,
        scalar => serde_json::Value::Array(vec![scalar]),
    }
}

/// JSON RPC response from PHD2
///
/// Any line carrying the `jsonrpc` envelope marker and an `id` is a
/// reply to one of our calls; everything else on the socket is an event.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    pub id: u64,
}

/// JSON RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}
