//! JSON-RPC 2.0 framing types for the stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Domain failures from the lifecycle engine; the taxonomy kind travels in
/// `error.data.kind`.
pub const DOMAIN_ERROR: i64 = -32000;

/// Incoming request frame
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Outgoing response frame
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Error payload inside a response frame
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing notification frame (progress events)
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: String, kind: Option<&str>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: kind.map(|k| serde_json::json!({ "kind": k })),
            }),
        }
    }
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Map a domain error to its JSON-RPC error code.
pub fn error_code(error: &Error) -> i64 {
    match error {
        Error::Validation(_) => INVALID_PARAMS,
        _ => DOMAIN_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_with_defaulted_fields() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"method": "list_templates"}"#).unwrap();
        assert_eq!(request.method, "list_templates");
        assert!(request.id.is_none());
        assert!(request.params.is_null());
    }

    #[test]
    fn test_success_response_omits_error_field() {
        let response =
            JsonRpcResponse::success(serde_json::json!(1), serde_json::json!([]));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_failure_response_carries_kind() {
        let response = JsonRpcResponse::failure(
            serde_json::json!(2),
            DOMAIN_ERROR,
            "template 'x' not found".into(),
            Some("not_found"),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], DOMAIN_ERROR);
        assert_eq!(json["error"]["data"]["kind"], "not_found");
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            error_code(&Error::validation("bad params")),
            INVALID_PARAMS
        );
        assert_eq!(error_code(&Error::NotFound("x".into())), DOMAIN_ERROR);
    }
}
