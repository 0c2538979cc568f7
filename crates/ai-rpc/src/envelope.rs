//! The flat request/response envelope the host RPC surface exchanges
//! (spec §4.F, §6). `sql` carries the JSON-encoded method params regardless
//! of method (the field name is a legacy artifact of the host's original
//! "run a query" RPC); `config` is reserved for `generate`'s optional
//! runtime provider override.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct RawRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub key: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawResponse {
    pub success: String,
    pub content: Value,
    pub meta: Value,
    pub error: Option<String>,
}

impl RawResponse {
    pub fn success(content: Value, meta: Value) -> Self {
        Self {
            success: "true".to_string(),
            content,
            meta,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, meta: Value) -> Self {
        Self {
            success: "false".to_string(),
            content: Value::Null,
            meta,
            error: Some(message.into()),
        }
    }
}
