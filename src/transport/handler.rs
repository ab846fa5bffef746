//! Message handler collaborator.
//!
//! The gateway does not interpret protocol methods; a `MessageHandler`
//! does. `BasicHandler` is the small built-in one the server binary uses.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::session::SessionId;

/// A JSON-RPC error object returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_REQUEST: i64 = -32600;

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self { code: Self::INVALID_REQUEST, message: message.into(), data: None }
    }

    pub fn to_value(&self) -> Value {
        let mut error = json!({ "code": self.code, "message": self.message });
        if let Some(data) = &self.data {
            error["data"] = data.clone();
        }
        error
    }
}

/// What a handler knows about the channel that called it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Option<SessionId>,
    push: broadcast::Sender<Value>,
}

impl SessionContext {
    pub(crate) fn new(session: Option<SessionId>, push: broadcast::Sender<Value>) -> Self {
        Self { session, push }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Queue a server-initiated message for every open push stream.
    ///
    /// Returns the number of streams that will receive it.
    pub fn push(&self, message: Value) -> usize {
        self.push.send(message).unwrap_or(0)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.push.subscribe()
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Answer a request (a message with both `id` and `method`).
    async fn request(
        &self,
        ctx: &SessionContext,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError>;

    /// Observe a notification (a message without `id`).
    async fn notify(&self, _ctx: &SessionContext, _method: &str, _params: Value) {}
}

/// Handshake and discovery only; no tools or resources are offered.
#[derive(Debug, Clone)]
pub struct BasicHandler {
    name: String,
    version: String,
}

impl BasicHandler {
    pub const PROTOCOL_VERSION: &'static str = "2025-03-26";

    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

impl Default for BasicHandler {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl MessageHandler for BasicHandler {
    async fn request(
        &self,
        _ctx: &SessionContext,
        method: &str,
        _params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": Self::PROTOCOL_VERSION,
                "capabilities": { "tools": {}, "resources": {} },
                "serverInfo": { "name": self.name, "version": self.version },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [] })),
            "resources/list" => Ok(json!({ "resources": [] })),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}
