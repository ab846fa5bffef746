//! Structured error responses.
//!
//! Every failure leaving the endpoint has the JSON-RPC error shape:
//! `{ jsonrpc: "2.0", error: { code, message, data? }, id? }`.

use std::any::Any;

use axum::extract::rejection::BytesRejection;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use crate::session::{InvalidSessionId, RegistryError};
use crate::transport::TransportError;

/// Application-defined server error.
pub const SERVER_ERROR: i64 = -32000;
pub const INVALID_REQUEST: i64 = -32600;
pub const PARSE_ERROR: i64 = -32700;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Privileged call without a valid credential. Carries the request id.
    #[error("Unauthorized: Invalid or missing API key")]
    Unauthorized { id: Value },

    #[error("Session not found")]
    SessionNotFound,

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Parse error")]
    Parse(String),

    /// Drain has started; no new sessions.
    #[error("Server is shutting down")]
    Unavailable,

    #[error("Internal server error")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::SessionNotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BadRequest(_) | GatewayError::Parse(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            GatewayError::Unauthorized { .. }
            | GatewayError::SessionNotFound
            | GatewayError::MethodNotAllowed(_)
            | GatewayError::Unavailable => SERVER_ERROR,
            GatewayError::BadRequest(_) | GatewayError::PayloadTooLarge => INVALID_REQUEST,
            GatewayError::Parse(_) => PARSE_ERROR,
            GatewayError::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// The JSON-RPC error document.
    pub fn body(&self) -> Value {
        let mut error = json!({ "code": self.code(), "message": self.to_string() });
        match self {
            GatewayError::Internal(detail) | GatewayError::Parse(detail) => {
                error["data"] = Value::String(detail.clone());
            }
            _ => {}
        }

        let mut body = json!({ "jsonrpc": "2.0", "error": error });
        match self {
            GatewayError::Unauthorized { id } => body["id"] = id.clone(),
            GatewayError::Parse(_) => body["id"] = Value::Null,
            _ => {}
        }
        body
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        match e {
            // The session went away underneath the request.
            TransportError::Closed => GatewayError::SessionNotFound,
            TransportError::Malformed(detail) => GatewayError::Parse(detail),
            TransportError::Io(_) => GatewayError::Internal(e.to_string()),
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Sealed => GatewayError::Unavailable,
            RegistryError::Open(inner) => GatewayError::Internal(inner.to_string()),
        }
    }
}

impl From<InvalidSessionId> for GatewayError {
    fn from(e: InvalidSessionId) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl From<BytesRejection> for GatewayError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge
        } else {
            GatewayError::BadRequest(rejection.body_text())
        }
    }
}

/// `{success: true, message}` body used by DELETE.
pub fn success(message: &str) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "message": message }))).into_response()
}

/// Turns a handler panic into the structured internal-error response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");
    GatewayError::Internal(detail).into_response()
}
