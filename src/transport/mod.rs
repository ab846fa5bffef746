//! Transport channel subsystem.
//!
//! # Data Flow
//! ```text
//! endpoint (POST) → Channel::handle(Verb::Post, body) → Json | Accepted
//! endpoint (GET)  → Channel::handle(Verb::Get)        → Stream (server push)
//! registry/drain  → Channel::close()                   → push streams end
//! ```
//!
//! # Design Decisions
//! - The channel is opaque to the router: it only sees handle() and close()
//! - Session id is a constructor argument, never captured implicitly
//! - close() is idempotent; drain and DELETE may race on the same channel

pub mod handler;
pub mod hub;
pub mod stream;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::session::SessionId;

pub use handler::{BasicHandler, MessageHandler, RpcError, SessionContext};
pub use hub::{HubChannel, HubFactory};
pub use stream::{ClosingStream, GuardedStream};

/// Server-pushed messages for one GET stream.
pub type PushStream = Pin<Box<dyn Stream<Item = Value> + Send>>;

/// The HTTP verb as far as a channel cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Write path: the body carries one or more messages.
    Post,
    /// Read path: open a server-push stream.
    Get,
}

#[derive(Debug, Clone)]
pub struct ChannelRequest {
    pub verb: Verb,
    pub body: Bytes,
}

impl ChannelRequest {
    pub fn post(body: impl Into<Bytes>) -> Self {
        Self { verb: Verb::Post, body: body.into() }
    }

    pub fn get() -> Self {
        Self { verb: Verb::Get, body: Bytes::new() }
    }
}

pub enum ChannelReply {
    /// A single JSON document answering the POST.
    Json(Value),
    /// Nothing to answer (notifications, client responses).
    Accepted,
    /// A long-lived push stream.
    Stream(PushStream),
}

impl std::fmt::Debug for ChannelReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelReply::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ChannelReply::Accepted => f.write_str("Accepted"),
            ChannelReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Errors surfaced by a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The channel was closed before or during the call.
    #[error("channel closed")]
    Closed,

    /// The body could not be interpreted as a protocol message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The underlying connection failed.
    #[error("transport I/O failure: {0}")]
    Io(String),
}

/// One live protocol connection: a session's, or a single stateless request's.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The session this channel is bound to; `None` for stateless channels.
    fn session_id(&self) -> Option<&SessionId>;

    /// Serve one request.
    async fn handle(&self, request: ChannelRequest) -> Result<ChannelReply, TransportError>;

    /// Release every resource. Calling it again is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

/// Builds channels. Construction is synchronous so the registry can run it
/// inside its creation lock without holding that lock across an await.
pub trait ChannelFactory: Send + Sync {
    fn open(&self, session: Option<&SessionId>) -> Result<Arc<dyn Channel>, TransportError>;
}
