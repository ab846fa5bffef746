//! Default channel: JSON-RPC messages in, handler answers out, server
//! pushes fanned out to every open GET stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::session::SessionId;
use crate::transport::handler::{MessageHandler, RpcError, SessionContext};
use crate::transport::{
    Channel, ChannelFactory, ChannelReply, ChannelRequest, TransportError, Verb,
};

pub struct HubChannel {
    ctx: SessionContext,
    handler: Arc<dyn MessageHandler>,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl HubChannel {
    pub fn new(
        session: Option<SessionId>,
        handler: Arc<dyn MessageHandler>,
        push_buffer: usize,
    ) -> Self {
        let (push_tx, _) = broadcast::channel(push_buffer.max(1));
        let (close_tx, _) = watch::channel(false);
        Self {
            ctx: SessionContext::new(session, push_tx),
            handler,
            closed: AtomicBool::new(false),
            close_tx,
        }
    }

    /// Push a server-initiated message to every open stream on this channel.
    pub fn push(&self, message: Value) -> usize {
        self.ctx.push(message)
    }

    fn open_stream(&self) -> ChannelReply {
        let mut closed_rx = self.close_tx.subscribe();
        let session = self.ctx.session_id().cloned();
        let messages = BroadcastStream::new(self.ctx.subscribe()).filter_map(move |item| {
            let session = session.clone();
            async move {
                match item {
                    Ok(message) => Some(message),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(session = ?session, skipped, "Push stream lagged, messages dropped");
                        None
                    }
                }
            }
        });
        let stream = messages.take_until(async move {
            let _ = closed_rx.wait_for(|closed| *closed).await;
        });
        ChannelReply::Stream(Box::pin(stream))
    }

    async fn dispatch_body(&self, body: &[u8]) -> Result<ChannelReply, TransportError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        match payload {
            Value::Array(batch) => {
                if batch.is_empty() {
                    return Err(TransportError::Malformed("empty batch".into()));
                }
                let mut responses = Vec::with_capacity(batch.len());
                for message in batch {
                    if let Some(response) = self.dispatch(message).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    Ok(ChannelReply::Accepted)
                } else {
                    Ok(ChannelReply::Json(Value::Array(responses)))
                }
            }
            message => Ok(match self.dispatch(message).await {
                Some(response) => ChannelReply::Json(response),
                None => ChannelReply::Accepted,
            }),
        }
    }

    /// Route one message. Returns the response document, if the message warrants one.
    async fn dispatch(&self, message: Value) -> Option<Value> {
        let Value::Object(mut map) = message else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("message must be an object"),
            ));
        };

        let id = map.remove("id");
        let method = map.get("method").and_then(Value::as_str).map(str::to_owned);
        let params = map.remove("params").unwrap_or(Value::Null);

        match (id, method) {
            (Some(id), Some(method)) => {
                let response = match self.handler.request(&self.ctx, &method, params).await {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err(error) => error_response(id, error),
                };
                Some(response)
            }
            (None, Some(method)) => {
                self.handler.notify(&self.ctx, &method, params).await;
                None
            }
            // A client's answer to a server-initiated request.
            (Some(_), None) => None,
            (None, None) => Some(error_response(
                Value::Null,
                RpcError::invalid_request("missing method"),
            )),
        }
    }
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error.to_value() })
}

#[async_trait]
impl Channel for HubChannel {
    fn session_id(&self) -> Option<&SessionId> {
        self.ctx.session_id()
    }

    async fn handle(&self, request: ChannelRequest) -> Result<ChannelReply, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match request.verb {
            Verb::Post => self.dispatch_body(&request.body).await,
            Verb::Get => Ok(self.open_stream()),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.close_tx.send_replace(true);
        tracing::debug!(session = ?self.ctx.session_id(), "Channel closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Builds a `HubChannel` per session (or per stateless request).
#[derive(Clone)]
pub struct HubFactory {
    handler: Arc<dyn MessageHandler>,
    push_buffer: usize,
}

impl HubFactory {
    pub fn new(handler: Arc<dyn MessageHandler>, push_buffer: usize) -> Self {
        Self { handler, push_buffer }
    }
}

impl ChannelFactory for HubFactory {
    fn open(&self, session: Option<&SessionId>) -> Result<Arc<dyn Channel>, TransportError> {
        let channel: Arc<dyn Channel> = Arc::new(HubChannel::new(
            session.cloned(),
            Arc::clone(&self.handler),
            self.push_buffer,
        ));
        Ok(channel)
    }
}
