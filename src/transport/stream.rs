//! Push stream that owns its channel.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;

use crate::transport::{Channel, PushStream};

/// Closes the wrapped channel when the stream is dropped, whether it ran to
/// completion or the client went away mid-stream.
///
/// Used for stateless GET, where the channel exists only for the stream.
pub struct ClosingStream {
    inner: PushStream,
    channel: Option<Arc<dyn Channel>>,
}

impl ClosingStream {
    pub fn new(inner: PushStream, channel: Arc<dyn Channel>) -> Self {
        Self { inner, channel: Some(channel) }
    }
}

impl Stream for ClosingStream {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl Drop for ClosingStream {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = channel.close().await {
                        tracing::warn!(error = %e, "Failed to close stream channel");
                    }
                });
            }
            Err(_) => tracing::warn!("Stream dropped outside a runtime; channel left open"),
        }
    }
}

/// Holds `guard` for exactly as long as the stream lives.
pub struct GuardedStream<G> {
    inner: PushStream,
    _guard: G,
}

impl<G> GuardedStream<G> {
    pub fn new(inner: PushStream, guard: G) -> Self {
        Self { inner, _guard: guard }
    }
}

impl<G: Unpin> Stream for GuardedStream<G> {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}
