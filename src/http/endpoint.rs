//! Session endpoint: the per-request state machine.
//!
//! # States (keyed by HTTP verb)
//! ```text
//! POST    → auth gate → resolve/mint id → get_or_create → channel.handle
//! GET     → existing session (or fresh stateless channel) → push stream
//! DELETE  → take from registry → close
//! OPTIONS → 200
//! other   → 405
//! ```
//!
//! In stateless mode every channel lives for exactly one request, except a
//! push stream's channel, which lives exactly as long as the stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde_json::Value;

use crate::auth::{bearer_token, decide, ApiKeyVerifier, OperationProbe};
use crate::config::{SessionConfig, UnknownSessionPolicy};
use crate::http::request::request_id;
use crate::http::response::{success, GatewayError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::session::{SessionId, SessionRegistry};
use crate::transport::{
    Channel, ChannelFactory, ChannelReply, ChannelRequest, ClosingStream, GuardedStream,
    PushStream,
};

/// Everything the endpoint needs, shared by all requests.
#[derive(Clone)]
pub struct EndpointState {
    pub registry: Arc<SessionRegistry>,
    pub factory: Arc<dyn ChannelFactory>,
    pub verifier: Arc<dyn ApiKeyVerifier>,
    pub session: SessionConfig,
    pub session_header: HeaderName,
    pub require_api_auth: bool,
    pub shutdown: Shutdown,
}

impl EndpointState {
    fn stateless(&self) -> bool {
        self.session.mode.is_stateless()
    }

    /// The session id the client sent, validated.
    fn session_id(&self, headers: &HeaderMap) -> Result<Option<SessionId>, GatewayError> {
        let Some(value) = headers.get(&self.session_header) else {
            return Ok(None);
        };
        let raw = value.to_str().map_err(|_| {
            GatewayError::BadRequest(format!("{} header must be visible ASCII", self.session_header))
        })?;
        Ok(Some(SessionId::parse(raw)?))
    }
}

/// Entry point for every verb on the session path.
///
/// Nothing escapes as anything but a structured response.
pub async fn session_endpoint(
    State(state): State<EndpointState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    let verb = method.to_string();

    let response = match dispatch(&state, method, &headers, body).await {
        Ok(response) => response,
        Err(e) => {
            if let GatewayError::Internal(detail) = &e {
                tracing::error!(
                    request_id = %request_id(&headers),
                    error = %detail,
                    "Request failed"
                );
            } else {
                tracing::debug!(request_id = %request_id(&headers), error = %e, "Request rejected");
            }
            e.into_response()
        }
    };

    metrics::record_request(&verb, response.status().as_u16(), start);
    response
}

async fn dispatch(
    state: &EndpointState,
    method: Method,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    match method {
        Method::OPTIONS => Ok(StatusCode::OK.into_response()),
        Method::POST => create_or_continue(state, headers, body?).await,
        Method::GET => open_stream(state, headers).await,
        Method::DELETE => terminate(state, headers).await,
        other => Err(GatewayError::MethodNotAllowed(other)),
    }
}

/// Reject privileged calls without a valid bearer token. Touches no session state.
fn authorize(state: &EndpointState, headers: &HeaderMap, body: &[u8]) -> Result<(), GatewayError> {
    if !state.require_api_auth {
        return Ok(());
    }

    let probe = OperationProbe::from_body(body);
    let token = bearer_token(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()));
    let valid = token.is_some_and(|t| state.verifier.verify(t));
    let method = probe.as_ref().and_then(|p| p.method.as_deref());

    let decision = decide(method, token.is_some(), valid, state.require_api_auth);
    if decision.is_rejected() {
        metrics::record_auth_rejection();
        tracing::warn!(
            request_id = %request_id(headers),
            method = ?method,
            credential = token.is_some(),
            "Rejected privileged call"
        );
        return Err(GatewayError::Unauthorized {
            id: probe.map(|p| p.id).unwrap_or(Value::Null),
        });
    }
    Ok(())
}

async fn create_or_continue(
    state: &EndpointState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    authorize(state, headers, &body)?;
    let request = ChannelRequest::post(body);

    if state.stateless() {
        let channel = state.factory.open(None)?;
        return match channel.handle(request).await {
            Ok(ChannelReply::Stream(stream)) => Ok(sse_response(state, stream, Some(channel))),
            outcome => {
                close_quietly(channel.as_ref()).await;
                reply_response(state, outcome?)
            }
        };
    }

    let id = state.session_id(headers)?.unwrap_or_else(SessionId::generate);
    let (channel, created) = state
        .registry
        .get_or_create(&id, |id| state.factory.open(Some(id)))?;

    let reply = match channel.handle(request).await {
        Ok(reply) => reply,
        Err(e) => {
            if created {
                // Never established. The id may have been terminated and
                // re-created meanwhile; only our own channel is taken out.
                if let Some(entry) = state.registry.take_if_same(&id, &channel) {
                    close_quietly(entry.channel().as_ref()).await;
                }
            }
            return Err(e.into());
        }
    };

    let mut response = reply_response(state, reply)?;
    if created {
        let value = HeaderValue::from_str(id.as_str())
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        response.headers_mut().insert(state.session_header.clone(), value);
    }
    Ok(response)
}

async fn open_stream(state: &EndpointState, headers: &HeaderMap) -> Result<Response, GatewayError> {
    if state.stateless() {
        let channel = state.factory.open(None)?;
        return match channel.handle(ChannelRequest::get()).await {
            Ok(ChannelReply::Stream(stream)) => Ok(sse_response(state, stream, Some(channel))),
            outcome => {
                close_quietly(channel.as_ref()).await;
                reply_response(state, outcome?)
            }
        };
    }

    let id = state.session_id(headers)?.ok_or_else(|| {
        GatewayError::BadRequest(format!("Missing {} header", state.session_header))
    })?;
    let (channel, lease) = state
        .registry
        .lease_stream(&id)
        .ok_or(GatewayError::SessionNotFound)?;
    let reply = match channel.handle(ChannelRequest::get()).await? {
        // The session counts as active for as long as the stream is open.
        ChannelReply::Stream(stream) => ChannelReply::Stream(Box::pin(GuardedStream::new(stream, lease))),
        other => other,
    };
    reply_response(state, reply)
}

async fn terminate(state: &EndpointState, headers: &HeaderMap) -> Result<Response, GatewayError> {
    if state.stateless() {
        return Ok(success("Stateless mode - no session to terminate"));
    }

    let id = state.session_id(headers)?.ok_or(GatewayError::SessionNotFound)?;
    let Some(entry) = state.registry.take(&id) else {
        return match state.session.unknown_session_delete {
            UnknownSessionPolicy::Succeed => Ok(success("Session not found")),
            UnknownSessionPolicy::NotFound => Err(GatewayError::SessionNotFound),
        };
    };

    metrics::record_session_closed("terminate");
    if let Err(e) = entry.channel().close().await {
        tracing::error!(session = %id, error = %e, "Failed to close terminated session");
        return Err(GatewayError::Internal(e.to_string()));
    }
    tracing::info!(session = %id, "Session terminated");
    Ok(success("Session terminated"))
}

fn reply_response(state: &EndpointState, reply: ChannelReply) -> Result<Response, GatewayError> {
    Ok(match reply {
        ChannelReply::Json(value) => (StatusCode::OK, Json(value)).into_response(),
        ChannelReply::Accepted => StatusCode::ACCEPTED.into_response(),
        ChannelReply::Stream(stream) => sse_response(state, stream, None),
    })
}

/// Serve a push stream as SSE. With an `owner`, the channel is closed when the
/// stream ends or the client disconnects.
fn sse_response(
    state: &EndpointState,
    stream: PushStream,
    owner: Option<Arc<dyn Channel>>,
) -> Response {
    let stream: PushStream = match owner {
        Some(channel) => Box::pin(ClosingStream::new(stream, channel)),
        None => stream,
    };

    let mut shutdown = state.shutdown.subscribe();
    let events = stream
        .take_until(async move { shutdown.recv().await })
        .map(|message| Ok::<_, Infallible>(Event::default().event("message").data(message.to_string())));

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(state.session.keep_alive_secs.max(1))))
        .into_response()
}

async fn close_quietly(channel: &dyn Channel) {
    if let Err(e) = channel.close().await {
        tracing::warn!(error = %e, "Failed to close channel");
    }
}
