//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use session_gateway::auth::StaticApiKey;
use session_gateway::config::GatewayConfig;
use session_gateway::session::SessionId;
use session_gateway::transport::{
    Channel, ChannelFactory, ChannelReply, ChannelRequest, HubFactory, MessageHandler, RpcError,
    SessionContext, TransportError,
};
use session_gateway::{GatewayServer, ServerHandle};

pub const API_KEY: &str = "test-secret";

/// Defaults, bound to an ephemeral loopback port, with a short grace period.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.shutdown.grace_secs = 5;
    config
}

/// Answers `ping`, `tools/list` and `tools/call`; `broadcast` pushes its params
/// to every open stream of the calling session.
pub struct TestHandler;

#[async_trait]
impl MessageHandler for TestHandler {
    async fn request(
        &self,
        ctx: &SessionContext,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [{ "name": "echo" }] })),
            "tools/call" => Ok(json!({ "content": params })),
            "broadcast" => {
                let delivered = ctx.push(json!({ "jsonrpc": "2.0", "method": "notice", "params": params }));
                Ok(json!({ "delivered": delivered }))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

pub fn hub_factory() -> Arc<dyn ChannelFactory> {
    Arc::new(HubFactory::new(Arc::new(TestHandler), 16))
}

/// Wraps a factory and keeps every channel it opened.
pub struct RecordingFactory {
    inner: Arc<dyn ChannelFactory>,
    opened: Mutex<Vec<Arc<dyn Channel>>>,
}

impl RecordingFactory {
    pub fn new(inner: Arc<dyn ChannelFactory>) -> Self {
        Self { inner, opened: Mutex::new(Vec::new()) }
    }

    pub fn opened(&self) -> Vec<Arc<dyn Channel>> {
        self.opened.lock().unwrap().clone()
    }
}

impl ChannelFactory for RecordingFactory {
    fn open(&self, session: Option<&SessionId>) -> Result<Arc<dyn Channel>, TransportError> {
        let channel = self.inner.open(session)?;
        self.opened.lock().unwrap().push(Arc::clone(&channel));
        Ok(channel)
    }
}

/// Channels that fail every request.
pub struct BrokenFactory;

struct BrokenChannel;

#[async_trait]
impl Channel for BrokenChannel {
    fn session_id(&self) -> Option<&SessionId> {
        None
    }

    async fn handle(&self, _request: ChannelRequest) -> Result<ChannelReply, TransportError> {
        Err(TransportError::Io("backend unavailable".to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

impl ChannelFactory for BrokenFactory {
    fn open(&self, _session: Option<&SessionId>) -> Result<Arc<dyn Channel>, TransportError> {
        let channel: Arc<dyn Channel> = Arc::new(BrokenChannel);
        Ok(channel)
    }
}

/// The first channel it opens parks its first request until `release` is
/// notified and then fails it; every later channel comes from `inner`.
pub struct GatedFactory {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    opened_first: AtomicBool,
    inner: Arc<dyn ChannelFactory>,
}

impl GatedFactory {
    pub fn new(inner: Arc<dyn ChannelFactory>) -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            opened_first: AtomicBool::new(false),
            inner,
        }
    }
}

struct GatedChannel {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    closed: AtomicBool,
}

#[async_trait]
impl Channel for GatedChannel {
    fn session_id(&self) -> Option<&SessionId> {
        None
    }

    async fn handle(&self, _request: ChannelRequest) -> Result<ChannelReply, TransportError> {
        self.entered.notify_one();
        self.release.notified().await;
        Err(TransportError::Io("backend went away".to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ChannelFactory for GatedFactory {
    fn open(&self, session: Option<&SessionId>) -> Result<Arc<dyn Channel>, TransportError> {
        if self.opened_first.swap(true, Ordering::SeqCst) {
            return self.inner.open(session);
        }
        let channel: Arc<dyn Channel> = Arc::new(GatedChannel {
            entered: Arc::clone(&self.entered),
            release: Arc::clone(&self.release),
            closed: AtomicBool::new(false),
        });
        Ok(channel)
    }
}

/// Serves requests through `inner` channels whose close always fails.
pub struct UncloseableFactory {
    inner: Arc<dyn ChannelFactory>,
}

impl UncloseableFactory {
    pub fn new(inner: Arc<dyn ChannelFactory>) -> Self {
        Self { inner }
    }
}

struct UncloseableChannel {
    inner: Arc<dyn Channel>,
}

#[async_trait]
impl Channel for UncloseableChannel {
    fn session_id(&self) -> Option<&SessionId> {
        self.inner.session_id()
    }

    async fn handle(&self, request: ChannelRequest) -> Result<ChannelReply, TransportError> {
        self.inner.handle(request).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        Err(TransportError::Io("socket stuck".to_string()))
    }

    fn is_closed(&self) -> bool {
        false
    }
}

impl ChannelFactory for UncloseableFactory {
    fn open(&self, session: Option<&SessionId>) -> Result<Arc<dyn Channel>, TransportError> {
        let channel: Arc<dyn Channel> = Arc::new(UncloseableChannel { inner: self.inner.open(session)? });
        Ok(channel)
    }
}

pub async fn start_gateway(config: GatewayConfig) -> ServerHandle {
    start_gateway_with(config, hub_factory()).await
}

pub async fn start_gateway_with(config: GatewayConfig, factory: Arc<dyn ChannelFactory>) -> ServerHandle {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let verifier = Arc::new(StaticApiKey::new(Some(API_KEY.to_string())));
    GatewayServer::new(config, factory, verifier).spawn(listener).unwrap()
}

pub fn endpoint(handle: &ServerHandle) -> String {
    format!("http://{}/mcp", handle.local_addr())
}

pub fn rpc(id: i64, method: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": {} })
}
