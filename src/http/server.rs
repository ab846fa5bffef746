//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the session endpoint and health probe
//! - Wire up middleware (CORS, request ID, tracing, body limit, panic catcher)
//! - Start background tasks (idle reaper)
//! - Bind server to listener and hand back a handle that can drain it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, Method};
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{ApiKeyVerifier, StaticApiKey};
use crate::config::GatewayConfig;
use crate::http::endpoint::{session_endpoint, EndpointState};
use crate::http::health::health;
use crate::http::request::{propagate_request_id_layer, request_span, set_request_id_layer};
use crate::http::response::panic_response;
use crate::lifecycle::{DrainReport, Shutdown, ShutdownCoordinator};
use crate::session::{IdleReaper, SessionRegistry};
use crate::transport::{BasicHandler, ChannelFactory, HubFactory};

/// HTTP server for the session gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    registry: Arc<SessionRegistry>,
    shutdown: Shutdown,
}

impl GatewayServer {
    /// Create a server that opens channels with `factory` and checks bearer
    /// tokens with `verifier`.
    pub fn new(
        config: GatewayConfig,
        factory: Arc<dyn ChannelFactory>,
        verifier: Arc<dyn ApiKeyVerifier>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let shutdown = Shutdown::new();

        // Validated config guarantees a well-formed name.
        let session_header = HeaderName::from_bytes(config.session.header_name.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("mcp-session-id"));

        let state = EndpointState {
            registry: Arc::clone(&registry),
            factory,
            verifier,
            session: config.session.clone(),
            session_header,
            require_api_auth: config.auth.require_api_auth,
            shutdown: shutdown.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
            shutdown,
        }
    }

    /// Server backed by the built-in `BasicHandler` and the configured API key.
    pub fn with_defaults(config: GatewayConfig) -> Self {
        let factory = HubFactory::new(Arc::new(BasicHandler::default()), config.session.push_buffer);
        let verifier = StaticApiKey::new(config.auth.resolve_api_key());
        Self::new(config, Arc::new(factory), Arc::new(verifier))
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: EndpointState) -> Router {
        let session_header = state.session_header.clone();
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, session_header.clone()])
            .expose_headers([session_header]);

        let body_limit = config.security.max_body_size;

        Router::new()
            .route(&config.endpoint.path, any(session_endpoint))
            .route(&config.endpoint.health_path, get(health))
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(cors)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Start serving on `listener` in the background.
    pub fn spawn(self, listener: TcpListener) -> std::io::Result<ServerHandle> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            address = %local_addr,
            path = %self.config.endpoint.path,
            mode = ?self.config.session.mode,
            api_auth = self.config.auth.require_api_auth,
            "Session gateway listening"
        );

        if let Some(reaper) = IdleReaper::from_config(Arc::clone(&self.registry), &self.config.session) {
            tokio::spawn(reaper.run(self.shutdown.subscribe()));
        }

        let mut signal = self.shutdown.subscribe();
        let app = self.router.into_make_service();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.recv().await })
                .await?;
            tracing::info!("HTTP server stopped");
            Ok::<(), std::io::Error>(())
        });

        let coordinator = ShutdownCoordinator::new(
            Arc::clone(&self.registry),
            self.shutdown.clone(),
            task,
            Duration::from_secs(self.config.shutdown.grace_secs),
        );

        Ok(ServerHandle {
            local_addr,
            registry: self.registry,
            coordinator: Arc::new(coordinator),
        })
    }
}

/// A running server.
#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Close every session, stop accepting, release the port.
    pub async fn drain_and_stop(&self) -> DrainReport {
        self.coordinator.drain_and_stop().await
    }
}
