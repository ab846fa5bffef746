//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the session gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Paths served by the gateway.
    pub endpoint: EndpointConfig,

    /// Session lifecycle settings.
    pub session: SessionConfig,

    /// Privileged-operation authentication.
    pub auth: AuthConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Drain and stop behaviour.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Path of the session endpoint.
    pub path: String,

    /// Path of the unauthenticated health probe.
    pub health_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            path: "/mcp".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

/// Whether sessions outlive a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Sessions are keyed by the session header and persist until terminated.
    #[default]
    Stateful,
    /// Every request gets a fresh channel that is closed once it has answered.
    Stateless,
}

impl SessionMode {
    pub fn is_stateless(self) -> bool {
        matches!(self, SessionMode::Stateless)
    }
}

/// What DELETE answers for an id the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownSessionPolicy {
    /// 200 with `{success: true, message: "Session not found"}`.
    #[default]
    Succeed,
    /// 404 structured error.
    NotFound,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stateful (session-keyed) or stateless (per-request) channels.
    pub mode: SessionMode,

    /// Request/response header carrying the session id.
    pub header_name: String,

    /// Answer for DELETE on an unknown session in stateful mode.
    pub unknown_session_delete: UnknownSessionPolicy,

    /// Close sessions idle for longer than this many seconds. 0 disables reaping.
    pub idle_timeout_secs: u64,

    /// How often the idle reaper scans the registry.
    pub reap_interval_secs: u64,

    /// Interval between SSE keep-alive comments on push streams.
    pub keep_alive_secs: u64,

    /// Depth of each channel's server-push queue.
    pub push_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Stateful,
            header_name: "mcp-session-id".to_string(),
            unknown_session_delete: UnknownSessionPolicy::Succeed,
            idle_timeout_secs: 0,
            reap_interval_secs: 30,
            keep_alive_secs: 15,
            push_buffer: 64,
        }
    }
}

/// Authentication configuration for privileged operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enforce bearer-token auth on privileged operations.
    pub require_api_auth: bool,

    /// Literal API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,

    /// Environment variable consulted when no literal key is set.
    pub api_key_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_api_auth: false,
            api_key: None,
            api_key_env: "GATEWAY_API_KEY".to_string(),
        }
    }
}

impl AuthConfig {
    /// The configured key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 4 * 1024 * 1024, // 4MB
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on waiting for the listener to release after sessions are drained.
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_secs: 10 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
