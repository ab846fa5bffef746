//! Configuration validation.
//!
//! Semantic checks only; serde already handled syntax. Every problem is
//! reported, not just the first.

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("{field} '{value}' must start with '/'")]
    Path { field: &'static str, value: String },

    #[error("endpoint.path and endpoint.health_path must differ")]
    PathCollision,

    #[error("session.header_name '{0}' is not a valid HTTP header name")]
    HeaderName(String),

    #[error("session.push_buffer must be greater than zero")]
    PushBuffer,

    #[error("session.reap_interval_secs must be greater than zero when idle_timeout_secs is set")]
    ReapInterval,

    #[error("auth.require_api_auth is set but no key is configured (api_key or ${0})")]
    MissingApiKey(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    for (field, value) in [
        ("endpoint.path", &config.endpoint.path),
        ("endpoint.health_path", &config.endpoint.health_path),
    ] {
        if !value.starts_with('/') {
            errors.push(ValidationError::Path { field, value: value.clone() });
        }
    }
    if config.endpoint.path == config.endpoint.health_path {
        errors.push(ValidationError::PathCollision);
    }

    let header = &config.session.header_name;
    if header.is_empty() || HeaderName::from_bytes(header.as_bytes()).is_err() {
        errors.push(ValidationError::HeaderName(header.clone()));
    }

    if config.session.push_buffer == 0 {
        errors.push(ValidationError::PushBuffer);
    }
    if config.session.idle_timeout_secs > 0 && config.session.reap_interval_secs == 0 {
        errors.push(ValidationError::ReapInterval);
    }

    if config.auth.require_api_auth && config.auth.resolve_api_key().is_none() {
        errors.push(ValidationError::MissingApiKey(config.auth.api_key_env.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
