//! Streamable-HTTP Session Gateway Library

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod session;
pub mod transport;

pub use config::schema::GatewayConfig;
pub use http::{GatewayServer, ServerHandle};
pub use lifecycle::Shutdown;
