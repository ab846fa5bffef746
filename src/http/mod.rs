//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, request span)
//!     → endpoint.rs (auth gate, session resolution, channel dispatch)
//!     → response.rs (structured errors)
//!     → Send to client (JSON, 202, or SSE push stream)
//! ```

pub mod endpoint;
pub mod health;
pub mod request;
pub mod response;
pub mod server;

pub use endpoint::EndpointState;
pub use request::X_REQUEST_ID;
pub use response::GatewayError;
pub use server::{GatewayServer, ServerHandle};
