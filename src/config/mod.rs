//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to GatewayServer at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    AuthConfig, EndpointConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    SecurityConfig, SessionConfig, SessionMode, ShutdownConfig, UnknownSessionPolicy,
};
pub use validation::{validate_config, ValidationError};
