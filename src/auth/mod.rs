//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! POST body
//!     → gate.rs (OperationProbe: method + id)
//!     → ApiKeyVerifier (is the bearer token valid?)
//!     → gate.rs decide() → AuthDecision
//!     → rejected: 401 before the session registry is touched
//! ```
//!
//! # Design Decisions
//! - Only privileged operations are gated; discovery and handshake stay open
//! - Unparseable bodies fail open to generic handling
//! - The key backend is a boolean predicate behind a trait

pub mod gate;

pub use gate::{bearer_token, decide, is_privileged, AuthDecision, OperationProbe};

/// Backend that answers "is this token acceptable".
pub trait ApiKeyVerifier: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Compares against a single configured secret.
#[derive(Debug, Clone)]
pub struct StaticApiKey {
    key: Option<String>,
}

impl StaticApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }
}

impl ApiKeyVerifier for StaticApiKey {
    fn verify(&self, token: &str) -> bool {
        match &self.key {
            Some(key) => key.len() == token.len()
                && key
                    .bytes()
                    .zip(token.bytes())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0,
            None => false,
        }
    }
}
