//! Session management subsystem.
//!
//! # Data Flow
//! ```text
//! session header (or freshly minted id)
//!     → id.rs (validate / generate SessionId)
//!     → registry.rs (get_or_create / get / take)
//!     → live Channel handed back to the endpoint
//!
//! Background:
//!     reaper.rs → idle sessions taken out and closed
//! ```
//!
//! # Design Decisions
//! - The registry is owned by the server instance, not a process global
//! - At most one entry per id, at most one channel ever built per id
//! - The registry hands channels out; whoever takes an entry out closes it

pub mod id;
pub mod reaper;
pub mod registry;

pub use id::{InvalidSessionId, SessionId};
pub use reaper::IdleReaper;
pub use registry::{RegistryError, SessionEntry, SessionRegistry, StreamLease};
