//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Seal registry → Close every session
//!     → Clear registry → Stop accepting → Await listener release
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful drain
//! ```
//!
//! # Design Decisions
//! - Sessions are closed before the listener stops, so open push streams
//!   end and graceful shutdown is not held up by them
//! - One failing close never aborts the rest of the drain
//! - Shutdown has timeout: forced abort after the grace period

pub mod shutdown;
pub mod signals;

pub use shutdown::{DrainReport, Shutdown, ShutdownCoordinator, ShutdownSignal};
pub use signals::shutdown_signal;
