//! Shutdown coordination for the gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::session::SessionRegistry;
use crate::transport::Channel;

/// Trigger for graceful shutdown.
///
/// Backed by a watch channel so a task that subscribes after the trigger
/// fired still observes it.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new shutdown trigger.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of [`Shutdown`].
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// What a drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Sessions whose channel closed cleanly.
    pub closed: usize,
    /// Sessions whose close returned an error.
    pub failed: usize,
    /// The server task had to be aborted after the grace period.
    pub forced: bool,
}

/// Drains every live session, then stops the listener.
///
/// The only component allowed to close all channels at once.
pub struct ShutdownCoordinator {
    registry: Arc<SessionRegistry>,
    shutdown: Shutdown,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        shutdown: Shutdown,
        server: JoinHandle<std::io::Result<()>>,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            shutdown,
            server: Mutex::new(Some(server)),
            grace,
        }
    }

    /// Close every session, clear the registry, stop accepting connections
    /// and wait for the listening socket to be released.
    ///
    /// Safe to call more than once; later calls return an empty report.
    pub async fn drain_and_stop(&self) -> DrainReport {
        let mut server = self.server.lock().await;
        let Some(mut task) = server.take() else {
            return DrainReport::default();
        };

        let mut report = DrainReport::default();
        self.registry.seal();

        let sessions = self.registry.snapshot();
        tracing::info!(sessions = sessions.len(), "Draining sessions");
        for (id, channel) in sessions {
            close_one(&id.to_string(), channel.as_ref(), &mut report).await;
        }

        for entry in self.registry.clear() {
            if !entry.channel().is_closed() {
                close_one(&entry.id().to_string(), entry.channel().as_ref(), &mut report).await;
            }
        }

        self.shutdown.trigger();

        match tokio::time::timeout(self.grace, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server exited with error"),
            Ok(Err(e)) => tracing::error!(error = %e, "Server task failed"),
            Err(_) => {
                tracing::warn!(grace_secs = self.grace.as_secs(), "Grace period elapsed, aborting server");
                task.abort();
                let _ = task.await;
                report.forced = true;
            }
        }

        tracing::info!(
            closed = report.closed,
            failed = report.failed,
            forced = report.forced,
            "Drain complete"
        );
        report
    }
}

async fn close_one(id: &str, channel: &dyn Channel, report: &mut DrainReport) {
    match channel.close().await {
        Ok(()) => report.closed += 1,
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "Failed to close session during drain");
            report.failed += 1;
        }
    }
    metrics::record_session_closed("shutdown");
}
