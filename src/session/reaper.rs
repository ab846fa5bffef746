//! Idle session reaping.
//!
//! Periodically takes sessions that have seen no request for longer than
//! the configured timeout out of the registry and closes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::config::SessionConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::session::SessionRegistry;

pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    /// `None` when idle reaping is disabled.
    pub fn from_config(registry: Arc<SessionRegistry>, config: &SessionConfig) -> Option<Self> {
        if config.idle_timeout_secs == 0 || config.mode.is_stateless() {
            return None;
        }
        Some(Self::new(
            registry,
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.reap_interval_secs.max(1)),
        ))
    }

    pub fn new(registry: Arc<SessionRegistry>, idle_timeout: Duration, interval: Duration) -> Self {
        Self { registry, idle_timeout, interval }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            idle_timeout_secs = self.idle_timeout.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Idle reaper starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Idle reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Close every session idle past the timeout. Returns how many were reaped.
    pub async fn reap(&self) -> usize {
        let mut reaped = 0;
        for id in self.registry.idle_sessions(self.idle_timeout) {
            // Re-checked under the entry lock: a request may have touched it since.
            let Some(entry) = self.registry.take_if_idle(&id, self.idle_timeout) else {
                continue;
            };
            if let Err(e) = entry.channel().close().await {
                tracing::warn!(session = %id, error = %e, "Failed to close idle session");
            }
            metrics::record_session_closed("idle");
            tracing::info!(session = %id, "Idle session reaped");
            reaped += 1;
        }
        reaped
    }
}
