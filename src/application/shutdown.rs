use crate::config::DispatchConfig;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every admitted handler finished within the grace period.
    Graceful,
    /// The grace period elapsed with `in_flight` handlers still running. Their
    /// deliveries stay unacknowledged and the broker will hand them out again.
    Forced { in_flight: usize },
}

impl ShutdownOutcome {
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Graceful)
    }
}

/// Stops admission and drains in-flight work for at most `grace`.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.shutdown_grace)
    }

    pub async fn shutdown(
        &self,
        cancel: &CancellationToken,
        in_flight: &TaskTracker,
    ) -> ShutdownOutcome {
        info!(
            in_flight = in_flight.len(),
            grace_secs = self.grace.as_secs_f64(),
            "Shutdown requested, draining in-flight tasks"
        );
        cancel.cancel();
        in_flight.close();

        match tokio::time::timeout(self.grace, in_flight.wait()).await {
            Ok(()) => {
                info!("All in-flight tasks processed, shutdown graceful");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                let remaining = in_flight.len();
                warn!(in_flight = remaining, "Grace period elapsed, forcing shutdown");
                ShutdownOutcome::Forced {
                    in_flight: remaining,
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
