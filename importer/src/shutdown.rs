//! Stop signal for [`Importer::run`](crate::Importer::run) and the latency
//! probe it spawns.

use tokio::sync::broadcast;
use tracing::{info, warn};

/// Fans one stop request out to the ingestion loop and the latency probe.
///
/// Each task takes its own receiver before it starts looping; a request
/// sent before a task subscribed is not seen by that task.
pub struct ShutdownController {
    stop: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (stop, _) = broadcast::channel(1);
        Self { stop }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.stop.subscribe()
    }

    /// Ask every subscribed task to stop after its current step.
    pub fn shutdown(&self) {
        let listeners = self.stop.send(()).unwrap_or(0);
        info!(listeners, "Stopping block ingestion");
    }

    /// Block until the process is asked to terminate, then stop ingestion.
    pub async fn wait_for_signal(&self) {
        let signal = termination_signal().await;
        info!(signal, "Received termination signal");
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the first termination signal received.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
