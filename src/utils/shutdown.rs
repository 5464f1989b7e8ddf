use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Raises `stop` once `signal` fires.
///
/// Long-running work watching `stop` then winds down at its next check,
/// so a receive in flight finishes and its message is settled.
pub fn stop_on<S>(signal: S, stop: Arc<watch::Sender<bool>>) -> JoinHandle<()>
where
    S: Future<Output = io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = signal.await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received. Stopping after the current operation.");
        if stop.send(true).is_err() {
            debug!("shutdown requested after every listener finished");
        }
    })
}
