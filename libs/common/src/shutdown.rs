//! Graceful shutdown utilities
//!
//! Turns Ctrl+C / SIGTERM into a `Notify` that long-running loops can
//! `select!` on.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

/// Wait for shutdown signal (Ctrl+C or SIGTERM on Unix)
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(mut sig) = term_signal {
                    sig.recv().await;
                } else {
                    std::future::pending::<()>().await
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Notify `shutdown` once `signal` completes. Returns the spawned task.
pub fn notify_on<F>(signal: F, shutdown: Arc<Notify>) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        info!("Shutdown signal received");
        // notify_one stores a permit if the loop is not waiting right now
        shutdown.notify_one();
    })
}

/// `Notify` fired on Ctrl+C or SIGTERM
pub fn shutdown_notify() -> Arc<Notify> {
    let shutdown = Arc::new(Notify::new());
    notify_on(wait_for_shutdown(), shutdown.clone());
    shutdown
}
