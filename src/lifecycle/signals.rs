//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for Ctrl-C (and SIGTERM on Unix)
//! - Translate the first signal into a cancellation of in-flight work
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second signal forces the process to exit

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Trigger `shutdown` on the first interrupt; exit on the second.
pub fn spawn_signal_handler(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        interrupted().await;
        tracing::warn!("Interrupt received, cancelling in-flight requests");
        shutdown.trigger();

        interrupted().await;
        tracing::error!("Second interrupt received, exiting immediately");
        std::process::exit(130);
    })
}
