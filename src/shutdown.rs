//! Process signal handling.

use std::future::Future;
use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

/// Resolve on the first SIGINT or SIGTERM.
pub async fn wait_for_signal() -> io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

/// Flip `shutdown` to true once `signal` resolves.
///
/// If `signal` fails the sender is held until the task is dropped, so
/// receivers keep running instead of seeing a closed channel.
pub async fn forward_shutdown<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            let _ = shutdown.send(true);
        }
        Err(e) => {
            error!(error = %e, "Failed to install signal handlers; shutdown signals are ignored");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_requests_shutdown() {
        let (tx, mut rx) = watch::channel(false);

        forward_shutdown(async { Ok(()) }, tx).await;

        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_failed_signal_setup_keeps_channel_open() {
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(forward_shutdown(
            async { Err(io::Error::other("signal driver unavailable")) },
            tx,
        ));

        let changed = tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
        assert!(changed.is_err(), "shutdown channel must stay open and unchanged");
        assert!(rx.has_changed().is_ok());
        assert!(!*rx.borrow());

        handle.abort();
    }
}
