//! Process signal handling.

use std::future::Future;

use tracing::info;

/// Register SIGINT and SIGTERM handlers.
///
/// The returned future resolves when either signal arrives. Handlers are
/// installed eagerly so a signal delivered before the future is polled is not lost.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be registered.
#[cfg(unix)]
pub fn install() -> std::io::Result<impl Future<Output = ()> + Send> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown..."),
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown..."),
        }
    })
}

/// Register a Ctrl+C handler.
///
/// # Errors
///
/// Never fails on this platform; the signature matches the unix variant.
#[cfg(not(unix))]
pub fn install() -> std::io::Result<impl Future<Output = ()> + Send> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown...");
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;

    /// Signals reach every handler in the test process, so these tests run one at a time.
    static SIGNALS: Mutex<()> = Mutex::const_new(());

    #[tokio::test]
    async fn test_install_waits_for_a_signal() {
        let _guard = SIGNALS.lock().await;
        let shutdown = install().unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown).await;
        assert!(waited.is_err());
    }

    #[cfg(unix)]
    async fn resolves_on(signal: &str) {
        let _guard = SIGNALS.lock().await;
        let shutdown = install().unwrap();

        let status = std::process::Command::new("kill")
            .args([signal, &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .unwrap_or_else(|_| panic!("{signal} did not resolve the shutdown future"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigint_resolves_shutdown() {
        resolves_on("-INT").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_resolves_shutdown() {
        resolves_on("-TERM").await;
    }
}
