// Shutdown Token
// One sender, any number of tokens; every listener loop and admission wait observes it

use tokio::sync::watch;

/// Shutdown signal for cooperative termination
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested (or the sender is gone)
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait for shutdown signal. Returns immediately if it already fired.
    pub async fn wait(&mut self) {
        // Err means the sender was dropped, which counts as shutdown too
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Shutdown sender
#[derive(Debug)]
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Hand out another token bound to this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        assert!(token.is_shutdown());

        // already fired: must not block
        tokio::time::timeout(Duration::from_millis(100), token.wait())
            .await
            .expect("wait should return once shutdown fired");
    }

    #[tokio::test]
    async fn test_late_tokens_see_shutdown() {
        let (tx, _token) = shutdown_channel();
        tx.shutdown();

        let mut late = tx.token();
        assert!(late.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .expect("late token should observe shutdown");
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);

        assert!(token.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), token.wait())
            .await
            .expect("wait should return when sender is gone");
    }

    #[tokio::test]
    async fn test_wait_pends_until_signal() {
        let (tx, mut token) = shutdown_channel();

        let waited = tokio::time::timeout(Duration::from_millis(30), token.wait()).await;
        assert!(waited.is_err(), "no shutdown yet");

        tx.shutdown();
        token.wait().await;
    }
}
