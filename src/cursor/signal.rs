use tokio_util::sync::CancellationToken;

/// One-shot, multi-observer notification that a cursor close has concluded.
///
/// Completing it is idempotent; once complete it stays complete. It says
/// nothing about whether the server acknowledged the close.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    token: CancellationToken,
}

impl CloseSignal {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub(crate) fn notify(&self) {
        self.token.cancel();
    }

    /// Whether the close has concluded.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the close has concluded.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_notify_wakes_all_observers() {
        let signal = CloseSignal::new();
        let first = signal.clone();
        let second = signal.clone();

        let waiter = tokio::spawn(async move { first.closed().await });
        assert!(!second.is_closed());

        signal.notify();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        second.closed().await;
        assert!(second.is_closed());
    }

    #[test]
    fn test_notify_is_idempotent() {
        let signal = CloseSignal::new();
        signal.notify();
        signal.notify();
        assert!(signal.is_closed());
        tokio_test::block_on(signal.closed());
    }
}
