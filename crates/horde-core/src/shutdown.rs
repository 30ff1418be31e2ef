//! Process-wide cooperative cancellation.
//!
//! A [`ShutdownSignal`] is created once in `main` and cloned into every task
//! that must stop when the process shuts down: the game loop, the HTTP
//! server, the inbound consumer, and each connection session. Triggering is
//! idempotent and level-triggered: a task that starts waiting after the
//! signal fired returns immediately.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle to the process-wide cancellation signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a signal that has not fired yet.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal. Calling this more than once has no further effect.
    ///
    /// Returns `true` if this call fired the signal, `false` if it had
    /// already fired.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal fires.
    ///
    /// Cancel-safe: dropping the future before completion has no effect on
    /// the signal.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so `wait_for` cannot observe a closed
        // channel while this borrow is alive.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        assert!(!signal.is_cancelled());
        assert!(signal.trigger());

        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn late_waiters_return_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let late = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(late.is_ok());
    }

    #[test]
    fn trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(clone.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_cancelled());
    }
}
