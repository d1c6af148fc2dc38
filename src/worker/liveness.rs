//! Per-application liveness flag.
//!
//! The reconciler holds the [`LivenessFlag`]; the worker lifecycle holds the
//! matching [`LivenessWatch`]. Clearing the flag wakes the lifecycle
//! immediately instead of waiting for its next poll. Dropping the flag counts
//! as clearing it.

use tokio::sync::watch;

/// Create a connected flag/watch pair, initially alive
pub fn liveness() -> (LivenessFlag, LivenessWatch) {
    let (tx, rx) = watch::channel(true);
    (LivenessFlag { tx }, LivenessWatch { rx })
}

/// Writer side, owned by the active set entry
#[derive(Debug)]
pub struct LivenessFlag {
    tx: watch::Sender<bool>,
}

impl LivenessFlag {
    /// Ask the lifecycle to stop
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_alive(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Reader side, owned by the lifecycle
#[derive(Debug, Clone)]
pub struct LivenessWatch {
    rx: watch::Receiver<bool>,
}

impl LivenessWatch {
    /// Current value; false once the flag is cleared or dropped
    pub fn is_alive(&self) -> bool {
        *self.rx.borrow() && self.rx.has_changed().is_ok()
    }

    /// Resolve once the application should stop
    pub async fn stopped(&mut self) {
        // Err means the flag was dropped, which is also a stop.
        let _ = self.rx.wait_for(|alive| !*alive).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_initially_alive() {
        let (flag, watch) = liveness();
        assert!(flag.is_alive());
        assert!(watch.is_alive());
    }

    #[test]
    fn test_clear_is_observed() {
        let (flag, watch) = liveness();
        flag.clear();
        assert!(!flag.is_alive());
        assert!(!watch.is_alive());
    }

    #[test]
    fn test_drop_counts_as_stop() {
        let (flag, watch) = liveness();
        drop(flag);
        assert!(!watch.is_alive());
    }

    #[tokio::test]
    async fn test_stopped_wakes_on_clear() {
        let (flag, mut watch) = liveness();
        let waiter = tokio::spawn(async move {
            watch.stopped().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        flag.clear();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("lifecycle should wake promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_wakes_on_drop() {
        let (flag, mut watch) = liveness();
        drop(flag);
        tokio::time::timeout(Duration::from_secs(1), watch.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_returns_immediately_when_already_cleared() {
        let (flag, mut watch) = liveness();
        flag.clear();
        tokio::time::timeout(Duration::from_millis(100), watch.stopped())
            .await
            .unwrap();
    }
}
