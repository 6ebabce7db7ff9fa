//! # Shutdown Signal
//!
//! One-shot, broadcast cancellation built on a `watch` channel. Every wait
//! in the engine (page requests, the inter-page delay, stream reads, the
//! reconnect backoff) races against [`Shutdown::triggered`].
//!
//! ```text
//! ShutdownHandle ──trigger()──► watch<bool> ──► Shutdown (clone per task)
//!                                                  │
//!                          tokio::select! { work, shutdown.triggered() }
//! ```

use std::time::Duration;
use tokio::sync::watch;

/// Creates a connected handle/signal pair.
pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

/// Requests shutdown. Held by whoever owns process lifetime (signal handler).
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signals every [`Shutdown`] clone. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Another receiver for the same signal.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes the shutdown request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        // With the sender gone, `triggered()` pends forever.
        let (_, rx) = watch::channel(false);
        Shutdown { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once shutdown is requested. Pends forever if the handle is
    /// dropped without triggering.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration` unless shutdown comes first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_trigger() {
        let (_handle, shutdown) = channel();
        let start = tokio::time::Instant::now();

        assert!(shutdown.sleep(Duration::from_secs(5)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_interrupts_sleep() {
        let (handle, shutdown) = channel();
        let sleeper = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { shutdown.sleep(Duration::from_secs(60)).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.trigger();

        assert!(!sleeper.await.unwrap());
        assert!(shutdown.is_triggered());
        assert!(handle.subscribe().is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_fires() {
        let (handle, shutdown) = channel();
        drop(handle);

        assert!(shutdown.sleep(Duration::from_secs(3)).await);
        assert!(!shutdown.is_triggered());
        assert!(Shutdown::never().sleep(Duration::from_secs(3)).await);
    }
}
