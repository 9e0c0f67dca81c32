// Shutdown Token shared by the worker's long-running loops

use tokio::sync::watch;

/// Why the worker is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Termination signal (numeric value)
    Signal(i32),
    /// Unrecoverable fault elsewhere in the process
    Fault,
    /// Orderly stop requested by the owner (tests, embedding)
    Requested,
}

/// Shutdown signal observed by loops
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownToken {
    /// Reason, if shutdown was requested
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.rx.borrow()
    }

    pub fn is_shutdown(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait for shutdown. Resolves immediately if already requested.
    ///
    /// A dropped sender counts as `Requested`.
    pub async fn wait(&mut self) -> ShutdownReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return ShutdownReason::Requested;
            }
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownSender {
    /// Signal shutdown to every token. The first reason sticks.
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(None);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
