//! Shutdown signal shared by supervisors and workers.

use tokio::sync::watch;

/// Cloneable receiving side of the shutdown signal.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested, including before this call.
    pub async fn wait(&mut self) {
        // A dropped sender means the dispatcher is gone: treat as shutdown.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Signal shutdown to every token.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSender {
    fn default() -> Self {
        Self::new()
    }
}
