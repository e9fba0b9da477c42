//! Delivery of worker messages to connected page contexts.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::messages::WorkerMessage;

/// Buffer size for the client broadcast channel.
/// A full refresh emits one message per manifest entry plus a terminal one.
const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// Port the worker reports through. Delivery is fire-and-forget: no
/// acknowledgment, no retry.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, message: WorkerMessage);
}

/// Fan-out to every connected client.
#[derive(Clone)]
pub struct ClientHub {
    tx: broadcast::Sender<WorkerMessage>,
}

impl ClientHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CLIENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Connect a client. It sees messages broadcast from now on.
    pub fn connect(&self) -> ClientHandle {
        ClientHandle {
            rx: self.tx.subscribe(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ClientHub {
    fn broadcast(&self, message: WorkerMessage) {
        if self.tx.send(message).is_err() {
            debug!("No connected clients, message dropped");
        }
    }
}

/// Receiving side held by one page context.
pub struct ClientHandle {
    rx: broadcast::Receiver<WorkerMessage>,
}

impl ClientHandle {
    /// Next message, or `None` once the hub is gone. Messages missed by a
    /// lagging client are skipped.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Client lagged behind, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`.
    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Client lagged behind, messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
