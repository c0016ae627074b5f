use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc};

use crate::TelloError;

/// A datagram received from the device, decoded as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
    pub from: SocketAddr,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>, from: SocketAddr) -> Self {
        Self {
            text: text.into(),
            from,
        }
    }

    /// Decodes a raw payload. Invalid UTF-8 is replaced rather than rejected,
    /// the device only ever sends ASCII.
    pub fn decode(payload: &[u8], from: SocketAddr) -> Self {
        Self::new(String::from_utf8_lossy(payload).into_owned(), from)
    }
}

/// FIFO of inbound messages between the transport and the command channel.
///
/// Unbounded: `push` never blocks the transport's receive task. Once closed,
/// pushes are refused and every pending `receive` resolves to
/// [`TelloError::ConnectionClosed`].
pub struct ResponseQueue {
    sender: mpsc::UnboundedSender<InboundMessage>,
    receiver: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl ResponseQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            sender,
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    /// Appends a message. Returns `false` if the queue is already closed.
    pub fn push(&self, message: InboundMessage) -> bool {
        if self.is_closed() {
            log::debug!("Dropping message from {} after close", message.from);
            return false;
        }

        self.sender.send(message).is_ok()
    }

    /// Waits for the oldest unread message.
    pub async fn receive(&self, timeout: Duration) -> Result<InboundMessage, TelloError> {
        // Registered before the flag check so a concurrent close cannot slip
        // between the check and the wait.
        let closed = self.close_notify.notified();

        if self.is_closed() {
            return Err(TelloError::ConnectionClosed);
        }

        let mut receiver = self.receiver.lock().await;

        tokio::select! {
            biased;

            _ = closed => Err(TelloError::ConnectionClosed),

            received = tokio::time::timeout(timeout, receiver.recv()) => match received {
                Ok(Some(message)) => Ok(message),
                Ok(None) => Err(TelloError::ConnectionClosed),
                Err(_) => Err(TelloError::Timeout(timeout)),
            },
        }
    }

    /// Removes and returns every message already buffered, without waiting.
    pub async fn drain(&self) -> Vec<InboundMessage> {
        let mut receiver = self.receiver.lock().await;
        let mut drained = Vec::new();

        while let Ok(message) = receiver.try_recv() {
            drained.push(message);
        }

        drained
    }

    /// Closes the queue and wakes all waiting receivers. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn peer() -> SocketAddr {
        "192.168.10.1:8889".parse().unwrap()
    }

    #[tokio::test]
    async fn receive_returns_messages_in_arrival_order() {
        let queue = ResponseQueue::new();
        assert!(queue.push(InboundMessage::new("ok", peer())));
        assert!(queue.push(InboundMessage::new("error", peer())));

        let first = queue.receive(Duration::from_millis(50)).await.unwrap();
        let second = queue.receive(Duration::from_millis(50)).await.unwrap();

        assert_eq!(first.text, "ok");
        assert_eq!(second.text, "error");
    }

    #[tokio::test]
    async fn receive_times_out_when_empty() {
        let queue = ResponseQueue::new();

        let err = queue.receive(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn close_wakes_pending_receiver() {
        let queue = Arc::new(ResponseQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.receive(Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("receiver should wake promptly")
            .unwrap();
        assert!(matches!(result, Err(TelloError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn push_after_close_is_refused() {
        let queue = ResponseQueue::new();
        queue.close();
        queue.close();

        assert!(!queue.push(InboundMessage::new("ok", peer())));
        assert!(matches!(
            queue.receive(Duration::from_millis(10)).await,
            Err(TelloError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn drain_empties_buffer() {
        let queue = ResponseQueue::new();
        queue.push(InboundMessage::new("late", peer()));
        queue.push(InboundMessage::new("later", peer()));

        let drained = queue.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(queue.drain().await.is_empty());
    }

    #[test]
    fn decode_replaces_invalid_utf8() {
        let message = InboundMessage::decode(b"ok\xff", peer());
        assert_eq!(message.text, "ok\u{fffd}");
    }
}
