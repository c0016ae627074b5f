use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tello::{DatagramTransport, InboundMessage, ResponseQueue, TelloError};

/// How the fake device answers the next datagram it is sent.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Respond(String),
    RespondAfter(String, Duration),
    Silent,
}

#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub payload: Vec<u8>,
    pub at: Instant,
}

impl SentDatagram {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeTransportStats {
    pub sent: Vec<SentDatagram>,
    pub close_calls: usize,
}

impl FakeTransportStats {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.iter().map(SentDatagram::text).collect()
    }
}

struct FakeTransportState {
    queue: Arc<ResponseQueue>,
    peer: SocketAddr,
    replies: Mutex<VecDeque<FakeReply>>,
    sent: Mutex<Vec<SentDatagram>>,
    send_error: Mutex<Option<io::ErrorKind>>,
    close_calls: AtomicUsize,
    closed: AtomicBool,
}

/// In-memory transport that records every send and answers from a script.
///
/// Once the script runs out the fake stays silent, so tests can drive
/// replies by hand with [`FakeTransport::deliver`].
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<FakeTransportState>,
}

impl FakeTransport {
    pub fn new(queue: Arc<ResponseQueue>) -> Self {
        Self {
            state: Arc::new(FakeTransportState {
                queue,
                peer: SocketAddr::from(([192, 168, 10, 1], 8889)),
                replies: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                send_error: Mutex::new(None),
                close_calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(FakeReply::Respond(reply.into()));
        self
    }

    pub fn with_delayed_reply(self, reply: impl Into<String>, delay: Duration) -> Self {
        self.push_reply(FakeReply::RespondAfter(reply.into(), delay));
        self
    }

    pub fn with_silence(self) -> Self {
        self.push_reply(FakeReply::Silent);
        self
    }

    /// Makes every subsequent `send` fail with `kind` before recording it.
    pub fn with_send_error(self, kind: io::ErrorKind) -> Self {
        *mutex_lock(&self.state.send_error) = Some(kind);
        self
    }

    pub fn push_reply(&self, reply: FakeReply) {
        mutex_lock(&self.state.replies).push_back(reply);
    }

    /// Injects an inbound datagram as if the device had sent it.
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        self.state
            .queue
            .push(InboundMessage::new(text, self.state.peer))
    }

    pub fn sent_count(&self) -> usize {
        mutex_lock(&self.state.sent).len()
    }

    pub fn stats(&self) -> FakeTransportStats {
        FakeTransportStats {
            sent: mutex_lock(&self.state.sent).clone(),
            close_calls: self.state.close_calls.load(Ordering::Relaxed),
        }
    }

    pub fn as_transport_arc(&self) -> Arc<dyn DatagramTransport> {
        Arc::new(self.clone())
    }

    /// Polls until `count` datagrams have been sent or `limit` elapses.
    pub async fn wait_for_sent(&self, count: usize, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;

        while Instant::now() < deadline {
            if self.sent_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        self.sent_count() >= count
    }
}

#[async_trait]
impl DatagramTransport for FakeTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TelloError> {
        if self.is_closed() {
            return Err(TelloError::ConnectionClosed);
        }

        let send_error = *mutex_lock(&self.state.send_error);
        if let Some(kind) = send_error {
            return Err(TelloError::Io(io::Error::new(kind, "fake send failure")));
        }

        mutex_lock(&self.state.sent).push(SentDatagram {
            payload: payload.to_vec(),
            at: Instant::now(),
        });

        let reply = mutex_lock(&self.state.replies).pop_front();

        match reply {
            Some(FakeReply::Respond(text)) => {
                self.deliver(text);
            }
            Some(FakeReply::RespondAfter(text, delay)) => {
                let fake = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    fake.deliver(text);
                });
            }
            Some(FakeReply::Silent) | None => {}
        }

        Ok(())
    }

    fn close(&self) {
        self.state.close_calls.fetch_add(1, Ordering::Relaxed);
        self.state.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.state.peer
    }
}

fn mutex_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
