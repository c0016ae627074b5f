use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::TelloError;
use crate::queue::{InboundMessage, ResponseQueue};

/// Largest datagram the device sends on the command port. Longer payloads
/// are cut off at this length.
const MAX_DATAGRAM_SIZE: usize = 2048;

/// Unacknowledged datagram delivery to a single fixed peer.
///
/// Implementations push every inbound payload into the [`ResponseQueue`]
/// they were opened with.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Sends one payload. No acknowledgement, no delivery guarantee.
    async fn send(&self, payload: &[u8]) -> Result<(), TelloError>;

    /// Releases the binding. Safe to call more than once.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn remote_addr(&self) -> SocketAddr;
}

pub fn parse_addr(addr: &str) -> Result<SocketAddr, TelloError> {
    addr.parse()
        .map_err(|e| TelloError::Bind(format!("invalid address '{addr}': {e}")))
}

/// UDP binding backed by a tokio socket and a receive task.
pub struct UdpTransport {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    receiver_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Binds `local_addr`, fixes `remote_addr` as the only peer and starts
    /// delivering inbound datagrams into `queue`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(
        local_addr: &str,
        remote_addr: &str,
        queue: Arc<ResponseQueue>,
    ) -> Result<Self, TelloError> {
        let local = parse_addr(local_addr)?;
        let remote = parse_addr(remote_addr)?;

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TelloError::Bind(format!("failed to bind {local}: {e}")))?;

        socket
            .connect(remote)
            .await
            .map_err(|e| TelloError::Bind(format!("failed to target {remote}: {e}")))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| TelloError::Bind(format!("failed to read local address: {e}")))?;

        log::info!("Command channel bound on {local_addr}, peer {remote}");

        let socket = Arc::new(socket);
        let receiver_task = tokio::spawn(run_receive_loop(Arc::clone(&socket), queue));

        Ok(Self {
            socket: Mutex::new(Some(socket)),
            receiver_task: Mutex::new(Some(receiver_task)),
            local_addr,
            remote_addr: remote,
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TelloError> {
        let socket = self.socket().ok_or(TelloError::ConnectionClosed)?;

        log::debug!(
            "Sending {:?} to {}",
            String::from_utf8_lossy(payload),
            self.remote_addr
        );

        socket.send(payload).await?;
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self
            .receiver_task
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
        {
            task.abort();
        }

        if let Ok(mut socket) = self.socket.lock() {
            socket.take();
        }

        log::info!("Command channel on {} closed", self.local_addr);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_receive_loop(socket: Arc<UdpSocket>, queue: Arc<ResponseQueue>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                if len == MAX_DATAGRAM_SIZE {
                    log::warn!(
                        "Datagram from {from} filled the receive buffer, payload may be cut off"
                    );
                }

                let message = InboundMessage::decode(&buf[..len], from);
                log::debug!("Received {:?} from {from}", message.text);

                if !queue.push(message) {
                    break;
                }
            }
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms when
                // the device is not up yet; the socket itself is still usable.
                log::warn!("Receive failed: {e}");
                if queue.is_closed() {
                    break;
                }
            }
        }
    }

    log::debug!("Receive loop finished");
}
