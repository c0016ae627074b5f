use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::TelloError;
use crate::channel::{CommandChannel, CommandResponse, PendingCommand, SUCCESS_RESPONSE};
use crate::config::SessionConfig;
use crate::queue::ResponseQueue;
use crate::transport::{DatagramTransport, UdpTransport};

/// Puts the device into SDK mode; nothing else is accepted before it.
pub const HANDSHAKE_COMMAND: &[u8] = b"command";

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Disconnected,
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            _ => SessionState::Closed,
        }
    }
}

/// A control session with one device.
///
/// Owns the transport and the response queue. The transport is released by
/// [`Session::close`], which also runs on drop, so every exit path tears the
/// binding down exactly once.
pub struct Session {
    config: SessionConfig,
    state: AtomicU8,
    queue: Arc<ResponseQueue>,
    transport: Mutex<Option<Arc<dyn DatagramTransport>>>,
    channel: OnceLock<CommandChannel>,
}

impl Session {
    /// A disconnected session that opens a UDP binding on `connect`.
    pub fn new(config: SessionConfig) -> Self {
        Self::build(config, Arc::new(ResponseQueue::new()), None)
    }

    /// A disconnected session over an already opened transport that feeds
    /// `queue`. `connect` only performs the handshake.
    pub fn with_transport(
        config: SessionConfig,
        transport: Arc<dyn DatagramTransport>,
        queue: Arc<ResponseQueue>,
    ) -> Self {
        Self::build(config, queue, Some(transport))
    }

    fn build(
        config: SessionConfig,
        queue: Arc<ResponseQueue>,
        transport: Option<Arc<dyn DatagramTransport>>,
    ) -> Self {
        Self {
            config,
            state: AtomicU8::new(SessionState::Disconnected as u8),
            queue,
            transport: Mutex::new(transport),
            channel: OnceLock::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn transition(&self, expected: SessionState, next: SessionState) -> Result<(), SessionState> {
        self.state
            .compare_exchange(
                expected as u8,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }

    /// Opens the transport (unless one was supplied) and performs the
    /// handshake. On any failure the transport is closed before the error is
    /// returned and the session ends up `Closed`.
    pub async fn connect(&self) -> Result<(), TelloError> {
        match self.transition(SessionState::Disconnected, SessionState::Connecting) {
            Ok(()) => {}
            Err(SessionState::Connected) => return Ok(()),
            Err(SessionState::Closed) => return Err(TelloError::ConnectionClosed),
            Err(_) => {
                return Err(TelloError::Connect(
                    "another connect is already in progress".into(),
                ));
            }
        }

        match self.establish().await {
            Ok(()) => {
                if self
                    .transition(SessionState::Connecting, SessionState::Connected)
                    .is_err()
                {
                    // Closed while the handshake was in flight.
                    return Err(TelloError::ConnectionClosed);
                }
                log::info!("Connected to {}", self.config.remote_addr);
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), TelloError> {
        let transport = match self.current_transport() {
            Some(transport) => transport,
            None => {
                let transport: Arc<dyn DatagramTransport> = Arc::new(
                    UdpTransport::open(
                        &self.config.local_addr,
                        &self.config.remote_addr,
                        Arc::clone(&self.queue),
                    )
                    .await?,
                );

                let mut slot = self
                    .transport
                    .lock()
                    .map_err(|_| TelloError::Connect("transport slot poisoned".into()))?;
                *slot = Some(Arc::clone(&transport));
                transport
            }
        };

        // A concurrent close may have run before the slot was filled.
        if self.state() == SessionState::Closed {
            transport.close();
            return Err(TelloError::ConnectionClosed);
        }

        let channel = self.channel.get_or_init(|| {
            CommandChannel::new(transport, Arc::clone(&self.queue), self.config.command_timeout())
        });

        let response = match channel.send_command(HANDSHAKE_COMMAND).await {
            Ok(response) => response,
            Err(TelloError::Timeout(after)) => {
                log::warn!("Handshake with {} timed out", self.config.remote_addr);
                return Err(TelloError::Connect(format!(
                    "no handshake response within {after:?}"
                )));
            }
            Err(TelloError::ConnectionClosed) => return Err(TelloError::ConnectionClosed),
            Err(e) => {
                log::warn!("Handshake with {} failed: {e}", self.config.remote_addr);
                return Err(TelloError::Connect(format!("handshake failed: {e}")));
            }
        };

        if !response.accepted {
            log::warn!("Handshake rejected: {:?}", response.raw_response);
            return Err(TelloError::Connect(format!(
                "handshake answered {:?}, expected {SUCCESS_RESPONSE:?}",
                response.raw_response
            )));
        }

        Ok(())
    }

    fn current_transport(&self) -> Option<Arc<dyn DatagramTransport>> {
        self.transport.lock().ok().and_then(|guard| guard.clone())
    }

    fn connected_channel(&self) -> Result<&CommandChannel, TelloError> {
        match self.state() {
            SessionState::Connected => self.channel.get().ok_or(TelloError::NotConnected),
            SessionState::Closed => Err(TelloError::ConnectionClosed),
            SessionState::Disconnected | SessionState::Connecting => {
                Err(TelloError::NotConnected)
            }
        }
    }

    /// Sends a command and waits for its reply with the configured timeout.
    pub async fn send_command(
        &self,
        command: impl AsRef<[u8]>,
    ) -> Result<CommandResponse, TelloError> {
        self.connected_channel()?
            .send_command(command.as_ref())
            .await
    }

    pub async fn send_command_with_timeout(
        &self,
        command: impl AsRef<[u8]>,
        timeout: Duration,
    ) -> Result<CommandResponse, TelloError> {
        self.connected_channel()?
            .send_command_with_timeout(command.as_ref(), timeout)
            .await
    }

    /// The command awaiting its reply, if any.
    pub fn pending_command(&self) -> Option<PendingCommand> {
        self.channel.get().and_then(CommandChannel::pending_command)
    }

    /// Closes the session. Pending commands fail with
    /// [`TelloError::ConnectionClosed`]. Idempotent.
    pub fn close(&self) {
        let previous = SessionState::from_u8(
            self.state
                .swap(SessionState::Closed as u8, Ordering::SeqCst),
        );

        if previous == SessionState::Closed {
            return;
        }

        self.queue.close();

        if let Some(transport) = self.current_transport() {
            transport.close();
        }

        log::info!("Session with {} closed", self.config.remote_addr);
    }

    /// Connects, runs `body`, and closes the session whether `body`
    /// succeeded or not.
    pub async fn scoped<F, Fut, T>(self, body: F) -> Result<T, TelloError>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T, TelloError>>,
    {
        let session = Arc::new(self);
        session.connect().await?;

        let outcome = body(Arc::clone(&session)).await;
        session.close();
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
