use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::TelloError;
use crate::queue::ResponseQueue;
use crate::transport::DatagramTransport;

/// The only reply the device sends for an accepted command.
pub const SUCCESS_RESPONSE: &str = "ok";

/// Outcome of a command the device answered.
///
/// A rejection is an ordinary result: the device refuses commands it cannot
/// execute (`error Not joystick`, `error Motor stop`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub accepted: bool,
    pub raw_response: String,
}

impl CommandResponse {
    pub fn from_reply(raw_response: impl Into<String>) -> Self {
        let raw_response = raw_response.into();

        Self {
            accepted: raw_response == SUCCESS_RESPONSE,
            raw_response,
        }
    }
}

/// The command currently awaiting its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub payload: Vec<u8>,
    pub sent_at: Instant,
}

/// Clears the pending slot when the send resolves, fails, or is dropped.
struct PendingSlot<'a> {
    slot: &'a Mutex<Option<PendingCommand>>,
}

impl<'a> PendingSlot<'a> {
    fn fill(slot: &'a Mutex<Option<PendingCommand>>, command: PendingCommand) -> Self {
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(command);
        }
        Self { slot }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.slot.lock() {
            guard.take();
        }
    }
}

/// Sends one command at a time and pairs it with the next inbound message.
///
/// The protocol carries no request id, so correlation is positional. Calls
/// are serialized: a second `send_command` waits until the first has
/// consumed its reply or timed out before anything is put on the wire.
pub struct CommandChannel {
    transport: Arc<dyn DatagramTransport>,
    queue: Arc<ResponseQueue>,
    in_flight: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingCommand>>,
    timeout: Duration,
}

impl CommandChannel {
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        queue: Arc<ResponseQueue>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            queue,
            in_flight: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn send_command(&self, payload: &[u8]) -> Result<CommandResponse, TelloError> {
        self.send_command_with_timeout(payload, self.timeout).await
    }

    pub async fn send_command_with_timeout(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<CommandResponse, TelloError> {
        let _in_flight = self.in_flight.lock().await;

        if self.queue.is_closed() || self.transport.is_closed() {
            return Err(TelloError::ConnectionClosed);
        }

        // Anything buffered now arrived while no command was pending: a reply
        // to a command that already timed out, or an unsolicited datagram.
        for stale in self.queue.drain().await {
            log::warn!(
                "Discarding stale response {:?} from {}",
                stale.text,
                stale.from
            );
        }

        let _pending = PendingSlot::fill(
            &self.pending,
            PendingCommand {
                payload: payload.to_vec(),
                sent_at: Instant::now(),
            },
        );

        self.transport.send(payload).await?;

        let message = match self.queue.receive(timeout).await {
            Ok(message) => message,
            Err(e) => {
                if e.is_timeout() {
                    log::warn!(
                        "No response to {:?} within {timeout:?}",
                        String::from_utf8_lossy(payload)
                    );
                }
                return Err(e);
            }
        };

        let response = CommandResponse::from_reply(message.text);

        log::debug!(
            "{:?} -> {:?} (accepted: {})",
            String::from_utf8_lossy(payload),
            response.raw_response,
            response.accepted
        );

        Ok(response)
    }

    /// The command awaiting its reply, if any.
    pub fn pending_command(&self) -> Option<PendingCommand> {
        self.pending.lock().ok().and_then(|guard| guard.clone())
    }
}
