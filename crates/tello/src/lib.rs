//! Async client for the Tello UDP command channel.
//!
//! Commands are plain-text datagrams; the device answers each one with a
//! single datagram (`ok`, or an error text). The protocol has no request
//! ids, so a [`Session`] keeps exactly one command in flight and pairs it
//! with the next message that arrives.

mod channel;
mod config;
mod error;
mod queue;
mod session;
mod status;
mod transport;

pub use channel::{CommandChannel, CommandResponse, PendingCommand, SUCCESS_RESPONSE};
pub use config::{
    ConfigStore, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_LOCAL_ADDR, DEFAULT_REMOTE_ADDR,
    SessionConfig,
};
pub use error::TelloError;
pub use queue::{InboundMessage, ResponseQueue};
pub use session::{HANDSHAKE_COMMAND, Session, SessionState};
pub use status::TelloStatus;
pub use transport::{DatagramTransport, UdpTransport, parse_addr};
