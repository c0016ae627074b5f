use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tello::{ResponseQueue, Session, SessionConfig};

use crate::FakeTransport;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(150);

/// Config pointing at a loopback device with an ephemeral local port.
pub fn loopback_config(device: SocketAddr, timeout: Duration) -> SessionConfig {
    SessionConfig {
        local_addr: "127.0.0.1:0".to_string(),
        remote_addr: device.to_string(),
        command_timeout_ms: timeout.as_millis() as u64,
    }
}

/// A session over a fresh [`FakeTransport`], not yet connected.
pub fn fake_session(timeout: Duration) -> (Session, FakeTransport) {
    let queue = Arc::new(ResponseQueue::new());
    let transport = FakeTransport::new(Arc::clone(&queue));

    let config = SessionConfig {
        command_timeout_ms: timeout.as_millis() as u64,
        ..SessionConfig::default()
    };

    let session = Session::with_transport(config, transport.as_transport_arc(), queue);
    (session, transport)
}

/// A session over a [`FakeTransport`] that already completed the handshake.
pub async fn connected_fake_session(timeout: Duration) -> (Arc<Session>, FakeTransport) {
    let (session, transport) = fake_session(timeout);
    transport.push_reply(crate::FakeReply::Respond("ok".to_string()));

    if let Err(e) = session.connect().await {
        panic!("fake handshake failed: {e}");
    }

    (Arc::new(session), transport)
}
