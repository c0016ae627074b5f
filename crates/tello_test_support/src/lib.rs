pub mod fake_device;
pub mod fake_transport;
pub mod fixtures;

pub use fake_device::{FakeDevice, RunningDevice};
pub use fake_transport::{FakeReply, FakeTransport, FakeTransportStats, SentDatagram};
