use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum DeviceAnswer {
    Reply(String),
    Ignore,
}

/// A scripted stand-in for the drone, listening on loopback UDP.
///
/// Answers `ok` to everything unless told otherwise.
pub struct FakeDevice {
    answers: HashMap<String, DeviceAnswer>,
    default_answer: DeviceAnswer,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            default_answer: DeviceAnswer::Reply("ok".to_string()),
        }
    }

    pub fn with_answer(mut self, command: impl Into<String>, reply: impl Into<String>) -> Self {
        self.answers
            .insert(command.into(), DeviceAnswer::Reply(reply.into()));
        self
    }

    /// Drops `command` without replying, like a lost datagram.
    pub fn ignoring(mut self, command: impl Into<String>) -> Self {
        self.answers.insert(command.into(), DeviceAnswer::Ignore);
        self
    }

    pub fn with_default_answer(mut self, reply: impl Into<String>) -> Self {
        self.default_answer = DeviceAnswer::Reply(reply.into());
        self
    }

    pub async fn start(self) -> io::Result<RunningDevice> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn(serve(socket, self, Arc::clone(&received)));

        Ok(RunningDevice {
            addr,
            received,
            task,
        })
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunningDevice {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl RunningDevice {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Commands received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        mutex_lock(&self.received).clone()
    }
}

impl Drop for RunningDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: UdpSocket, device: FakeDevice, received: Arc<Mutex<Vec<String>>>) {
    let mut buf = [0u8; 1024];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(read) => read,
            Err(e) => {
                log::warn!("Fake device receive failed: {e}");
                continue;
            }
        };

        let command = String::from_utf8_lossy(&buf[..len]).into_owned();
        mutex_lock(&received).push(command.clone());

        let answer = device
            .answers
            .get(&command)
            .unwrap_or(&device.default_answer);

        let DeviceAnswer::Reply(reply) = answer else {
            continue;
        };

        if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
            log::warn!("Fake device reply failed: {e}");
        }
    }
}

fn mutex_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
