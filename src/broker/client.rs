//! Broker clients used by the publish and subscribe nodes.
//!
//! Both run on plain threads with blocking sockets: publishing happens inline on
//! the scheduler thread (bounded by the connect timeout), subscribing on a
//! background listener thread that hands frames to the node through a shared
//! queue.

use super::reconnect::Backoff;
use super::wire::{self, Envelope, MessageBuffer};
use super::TransportError;
use crate::config::BrokerConfig;
use crate::pipeline::frame::Frame;
use crate::pipeline::throttle::LogThrottle;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Where the broker lives. Passed explicitly to every broker-aware node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    address: String,
}

impl BrokerEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        self.address.to_socket_addrs()?.next().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to an address", self.address),
            ))
        })
    }

    /// Open a connection with the given timeout.
    pub fn connect(&self, timeout: Duration) -> Result<TcpStream, TransportError> {
        let stream = TcpStream::connect_timeout(&self.resolve()?, timeout)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl From<&BrokerConfig> for BrokerEndpoint {
    fn from(config: &BrokerConfig) -> Self {
        Self::new(config.address.clone())
    }
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// Sends frames to the broker.
#[cfg_attr(test, mockall::automock)]
pub trait Publisher: Send {
    fn publish(&mut self, topic: &str, frame: &Frame) -> Result<(), TransportError>;
}

/// Lazily connected, best-effort publisher.
///
/// While the broker is unreachable every publish fails fast with
/// `Disconnected`; a reconnect is attempted only once the backoff delay has
/// passed, so a tick never waits longer than one connect timeout.
pub struct PublisherConnection {
    endpoint: BrokerEndpoint,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    backoff: Backoff,
}

impl PublisherConnection {
    pub fn new(endpoint: BrokerEndpoint, config: &BrokerConfig) -> Self {
        Self {
            endpoint,
            connect_timeout: config.connect_timeout(),
            stream: None,
            backoff: Backoff::new(config.reconnect.clone()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn ensure_connected(&mut self) -> Result<&mut TcpStream, TransportError> {
        if self.stream.is_none() {
            let now = Instant::now();
            if !self.backoff.ready(now) {
                return Err(TransportError::Disconnected);
            }
            match self.endpoint.connect(self.connect_timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(self.connect_timeout))?;
                    tracing::info!(broker = %self.endpoint, "Publisher connected");
                    self.backoff.record_success();
                    self.stream = Some(stream);
                }
                Err(e) => {
                    self.backoff.record_failure(now);
                    return Err(e);
                }
            }
        }
        self.stream.as_mut().ok_or(TransportError::Disconnected)
    }

    /// Drop the connection; the next publish reconnects.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(broker = %self.endpoint, "Publisher disconnected");
        }
    }
}

impl Publisher for PublisherConnection {
    fn publish(&mut self, topic: &str, frame: &Frame) -> Result<(), TransportError> {
        let envelope = Envelope::Publish {
            topic: topic.to_string(),
            payload: wire::encode_frame(frame)?,
        };
        let stream = self.ensure_connected()?;
        if let Err(e) = wire::write_message(stream, &envelope) {
            self.stream = None;
            self.backoff.record_failure(Instant::now());
            return Err(e);
        }
        Ok(())
    }
}

/// Bounded frame queue shared between a listener thread and its node.
pub type FrameQueue = Arc<Mutex<VecDeque<Frame>>>;

/// Background thread that receives frames for a set of topics.
pub struct SubscriberListener {
    queue: FrameQueue,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl SubscriberListener {
    /// Start listening on `topics`. The thread connects, subscribes, and keeps
    /// reconnecting with backoff until `stop` is called.
    pub fn spawn(
        endpoint: BrokerEndpoint,
        config: &BrokerConfig,
        topics: Vec<String>,
    ) -> std::io::Result<Self> {
        let queue: FrameQueue = Arc::new(Mutex::new(VecDeque::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = ListenerWorker {
            endpoint,
            topics,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_queued: config.max_queued_frames.max(1),
            backoff: Backoff::new(config.reconnect.clone()),
            throttle: LogThrottle::default(),
            queue: Arc::clone(&queue),
            stop: Arc::clone(&stop),
            connected: Arc::clone(&connected),
            dropped: Arc::clone(&dropped),
        };
        let thread = std::thread::Builder::new()
            .name("fluxgraph-sub".into())
            .spawn(move || worker.run())?;

        Ok(Self {
            queue,
            stop,
            connected,
            dropped,
            thread: Some(thread),
        })
    }

    /// Take every frame received since the last call.
    pub fn drain(&self) -> Vec<Frame> {
        self.queue.lock().drain(..).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Frames dropped because the queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it. Returns within about one read timeout.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Subscriber listener thread panicked");
            }
        }
    }
}

impl Drop for SubscriberListener {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ListenerWorker {
    endpoint: BrokerEndpoint,
    topics: Vec<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_queued: usize,
    backoff: Backoff,
    throttle: LogThrottle,
    queue: FrameQueue,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl ListenerWorker {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(mut self) {
        while !self.stopping() {
            match self.connect_and_subscribe() {
                Ok(stream) => {
                    self.backoff.record_success();
                    self.connected.store(true, Ordering::Release);
                    tracing::info!(broker = %self.endpoint, topics = ?self.topics, "Subscriber connected");

                    let reason = self.read_loop(stream);
                    self.connected.store(false, Ordering::Release);
                    if self.stopping() {
                        break;
                    }
                    tracing::warn!(broker = %self.endpoint, reason = %reason, "Subscriber connection lost");
                }
                Err(e) => {
                    if let Some(suppressed) = self.throttle.check("connect") {
                        tracing::warn!(
                            broker = %self.endpoint,
                            error = %e,
                            attempt = self.backoff.attempt() + 1,
                            suppressed,
                            "Subscriber cannot reach broker"
                        );
                    }
                }
            }

            self.backoff.record_failure(Instant::now());
            if self.backoff.exhausted() {
                tracing::error!(broker = %self.endpoint, "Subscriber giving up after maximum retries");
                break;
            }
            self.sleep_interruptible(self.backoff.delay());
        }
    }

    fn connect_and_subscribe(&self) -> Result<TcpStream, TransportError> {
        let mut stream = self.endpoint.connect(self.connect_timeout)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_write_timeout(Some(self.connect_timeout))?;
        for topic in &self.topics {
            wire::write_message(&mut stream, &Envelope::Subscribe { topic: topic.clone() })?;
        }
        Ok(stream)
    }

    /// Read until the connection fails or a stop is requested.
    fn read_loop(&mut self, mut stream: TcpStream) -> TransportError {
        let mut buffer = MessageBuffer::new();
        let mut chunk = vec![0u8; 64 * 1024];

        loop {
            if self.stopping() {
                return TransportError::Disconnected;
            }
            match stream.read(&mut chunk) {
                Ok(0) => return TransportError::Disconnected,
                Ok(n) => buffer.extend(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return TransportError::Io(e),
            }

            loop {
                match buffer.next_message() {
                    Ok(Some(Envelope::Publish { topic, payload })) => self.accept(&topic, &payload),
                    Ok(Some(other)) => {
                        tracing::debug!(topic = %other.topic(), "Ignoring non-publish message");
                    }
                    Ok(None) => break,
                    // Framing is lost; reconnect
                    Err(e @ TransportError::MessageTooLarge { .. }) => return e,
                    Err(e) => {
                        if let Some(suppressed) = self.throttle.check("decode") {
                            tracing::warn!(error = %e, suppressed, "Dropping undecodable message");
                        }
                    }
                }
            }
        }
    }

    fn accept(&mut self, topic: &str, payload: &[u8]) {
        let frame = match wire::decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                if let Some(suppressed) = self.throttle.check("decode") {
                    tracing::warn!(topic = %topic, error = %e, suppressed, "Dropping undecodable frame");
                }
                return;
            }
        };

        let overflow = {
            let mut queue = self.queue.lock();
            let overflow = queue.len() >= self.max_queued;
            if overflow {
                queue.pop_front();
            }
            queue.push_back(frame);
            overflow
        };
        if overflow {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if let Some(suppressed) = self.throttle.check("overflow") {
                tracing::warn!(topic = %topic, suppressed, "Subscriber queue full, dropped oldest frame");
            }
        }
    }

    fn sleep_interruptible(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(20)));
        }
    }
}
