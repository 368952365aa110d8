//! Broker server.
//!
//! Central rendezvous for many-to-many pub/sub. Clients connect over TCP,
//! subscribe to topics and publish messages; the broker forwards each published
//! message to every current subscriber of its topic. It keeps no message
//! history and never looks inside payloads.

use super::wire::{self, Envelope, HEADER_SIZE};
use super::TransportError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Messages queued per client before further ones are dropped.
const CLIENT_QUEUE_CAPACITY: usize = 1024;

/// A connected client.
struct Client {
    addr: SocketAddr,
    tx: mpsc::Sender<Arc<Vec<u8>>>,
}

/// Subscription table: topic → subscribed clients.
#[derive(Default)]
struct BrokerState {
    subscriptions: RwLock<HashMap<String, Vec<Arc<Client>>>>,
}

impl BrokerState {
    fn subscribe(&self, topic: String, client: &Arc<Client>) {
        let mut subs = self.subscriptions.write();
        let clients = subs.entry(topic.clone()).or_default();
        if !clients.iter().any(|c| c.addr == client.addr) {
            clients.push(Arc::clone(client));
        }
        debug!(client = %client.addr, topic = %topic, "Subscribed");
    }

    fn unsubscribe(&self, topic: &str, addr: SocketAddr) {
        let mut subs = self.subscriptions.write();
        if let Some(clients) = subs.get_mut(topic) {
            clients.retain(|c| c.addr != addr);
            if clients.is_empty() {
                subs.remove(topic);
            }
            debug!(client = %addr, topic = %topic, "Unsubscribed");
        }
    }

    /// Forward a complete message (prefix included) to every subscriber.
    fn publish(&self, topic: &str, message: Arc<Vec<u8>>) -> usize {
        let subs = self.subscriptions.read();
        let Some(clients) = subs.get(topic) else {
            return 0;
        };
        let mut delivered = 0;
        for client in clients {
            match client.tx.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client = %client.addr, topic = %topic, "Subscriber lagging, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Remove a client from every topic.
    fn remove_client(&self, addr: SocketAddr) {
        let mut subs = self.subscriptions.write();
        for clients in subs.values_mut() {
            clients.retain(|c| c.addr != addr);
        }
        subs.retain(|_, clients| !clients.is_empty());
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions.read().get(topic).map_or(0, Vec::len)
    }

    fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        topics.sort();
        topics
    }
}

/// Entry point for running a broker.
pub struct Broker;

impl Broker {
    /// Bind `addr` and serve on a dedicated runtime thread.
    pub fn bind(addr: &str) -> Result<BrokerHandle, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("fluxgraph-broker")
            .enable_all()
            .build()?;

        let listener = runtime.block_on(TcpListener::bind(addr))?;
        let local_addr = listener.local_addr()?;
        let state = Arc::new(BrokerState::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let serve_state = Arc::clone(&state);
        let thread = std::thread::Builder::new()
            .name("fluxgraph-broker".into())
            .spawn(move || {
                runtime.block_on(serve(listener, serve_state, shutdown_rx));
                runtime.shutdown_timeout(Duration::from_millis(200));
            })?;

        info!(address = %local_addr, "Broker listening");
        Ok(BrokerHandle {
            local_addr,
            state,
            shutdown_tx,
            thread: Some(thread),
        })
    }
}

/// Handle to a running broker. Dropping it shuts the broker down.
pub struct BrokerHandle {
    local_addr: SocketAddr,
    state: Arc<BrokerState>,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl BrokerHandle {
    /// The bound address (useful after binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current number of subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state.subscriber_count(topic)
    }

    /// Topics with at least one subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.state.topics()
    }

    /// Stop accepting, disconnect every client and wait for the runtime to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Broker thread panicked");
            }
            info!(address = %self.local_addr, "Broker stopped");
        }
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(listener: TcpListener, state: Arc<BrokerState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(handle_client(stream, addr, Arc::clone(&state), shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Handle a single client connection until it disconnects or the broker stops.
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<BrokerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(client = %addr, "Client connected");

    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Arc<Vec<u8>>>(CLIENT_QUEUE_CAPACITY);
    let client = Arc::new(Client { addr, tx });

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if write_half.write_all(&message).await.is_err() {
                break;
            }
        }
    });

    loop {
        let result = tokio::select! {
            r = read_message(&mut read_half) => r,
            _ = shutdown.changed() => break,
        };
        match result {
            Ok((Envelope::Subscribe { topic }, _)) => state.subscribe(topic, &client),
            Ok((Envelope::Unsubscribe { topic }, _)) => state.unsubscribe(&topic, addr),
            Ok((Envelope::Publish { topic, .. }, raw)) => {
                state.publish(&topic, Arc::new(raw));
            }
            Err(TransportError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e @ TransportError::Decode(_)) => {
                warn!(client = %addr, error = %e, "Undecodable message ignored");
            }
            Err(e) => {
                warn!(client = %addr, error = %e, "Closing client connection");
                break;
            }
        }
    }

    state.remove_client(addr);
    write_task.abort();
    debug!(client = %addr, "Client disconnected");
}

/// Read one message, returning the envelope and the raw bytes (prefix included)
/// so publishes can be forwarded without re-encoding.
async fn read_message<R>(reader: &mut R) -> Result<(Envelope, Vec<u8>), TransportError>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let len = wire::body_len(header)?;

    let mut raw = vec![0u8; HEADER_SIZE + len];
    raw[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut raw[HEADER_SIZE..]).await?;
    let envelope = wire::decode(&raw[HEADER_SIZE..])?;
    Ok((envelope, raw))
}
