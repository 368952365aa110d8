//! Publish/subscribe bridge between graphs and processes.
//!
//! # Architecture
//!
//! ```text
//! [publish node] ──PublisherConnection──► Broker ──► SubscriberListener ──► [subscribe node]
//!   graph A thread          TCP        tokio runtime     listener thread      graph B thread
//! ```
//!
//! Transport failures are never fatal: they are logged (rate-limited) and show
//! up downstream only as missing frames.

pub mod client;
pub mod reconnect;
pub mod server;
pub mod wire;

pub use client::{BrokerEndpoint, FrameQueue, Publisher, PublisherConnection, SubscriberListener};
pub use reconnect::Backoff;
pub use server::{Broker, BrokerHandle};
pub use wire::{Envelope, MAX_MESSAGE_SIZE};

use thiserror::Error;

/// Errors raised by broker clients and the wire codec.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Not connected to broker")]
    Disconnected,
}
