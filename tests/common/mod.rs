//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use fluxgraph::config::{BrokerConfig, ReconnectConfig};
use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Broker settings with short timeouts so tests notice failures quickly.
pub fn fast_broker_config(address: &str) -> BrokerConfig {
    BrokerConfig {
        address: address.to_string(),
        connect_timeout_ms: 200,
        read_timeout_ms: 20,
        max_queued_frames: 64,
        reconnect: ReconnectConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            multiplier: 2.0,
            max_retries: 0,
            jitter: false,
        },
    }
}

/// An address with nothing listening on it.
pub fn unused_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
