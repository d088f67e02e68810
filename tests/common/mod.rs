//! Shared test helpers for KCP integration tests

#![allow(dead_code)]

use kcp_gate::{KcpConfig, KcpListener};
use kcp_gate_core::KcpEngine;
use std::net::SocketAddr;
use std::sync::Once;

/// Send all output packets from one engine into another engine's input.
pub fn transfer(src: &mut KcpEngine, dst: &mut KcpEngine) {
    for packet in src.drain_output() {
        let _ = dst.input(&packet);
    }
}

/// Install a fmt subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Cheap admission so tests do not spend their time mining.
pub fn test_config() -> KcpConfig {
    KcpConfig::gaming().resource("kcp-gate-test").difficulty(4)
}

/// Listener on an ephemeral loopback port.
pub async fn loopback_listener(config: KcpConfig) -> (KcpListener, SocketAddr) {
    let listener = KcpListener::bind("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("Failed to bind");
    let addr = *listener.local_addr();
    (listener, addr)
}
