//! KCP listener: admits peers by HashCash token and demultiplexes datagrams
//! to per-connection actors.

use crate::actor::INPUT_QUEUE;
use crate::admission::{Admission, Rejection};
use crate::config::KcpConfig;
use crate::connection::KcpConnection;
use crate::error::{ConnectionError, KcpError, Result};
use crate::metrics::{ListenerMetrics, MetricsSnapshot};
use crate::transport::{Transport, UdpTransport};

use bytes::Bytes;
use dashmap::DashMap;
use kcp_gate_core::hashcash;
use kcp_gate_core::{KcpCoreConfig, KcpEngine};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Endpoint → connection input queue. The only state shared between the
/// listener handle and its receive task.
type Routes<A> = DashMap<A, mpsc::Sender<Bytes>>;

/// Accepts admitted connections on one bound transport.
pub struct KcpListener<T: Transport = UdpTransport> {
    config: KcpConfig,
    local_addr: T::Addr,
    routes: Arc<Routes<T::Addr>>,
    metrics: Arc<ListenerMetrics>,
    accept_rx: mpsc::Receiver<KcpConnection<T>>,
    listen_task: Option<JoinHandle<()>>,
}

// --- UDP-specific convenience methods ---

impl KcpListener<UdpTransport> {
    /// Bind to the specified address
    pub async fn bind(addr: SocketAddr, config: KcpConfig) -> Result<Self> {
        let transport = UdpTransport::bind(addr).await.map_err(KcpError::Io)?;
        Self::with_transport(Arc::new(transport), config).await
    }
}

// --- Generic methods for any Transport ---

impl<T: Transport> KcpListener<T> {
    /// Create a listener using a custom [`Transport`].
    pub async fn with_transport(transport: Arc<T>, config: KcpConfig) -> Result<Self> {
        config.validate()?;
        let local_addr = transport.local_addr().map_err(KcpError::Io)?;

        let routes = Arc::new(DashMap::new());
        let metrics = Arc::new(ListenerMetrics::default());
        let (accept_tx, accept_rx) = mpsc::channel(config.max_pending_connections);

        let demux = Demux {
            transport,
            config: config.clone(),
            routes: routes.clone(),
            admission: Admission::new(config.admission.clone()),
            metrics: metrics.clone(),
            accept_tx,
        };
        let listen_task = tokio::spawn(demux.run());

        info!(
            addr = %local_addr,
            resource = %config.admission.resource,
            difficulty = config.admission.difficulty_bits,
            "KCP listener started"
        );
        Ok(Self {
            config,
            local_addr,
            routes,
            metrics,
            accept_rx,
            listen_task: Some(listen_task),
        })
    }

    /// Wait for the next admitted connection that completes its handshake.
    ///
    /// Connections that close before reaching `Open` within `connect_timeout`
    /// are skipped. Fails with `Closed` once the listener has stopped.
    pub async fn accept(&mut self) -> Result<(KcpConnection<T>, T::Addr)> {
        loop {
            let conn = self
                .accept_rx
                .recv()
                .await
                .ok_or_else(|| KcpError::connection(ConnectionError::Closed))?;

            match tokio::time::timeout(self.config.connect_timeout, conn.wait_for_open()).await {
                Ok(Ok(())) => {
                    let peer = conn.peer_addr().clone();
                    debug!(peer = %peer, conv = %conn.conv(), "Connection handed to application");
                    return Ok((conn, peer));
                }
                Ok(Err(e)) => {
                    warn!(peer = %conn.peer_addr(), error = %e, "Connection closed before accept");
                }
                Err(_) => {
                    warn!(peer = %conn.peer_addr(), "Connection did not open in time");
                }
            }
        }
    }

    /// Get the local address
    pub fn local_addr(&self) -> &T::Addr {
        &self.local_addr
    }

    /// Admission counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Peers whose connection actor is still running.
    pub fn connection_count(&self) -> usize {
        self.routes.iter().filter(|route| !route.is_closed()).count()
    }

    /// Stop receiving. Established connections stop hearing from their peers
    /// and end at their idle timeout.
    pub fn close(&mut self) {
        if let Some(task) = self.listen_task.take() {
            task.abort();
            info!(addr = %self.local_addr, "KCP listener closed");
        }
    }
}

impl<T: Transport> Drop for KcpListener<T> {
    fn drop(&mut self) {
        if let Some(task) = self.listen_task.take() {
            task.abort();
        }
    }
}

/// The listener's receive task.
struct Demux<T: Transport> {
    transport: Arc<T>,
    config: KcpConfig,
    routes: Arc<Routes<T::Addr>>,
    admission: Admission,
    metrics: Arc<ListenerMetrics>,
    accept_tx: mpsc::Sender<KcpConnection<T>>,
}

impl<T: Transport> Demux<T> {
    async fn run(self) {
        let mut buf = vec![0u8; 65536];
        let mut cleanup = tokio::time::interval(self.config.cleanup_interval);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                recv = self.transport.recv_from(&mut buf) => match recv {
                    Ok((size, peer)) => {
                        trace!(peer = %peer, size, "Datagram received");
                        self.route(Bytes::copy_from_slice(&buf[..size]), peer);
                    }
                    // ICMP port unreachable from a departed client on some platforms
                    Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                    Err(e) => {
                        error!(error = %e, "Listener receive failed");
                        break;
                    }
                },

                _ = cleanup.tick() => self.cleanup(),
            }
        }
    }

    /// Hand a datagram to its peer's connection, or run admission for a new peer.
    fn route(&self, data: Bytes, peer: T::Addr) {
        let data = {
            let Some(route) = self.routes.get(&peer) else {
                return self.admit(data, peer);
            };
            match route.try_send(data) {
                Ok(()) => {
                    ListenerMetrics::incr(&self.metrics.routed);
                    return;
                }
                Err(TrySendError::Full(_)) => {
                    trace!(peer = %peer, "Connection input queue full, datagram dropped");
                    return;
                }
                // the connection ended; the peer may be opening a new one
                Err(TrySendError::Closed(data)) => data,
            }
        };

        self.routes.remove(&peer);
        debug!(peer = %peer, "Removed route to closed connection");
        self.admit(data, peer);
    }

    fn admit(&self, data: Bytes, peer: T::Addr) {
        let reserved = self.config.reserved as usize;
        let greeting = match self.admission.inspect(&data, reserved, hashcash::ticks_now()) {
            Ok(greeting) => greeting,
            Err(Rejection::Malformed(reason)) => {
                ListenerMetrics::incr(&self.metrics.malformed);
                debug!(peer = %peer, reason = %reason, "Dropped datagram from unknown peer");
                return;
            }
            Err(rejection @ Rejection::InvalidToken) => {
                ListenerMetrics::incr(&self.metrics.rejected_tokens);
                warn!(peer = %peer, reason = %rejection, "Greeting rejected");
                return;
            }
            Err(rejection @ Rejection::Replayed) => {
                ListenerMetrics::incr(&self.metrics.rejected_replays);
                warn!(peer = %peer, reason = %rejection, "Greeting rejected");
                return;
            }
        };

        let Ok(permit) = self.accept_tx.try_reserve() else {
            ListenerMetrics::incr(&self.metrics.backlog_overflow);
            warn!(peer = %peer, "Accept queue full, greeting dropped");
            return;
        };

        let engine = match KcpEngine::new(greeting.conv, KcpCoreConfig::from(&self.config)) {
            Ok(engine) => engine,
            Err(e) => {
                error!(peer = %peer, error = %e, "Failed to create engine");
                return;
            }
        };

        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        // the greeting itself is the connection's first input
        let _ = input_tx.try_send(data);
        self.routes.insert(peer.clone(), input_tx);

        let conn = KcpConnection::accept(
            engine,
            self.transport.clone(),
            peer.clone(),
            self.config.clone(),
            input_rx,
        );
        ListenerMetrics::incr(&self.metrics.admitted);
        debug!(
            peer = %peer,
            conv = %greeting.conv,
            counter = greeting.token.counter,
            "Greeting admitted"
        );
        info!(peer = %peer, conv = %greeting.conv, "Connection accepted");
        permit.send(conn);
    }

    /// Drop routes to finished connections and expired replay entries.
    fn cleanup(&self) {
        let before = self.routes.len();
        self.routes.retain(|_, route| !route.is_closed());
        let removed = before - self.routes.len();
        let purged = self.admission.purge(hashcash::ticks_now());

        if removed > 0 || purged > 0 {
            debug!(
                removed,
                purged,
                remaining = self.routes.len(),
                "Listener cleanup"
            );
        }
    }
}
