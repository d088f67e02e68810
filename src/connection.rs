//! Message-oriented KCP connection
//!
//! A [`KcpConnection`] is a thin handle over an engine actor task. The client
//! side owns its socket and runs a receive task that feeds the actor; the
//! server side is fed by the listener's demultiplexer.

use crate::actor::{
    ConnectionState, EngineActor, EngineHandle, Role, Status, COMMAND_QUEUE, INPUT_QUEUE,
};
use crate::admission;
use crate::config::KcpConfig;
use crate::error::{ConnectionError, KcpError, Result};
use crate::message::{self, MessageKind};
use crate::transport::{Transport, UdpTransport};

use bytes::Bytes;
use kcp_gate_core::{random_conv_id, ConvId, KcpCoreConfig, KcpEngine, KcpStats};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// One admitted, reliable, ordered message channel to a peer.
pub struct KcpConnection<T: Transport = UdpTransport> {
    handle: EngineHandle,
    data_rx: mpsc::Receiver<Bytes>,
    status: watch::Receiver<Status>,
    transport: Arc<T>,
    peer: T::Addr,
    conv: ConvId,
    actor_task: JoinHandle<()>,
    recv_task: Option<JoinHandle<()>>,
}

// --- UDP-specific convenience methods ---

impl KcpConnection<UdpTransport> {
    /// Connect to a listener at `addr` over a fresh ephemeral UDP socket.
    pub async fn connect(addr: SocketAddr, config: KcpConfig) -> Result<Self> {
        let transport = UdpTransport::bind_for(addr).await?;
        trace!(local = ?transport.local_addr().ok(), peer = %addr, "Client socket bound");
        Self::connect_with_transport(Arc::new(transport), addr, config).await
    }
}

// --- Generic methods for any Transport ---

impl<T: Transport> KcpConnection<T> {
    /// Run the client handshake over a custom [`Transport`].
    ///
    /// Mines an admission token, sends it as the greeting and waits up to
    /// `connect_timeout` for the server's `Hello`. Any failure surfaces as
    /// [`ConnectionError::HandshakeFailed`], except config and mining errors.
    pub async fn connect_with_transport(
        transport: Arc<T>,
        peer: T::Addr,
        config: KcpConfig,
    ) -> Result<Self> {
        config.validate()?;

        let token = admission::mine_token(&config.admission).await?;
        let conv = random_conv_id();
        let engine = KcpEngine::new(conv, KcpCoreConfig::from(&config))?;
        let greeting = message::encode(MessageKind::Hello, &token.encode());

        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        let recv_task = tokio::spawn(client_recv_loop(transport.clone(), peer.clone(), input_tx));

        let connect_timeout = config.connect_timeout;
        let mut conn = Self::spawn(
            engine,
            transport,
            peer,
            Role::Client,
            config,
            input_rx,
            Some(greeting),
        );
        conn.recv_task = Some(recv_task);
        debug!(conv = %conv, peer = %conn.peer, "Greeting sent");

        match tokio::time::timeout(connect_timeout, conn.wait_for_open()).await {
            Ok(Ok(())) => {
                info!(conv = %conv, peer = %conn.peer, "Connected");
                Ok(conn)
            }
            Ok(Err(e)) => {
                warn!(conv = %conv, peer = %conn.peer, error = %e, "Handshake failed");
                Err(KcpError::connection(ConnectionError::HandshakeFailed))
            }
            Err(_) => {
                warn!(
                    conv = %conv,
                    peer = %conn.peer,
                    timeout_ms = connect_timeout.as_millis() as u64,
                    "Handshake timed out"
                );
                Err(KcpError::connection(ConnectionError::HandshakeFailed))
            }
        }
    }

    /// Server side of an admitted greeting; datagrams arrive on `input_rx`.
    pub(crate) fn accept(
        engine: KcpEngine,
        transport: Arc<T>,
        peer: T::Addr,
        config: KcpConfig,
        input_rx: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self::spawn(engine, transport, peer, Role::Server, config, input_rx, None)
    }

    fn spawn(
        engine: KcpEngine,
        transport: Arc<T>,
        peer: T::Addr,
        role: Role,
        config: KcpConfig,
        input_rx: mpsc::Receiver<Bytes>,
        greeting: Option<Bytes>,
    ) -> Self {
        let conv = engine.conv();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (data_tx, data_rx) = mpsc::channel(config.message_queue);
        let (status_tx, status_rx) = watch::channel(Status::connecting());

        let actor = EngineActor::new(
            engine,
            transport.clone(),
            peer.clone(),
            role,
            config,
            status_tx,
            data_tx,
            greeting,
        );
        let actor_task = tokio::spawn(actor.run(cmd_rx, input_rx));

        Self {
            handle: EngineHandle::new(cmd_tx),
            data_rx,
            status: status_rx,
            transport,
            peer,
            conv,
            actor_task,
            recv_task: None,
        }
    }

    /// Send one message. Fails with `NotConnected` before the handshake and
    /// `Closed` once closing has started.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.handle
            .send(message::encode(MessageKind::Data, data))
            .await
    }

    /// Wait for the next message. Once the connection has closed and every
    /// delivered message was read, returns the close reason as a
    /// connection error.
    pub async fn receive(&mut self) -> Result<Bytes> {
        match self.data_rx.recv().await {
            Some(data) => Ok(data),
            None => Err(KcpError::connection(
                self.close_reason().unwrap_or(ConnectionError::Closed),
            )),
        }
    }

    /// Graceful close: send `Goodbye` and linger until outstanding data is
    /// acknowledged or `close_linger` elapses. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state() != ConnectionState::Closed {
            match self.handle.close().await {
                Ok(()) => {}
                Err(e) if e.is_closed() => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        Ok(())
    }

    /// Wait until the actor exits and return why it did.
    pub async fn closed(&self) -> ConnectionError {
        let mut status = self.status.clone();
        let reason = match status.wait_for(|s| s.state == ConnectionState::Closed).await {
            Ok(status) => status.reason,
            Err(_) => None,
        };
        reason.unwrap_or(ConnectionError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Why the connection closed, once it has.
    pub fn close_reason(&self) -> Option<ConnectionError> {
        self.status.borrow().reason
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Engine statistics, fetched from the actor.
    pub async fn stats(&self) -> Result<KcpStats> {
        self.handle.stats().await
    }

    pub fn conv(&self) -> ConvId {
        self.conv
    }

    pub fn peer_addr(&self) -> &T::Addr {
        &self.peer
    }

    pub fn local_addr(&self) -> Result<T::Addr> {
        self.transport.local_addr().map_err(KcpError::Io)
    }

    pub(crate) async fn wait_for_open(&self) -> Result<()> {
        let mut status = self.status.clone();
        let status = *status
            .wait_for(|s| s.state != ConnectionState::Connecting)
            .await
            .map_err(|_| KcpError::connection(ConnectionError::Closed))?;

        match status.state {
            ConnectionState::Open => Ok(()),
            _ => Err(KcpError::connection(
                status.reason.unwrap_or(ConnectionError::Closed),
            )),
        }
    }
}

impl<T: Transport> Drop for KcpConnection<T> {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.actor_task.abort();
    }
}

impl<T: Transport> std::fmt::Debug for KcpConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KcpConnection")
            .field("conv", &self.conv)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}

/// Client receive task: forward datagrams from `peer` to the actor.
async fn client_recv_loop<T: Transport>(
    transport: Arc<T>,
    peer: T::Addr,
    input_tx: mpsc::Sender<Bytes>,
) {
    let mut buf = vec![0u8; 65536];
    loop {
        match transport.recv_from(&mut buf).await {
            Ok((size, from)) if from == peer => {
                match input_tx.try_send(Bytes::copy_from_slice(&buf[..size])) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        trace!(peer = %peer, size, "Input queue full, datagram dropped");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            Ok((_, from)) => {
                trace!(from = %from, "Datagram from unexpected address dropped");
            }
            // ICMP port unreachable surfaces here on some platforms
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                trace!(peer = %peer, "Peer port unreachable");
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "Transport receive failed");
                break;
            }
        }
    }
}
