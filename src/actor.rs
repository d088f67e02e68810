//! Actor-based engine driver: one task owns the `KcpEngine` and serializes
//! inbound datagrams, timers and application commands. Zero locks on the
//! hot path.

use crate::config::KcpConfig;
use crate::error::{ConnectionError, KcpError, Result};
use crate::message::{self, MessageKind};
use crate::transport::Transport;

use bytes::Bytes;
use kcp_gate_core::{time_diff, KcpEngine, KcpStats, Timestamp};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the inbound datagram queue feeding one actor.
pub(crate) const INPUT_QUEUE: usize = 256;

/// Capacity of the command queue feeding one actor.
pub(crate) const COMMAND_QUEUE: usize = 64;

/// Commands sent to the engine actor.
pub(crate) enum EngineCmd {
    Send {
        data: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<KcpStats>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Clonable, lock-free handle to the engine actor.
#[derive(Clone)]
pub(crate) struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCmd>,
}

impl EngineHandle {
    pub fn new(cmd_tx: mpsc::Sender<EngineCmd>) -> Self {
        Self { cmd_tx }
    }

    /// Send a command and wait for the reply. Returns a connection-closed error
    /// if the actor has exited.
    async fn request<R>(&self, cmd: impl FnOnce(oneshot::Sender<R>) -> EngineCmd) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(cmd(reply))
            .await
            .map_err(|_| KcpError::connection(ConnectionError::Closed))?;
        rx.await
            .map_err(|_| KcpError::connection(ConnectionError::Closed))
    }

    /// Queue one framed message (kind byte included).
    pub async fn send(&self, data: Bytes) -> Result<()> {
        self.request(|reply| EngineCmd::Send { data, reply }).await?
    }

    pub async fn stats(&self) -> Result<KcpStats> {
        self.request(|reply| EngineCmd::Stats { reply }).await
    }

    /// Start a graceful close and wait until the actor has finished it.
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| EngineCmd::Close { reply }).await
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Greeting sent or received, handshake not complete.
    Connecting,
    /// Application data flows both ways.
    Open,
    /// `Goodbye` sent; waiting for outstanding data to be acknowledged.
    Closing,
    /// The actor has exited.
    Closed,
}

/// Published by the actor on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Status {
    pub state: ConnectionState,
    /// Set once the connection is closed.
    pub reason: Option<ConnectionError>,
}

impl Status {
    pub fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

/// Monotonic millisecond clock for the engine, starting at zero.
struct Clock {
    origin: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> Timestamp {
        // wraps after ~49 days; the engine compares timestamps modularly
        self.origin.elapsed().as_millis() as Timestamp
    }
}

/// Everything one connection's task owns.
pub(crate) struct EngineActor<T: Transport> {
    engine: KcpEngine,
    transport: Arc<T>,
    peer: T::Addr,
    role: Role,
    config: KcpConfig,
    status: watch::Sender<Status>,
    data_tx: mpsc::Sender<Bytes>,
    greeting: Option<Bytes>,
    clock: Clock,
    last_recv: Instant,
    last_send: Instant,
    linger_deadline: Option<Instant>,
    close_waiters: Vec<oneshot::Sender<()>>,
}

impl<T: Transport> EngineActor<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: KcpEngine,
        transport: Arc<T>,
        peer: T::Addr,
        role: Role,
        config: KcpConfig,
        status: watch::Sender<Status>,
        data_tx: mpsc::Sender<Bytes>,
        greeting: Option<Bytes>,
    ) -> Self {
        let now = Instant::now();
        Self {
            engine,
            transport,
            peer,
            role,
            config,
            status,
            data_tx,
            greeting,
            clock: Clock::new(),
            last_recv: now,
            last_send: now,
            linger_deadline: None,
            close_waiters: Vec::new(),
        }
    }

    /// Run the actor loop until the connection closes.
    ///
    /// - `input_rx`: raw datagrams from the client receive task or the listener.
    /// - `cmd_rx`: application commands from [`EngineHandle`]s.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<EngineCmd>,
        mut input_rx: mpsc::Receiver<Bytes>,
    ) {
        self.engine.update(self.clock.now_ms());
        if let Some(greeting) = self.greeting.take() {
            if let Err(e) = self.engine.send(&greeting) {
                error!(conv = %self.engine.conv(), error = %e, "Failed to queue greeting");
                self.finish(ConnectionError::HandshakeFailed).await;
                return;
            }
        }

        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);

        let reason = loop {
            let flow = tokio::select! {
                biased;

                // Timer first so a busy input queue cannot starve retransmission
                _ = &mut sleep => {
                    let flow = self.on_tick().await;
                    sleep.as_mut().reset(Instant::now() + self.next_delay());
                    flow
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    // every handle dropped: the connection itself is gone
                    None => ControlFlow::Break(ConnectionError::Closed),
                },

                packet = input_rx.recv() => match packet {
                    Some(packet) => self.on_input(packet).await,
                    None => {
                        trace!(conv = %self.engine.conv(), "Input channel closed, stopping actor");
                        ControlFlow::Break(ConnectionError::Lost)
                    }
                },
            };

            if let ControlFlow::Break(reason) = flow {
                break reason;
            }
        };

        self.finish(reason).await;
    }

    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|status| status.state = state);
    }

    /// Time until the engine next needs `update`, between 1 ms and one interval.
    fn next_delay(&self) -> Duration {
        let now = self.clock.now_ms();
        let wait = time_diff(self.engine.check(now), now).clamp(1, self.engine.interval() as i32);
        Duration::from_millis(wait as u64)
    }

    async fn on_tick(&mut self) -> ControlFlow<ConnectionError> {
        self.engine.update(self.clock.now_ms());
        self.drain_messages()?;
        self.flush_output().await?;

        if self.engine.is_dead() {
            warn!(conv = %self.engine.conv(), peer = %self.peer, "Dead link, closing connection");
            return ControlFlow::Break(ConnectionError::Lost);
        }

        let now = Instant::now();
        if now.duration_since(self.last_recv) >= self.config.idle_timeout {
            info!(conv = %self.engine.conv(), peer = %self.peer, "Idle timeout");
            return ControlFlow::Break(ConnectionError::IdleTimeout);
        }

        match self.state() {
            ConnectionState::Open => {
                if now.duration_since(self.last_send) >= self.config.keep_alive {
                    self.queue(MessageKind::Ping, &[]);
                    self.flush_output().await?;
                }
            }
            ConnectionState::Closing => {
                let expired = self.linger_deadline.map_or(true, |deadline| now >= deadline);
                if self.engine.wait_snd() == 0 || expired {
                    debug!(
                        conv = %self.engine.conv(),
                        unacked = self.engine.wait_snd(),
                        "Close complete"
                    );
                    return ControlFlow::Break(ConnectionError::Closed);
                }
            }
            _ => {}
        }

        ControlFlow::Continue(())
    }

    async fn on_command(&mut self, cmd: EngineCmd) -> ControlFlow<ConnectionError> {
        match cmd {
            EngineCmd::Send { data, reply } => {
                let result = match self.state() {
                    ConnectionState::Open => self.engine.send(&data).map_err(KcpError::from),
                    ConnectionState::Connecting => {
                        Err(KcpError::connection(ConnectionError::NotConnected))
                    }
                    _ => Err(KcpError::connection(ConnectionError::Closed)),
                };
                if result.is_ok() {
                    self.engine.flush();
                    self.last_send = Instant::now();
                }
                let _ = reply.send(result);
                self.flush_output().await
            }
            EngineCmd::Stats { reply } => {
                let _ = reply.send(self.engine.stats());
                ControlFlow::Continue(())
            }
            EngineCmd::Close { reply } => {
                self.close_waiters.push(reply);
                if self.state() != ConnectionState::Closing {
                    self.queue(MessageKind::Goodbye, &[]);
                    self.set_state(ConnectionState::Closing);
                    self.linger_deadline = Some(Instant::now() + self.config.close_linger);
                    debug!(conv = %self.engine.conv(), peer = %self.peer, "Closing");
                }
                self.flush_output().await
            }
        }
    }

    async fn on_input(&mut self, packet: Bytes) -> ControlFlow<ConnectionError> {
        let reserved = self.config.reserved as usize;
        match packet.get(reserved..).map(|frames| self.engine.input(frames)) {
            Some(Ok(())) => self.last_recv = Instant::now(),
            Some(Err(e)) => {
                warn!(conv = %self.engine.conv(), peer = %self.peer, error = %e, "Dropping bad datagram");
            }
            None => {
                warn!(conv = %self.engine.conv(), peer = %self.peer, len = packet.len(), "Datagram shorter than reserved prefix");
            }
        }

        self.drain_messages()?;
        self.flush_output().await
    }

    /// Pull complete messages while the application queue has room.
    fn drain_messages(&mut self) -> ControlFlow<ConnectionError> {
        loop {
            let Ok(permit) = self.data_tx.try_reserve() else {
                return ControlFlow::Continue(());
            };
            let Some(msg) = self.engine.recv() else {
                return ControlFlow::Continue(());
            };

            match message::decode(msg) {
                Ok((MessageKind::Data, payload)) => {
                    if self.state() == ConnectionState::Connecting {
                        debug!(conv = %self.engine.conv(), "Data before handshake, dropped");
                    } else {
                        permit.send(payload);
                    }
                }
                Ok((MessageKind::Hello, _)) => {
                    drop(permit);
                    self.on_hello();
                }
                Ok((MessageKind::Goodbye, _)) => {
                    debug!(conv = %self.engine.conv(), peer = %self.peer, "Peer said goodbye");
                    return ControlFlow::Break(ConnectionError::Closed);
                }
                Ok((MessageKind::Ping, _)) => {
                    trace!(conv = %self.engine.conv(), "Ping");
                }
                Err(kind) => {
                    warn!(conv = %self.engine.conv(), kind = ?kind, "Unknown message kind, dropped");
                }
            }
        }
    }

    fn on_hello(&mut self) {
        if self.state() != ConnectionState::Connecting {
            trace!(conv = %self.engine.conv(), "Repeated hello ignored");
            return;
        }
        if self.role == Role::Server {
            self.queue(MessageKind::Hello, &[]);
        }
        self.set_state(ConnectionState::Open);
        info!(
            conv = %self.engine.conv(),
            peer = %self.peer,
            role = ?self.role,
            "Connection established"
        );
    }

    /// Queue a control message and push it out without waiting for the timer.
    fn queue(&mut self, kind: MessageKind, payload: &[u8]) {
        if let Err(e) = self.engine.send(&message::encode(kind, payload)) {
            warn!(conv = %self.engine.conv(), error = %e, "Failed to queue control message");
            return;
        }
        self.engine.flush();
        self.last_send = Instant::now();
    }

    /// Send all buffered output datagrams over the transport.
    async fn flush_output(&mut self) -> ControlFlow<ConnectionError> {
        for datagram in self.engine.drain_output() {
            if let Err(e) = self.transport.send_to(&datagram, &self.peer).await {
                error!(peer = %self.peer, error = %e, "Transport send failed");
                return ControlFlow::Break(ConnectionError::Lost);
            }
        }
        ControlFlow::Continue(())
    }

    async fn finish(mut self, reason: ConnectionError) {
        // best effort: acknowledge whatever arrived last (a peer's goodbye)
        self.engine.flush();
        let _ = self.flush_output().await;

        self.status.send_modify(|status| {
            status.state = ConnectionState::Closed;
            status.reason = Some(reason);
        });
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }

        let stats = self.engine.stats();
        info!(
            conv = %self.engine.conv(),
            peer = %self.peer,
            reason = %reason,
            bytes_sent = stats.bytes_sent,
            bytes_received = stats.bytes_received,
            retransmissions = stats.retransmissions,
            "Connection closed"
        );
    }
}
