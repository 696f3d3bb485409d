//! # Replication Server
//!
//! The authoritative server.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   REPLICATION SERVER                      │
//! ├───────────────────────────────────────────────────────────┤
//! │  accept loop ──► per connection: reader task, writer task │
//! │                         │                  ▲              │
//! │                         ▼ apply            │ mpsc queue   │
//! │              ┌─────────────────────────┐   │              │
//! │              │ Mutex<ServerState>      │───┘              │
//! │              │ - EntityContainer       │  broadcast       │
//! │              │ - recipients            │                  │
//! │              └─────────────────────────┘                  │
//! │                         ▲                                 │
//! │  tick task (interval) ──┘ physics, drain, broadcast       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers never hold the lock while waiting on the socket, and nothing
//! under the lock does network I/O: outbound frames go through bounded
//! queues drained by the writer tasks. A client whose queue fills is
//! dropped by the tick that found it full.

mod connection;
mod state;
mod tick;

pub use connection::{ClientConnection, ConnectionId, ConnectionPolicy, Delivery};
pub use state::{Admission, ServerState, TickOutcome};
pub use tick::{TickLoop, TickPhase, TickStats};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::ServerConfig;
use crate::error::NetResult;
use crate::transport::{read_frame, write_frame, Frame};

/// How often tick statistics are logged, in ticks.
const STATS_INTERVAL_TICKS: u64 = 150;

/// Stops a running server from another task.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signals every server task to finish.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The replication server.
pub struct ReplicationServer {
    /// Server configuration.
    config: ServerConfig,
    /// Bound listener.
    listener: TcpListener,
    /// Shared world behind the coarse lock.
    state: Arc<Mutex<ServerState>>,
    /// Shutdown signal.
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReplicationServer {
    /// Validates the config, builds the world and binds the listener.
    ///
    /// # Errors
    ///
    /// Invalid configuration or a failed bind.
    pub async fn bind(config: ServerConfig) -> NetResult<Self> {
        config.validate()?;
        let state = ServerState::new(&config)?;
        let listener = TcpListener::bind(config.bind_address).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!("Replication server listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            state: Arc::new(Mutex::new(state)),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared world state.
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<ServerState>> {
        Arc::clone(&self.state)
    }

    /// Handle that stops [`ReplicationServer::run`].
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the accept loop and the tick task until shut down.
    ///
    /// # Errors
    ///
    /// Returns only if the tick task cannot be joined; per-connection
    /// failures are logged and end that connection alone.
    pub async fn run(self) -> NetResult<()> {
        let tick_task = tokio::spawn(run_ticks(
            Arc::clone(&self.state),
            self.config.tick_rate,
            self.shutdown_rx.clone(),
        ));

        let mut shutdown = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&self.state),
                            self.config.max_frame_size,
                            self.config.outbound_queue,
                            self.shutdown_rx.clone(),
                        ));
                    }
                    Err(err) => tracing::error!("Accept failed: {}", err),
                },
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Shutting down replication server");
        if let Err(err) = tick_task.await {
            tracing::error!("Tick task panicked: {}", err);
        }
        Ok(())
    }
}

/// Fixed-rate physics and broadcast.
async fn run_ticks(state: Arc<Mutex<ServerState>>, tick_rate: u32, mut shutdown: watch::Receiver<bool>) {
    let mut tick_loop = TickLoop::new(tick_rate);
    let mut interval = tokio::time::interval(tick_loop.tick_duration());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let dt = tick_loop.dt();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        tick_loop.begin_tick();
        let outcome = {
            let mut world = state.lock();
            let bullets_removed = world.step_physics(dt);
            tick_loop.begin_broadcast();
            TickOutcome {
                bullets_removed,
                ..world.broadcast()
            }
        };
        tick_loop.end_tick();

        if outcome.evicted > 0 {
            tracing::warn!("Tick {}: dropped {} stalled clients", tick_loop.tick_count(), outcome.evicted);
        }

        if outcome.frame_bytes > 0 {
            tracing::trace!(
                "Tick {}: {} bytes to {} clients, {} bullets removed",
                tick_loop.tick_count(),
                outcome.frame_bytes,
                outcome.recipients,
                outcome.bullets_removed
            );
        }
        if tick_loop.tick_count() % STATS_INTERVAL_TICKS == 0 {
            let stats = tick_loop.stats();
            tracing::debug!(
                "Tick {} | mean {:?} max {:?} | late {:.2}%",
                tick_loop.tick_count(),
                stats.mean,
                stats.max,
                stats.late_percent()
            );
            tick_loop.reset_stats();
        }
    }
}

/// Accepts one client and serves it until its socket closes.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    max_frame_size: usize,
    outbound_queue: usize,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay failed for {}: {}", addr, err);
    }
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(outbound_queue);

    let admission = state.lock().accept(tx);
    let admission = match admission {
        Ok(admission) => admission,
        Err(err) => {
            tracing::warn!("Refused client {}: {}", addr, err);
            return;
        }
    };
    tracing::info!(
        "Client connected: {} (id: {}, player: {})",
        addr,
        admission.connection.0,
        admission.player_id
    );

    let writer_task = tokio::spawn(write_loop(writer, rx));
    let end = read_loop(reader, &admission, &state, max_frame_size, shutdown).await;

    // Dropping the recipient closes the queue, which ends the writer.
    state.lock().disconnect(admission.connection);
    tracing::info!("Client disconnected: {} (id: {}, {:?})", addr, admission.connection.0, end);
    match end {
        // The writer may be stuck on a peer that stopped reading.
        ReadEnd::Evicted | ReadEnd::Shutdown => writer_task.abort(),
        ReadEnd::Closed => {
            if let Err(err) = writer_task.await {
                tracing::error!("Writer task for {} panicked: {}", addr, err);
            }
        }
    }
}

/// Why a connection's read loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadEnd {
    /// EOF or a read error.
    Closed,
    /// The server dropped the connection.
    Evicted,
    /// Server shutdown.
    Shutdown,
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    admission: &Admission,
    state: &Mutex<ServerState>,
    max_frame_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> ReadEnd {
    let connection = admission.connection;
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, max_frame_size) => frame,
            () = admission.evicted.notified() => return ReadEnd::Evicted,
            _ = shutdown.changed() => return ReadEnd::Shutdown,
        };
        match frame {
            Ok(Some(Frame::Binary(bytes))) => {
                let report = state.lock().apply(connection, &bytes);
                if report.truncated {
                    tracing::warn!("{:?} sent a truncated frame", connection);
                }
            }
            Ok(Some(Frame::Text(text))) => {
                tracing::debug!("Ignoring text frame from {:?}: {:?}", connection, text);
            }
            Ok(None) => return ReadEnd::Closed,
            Err(err) => {
                tracing::warn!("Read from {:?} failed: {}", connection, err);
                return ReadEnd::Closed;
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame).await {
            tracing::debug!("Write failed: {}", err);
            break;
        }
    }
}

/// Runs a server until `duration` elapses (or forever with `None`).
///
/// # Errors
///
/// Propagates [`ReplicationServer::bind`] and [`ReplicationServer::run`] errors.
pub async fn serve_for(config: ServerConfig, duration: Option<Duration>) -> NetResult<()> {
    let server = ReplicationServer::bind(config).await?;
    if let Some(duration) = duration {
        let handle = server.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            handle.shutdown();
        });
    }
    server.run().await
}
