//! # Mirror Client
//!
//! Client-side replication: a local mirror of the server's entities plus
//! an outbound input path.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      MIRROR CLIENT                        │
//! ├───────────────────────────────────────────────────────────┤
//! │  reader task ──► crossbeam queue ──► poll() ──► container │
//! │                                                   │       │
//! │  send(InputBatch) ──► mpsc ──► writer task        ▼       │
//! │                                        render_instances() │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound frames are queued by the reader task and applied only when the
//! owner calls [`MirrorClient::poll`], so the mirror changes at a point the
//! caller chooses (typically once per rendered frame).

mod input;
mod render;

pub use input::InputBatch;
pub use render::{InstanceTransform, RenderInstances};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use mirrorline_core::{EntityContainer, Role};
use mirrorline_shared::physics::integrate_bullet;
use mirrorline_shared::{register_all, Bullet, Player, GRAVITY};
use parking_lot::Mutex;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{NetError, NetResult};
use crate::transport::{read_frame, write_frame, Frame};

/// Client state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connected and mirroring.
    Connected,
}

/// What one [`MirrorClient::poll`] applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Frames dispatched.
    pub frames: usize,
    /// Records applied.
    pub applied: usize,
    /// Records or submessages skipped.
    pub skipped: usize,
    /// True once the connection is gone and every queued frame was applied.
    pub disconnected: bool,
}

/// A connected mirror of the server's world.
pub struct MirrorClient {
    /// Current state.
    state: ClientState,
    /// Server-assigned id of our player.
    remote_id: u32,
    /// Mirrored storages.
    container: Arc<Mutex<EntityContainer>>,
    /// Binary frames waiting for `poll`.
    inbound: Receiver<Vec<u8>>,
    /// Frames for the writer task.
    outbound: mpsc::UnboundedSender<Frame>,
    /// Cleared by the reader task when the socket closes.
    connected: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
}

impl MirrorClient {
    /// Connects, reads the id handshake and starts the I/O tasks.
    ///
    /// # Errors
    ///
    /// [`NetError::Io`] if the connection fails, [`NetError::Handshake`] if
    /// the first frame is not a decimal id, [`NetError::ConnectionClosed`]
    /// if the server hangs up first.
    pub async fn connect(config: &ClientConfig) -> NetResult<Self> {
        let stream = TcpStream::connect(&config.server_address).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let remote_id = match read_frame(&mut reader, config.max_frame_size).await? {
            Some(Frame::Text(text)) => text
                .trim()
                .parse::<u32>()
                .map_err(|_| NetError::Handshake(format!("expected a player id, got {text:?}")))?,
            Some(Frame::Binary(_)) => {
                return Err(NetError::Handshake("expected a text id frame first".into()));
            }
            None => return Err(NetError::ConnectionClosed),
        };

        let mut container = EntityContainer::new(Role::Mirror);
        register_all(&mut container)?;

        let connected = Arc::new(AtomicBool::new(true));
        let (inbound_tx, inbound) = crossbeam_channel::unbounded();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let reader_task = tokio::spawn(read_loop(
            reader,
            config.max_frame_size,
            inbound_tx,
            Arc::clone(&connected),
        ));
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = write_frame(&mut writer, &frame).await {
                    tracing::debug!("Client write failed: {}", err);
                    break;
                }
            }
        });

        tracing::info!("Connected to {} as player {}", config.server_address, remote_id);

        Ok(Self {
            state: ClientState::Connected,
            remote_id,
            container: Arc::new(Mutex::new(container)),
            inbound,
            outbound,
            connected,
            reader_task,
        })
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// Server-assigned id of the local player.
    #[inline]
    #[must_use]
    pub const fn remote_id(&self) -> u32 {
        self.remote_id
    }

    /// Shared handle to the mirrored storages.
    #[must_use]
    pub fn container(&self) -> Arc<Mutex<EntityContainer>> {
        Arc::clone(&self.container)
    }

    /// Applies every queued inbound frame.
    pub fn poll(&mut self) -> PollSummary {
        // Read the flag first: every frame queued before it was cleared is
        // drained below.
        let still_connected = self.connected.load(Ordering::Acquire);

        let mut summary = PollSummary::default();
        let mut container = self.container.lock();
        for bytes in self.inbound.try_iter() {
            let report = container.dispatch(&bytes);
            summary.frames += 1;
            summary.applied += report.applied;
            summary.skipped += report.skipped;
        }
        drop(container);

        if !still_connected && self.state == ClientState::Connected {
            tracing::info!("Connection to server lost");
            self.state = ClientState::Disconnected;
        }
        summary.disconnected = self.state == ClientState::Disconnected;
        summary
    }

    /// Queues an input batch for the server. Empty batches are not sent.
    ///
    /// # Errors
    ///
    /// [`NetError::ConnectionClosed`] once the writer task is gone.
    pub fn send(&self, batch: InputBatch) -> NetResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.outbound
            .send(Frame::Binary(batch.into_bytes()))
            .map_err(|_| NetError::ConnectionClosed)
    }

    /// Integrates mirrored bullets locally. Removal stays with the server.
    pub fn advance(&self, dt: f32) {
        let mut container = self.container.lock();
        if let Ok(bullets) = container.storage_mut::<Bullet>() {
            for (_, bullet) in bullets.iter_mut() {
                integrate_bullet(bullet, dt, GRAVITY);
            }
        }
    }

    /// Model matrices for every mirrored player and bullet.
    #[must_use]
    pub fn render_instances(&self) -> RenderInstances {
        RenderInstances::collect(&self.container.lock())
    }

    /// The mirrored copy of our own player, once the server has sent it.
    #[must_use]
    pub fn local_player(&self) -> Option<Player> {
        let container = self.container.lock();
        let slot = container.resolve_remote::<Player>(self.remote_id)?;
        container.storage::<Player>().ok()?.get(slot).ok().copied()
    }

    /// Number of live mirrored entities of kind `T`.
    #[must_use]
    pub fn live_count<T: mirrorline_core::Replicated>(&self) -> usize {
        self.container
            .lock()
            .storage::<T>()
            .map_or(0, mirrorline_core::SlotStorage::live_count)
    }
}

impl Drop for MirrorClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for MirrorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorClient")
            .field("state", &self.state)
            .field("remote_id", &self.remote_id)
            .field("queued", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    max_frame_size: usize,
    inbound: Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match read_frame(&mut reader, max_frame_size).await {
            Ok(Some(Frame::Binary(bytes))) => {
                if inbound.send(bytes).is_err() {
                    break;
                }
            }
            Ok(Some(Frame::Text(text))) => {
                tracing::debug!("Ignoring text frame from server: {:?}", text);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("Read from server failed: {}", err);
                break;
            }
        }
    }
    connected.store(false, Ordering::Release);
}
