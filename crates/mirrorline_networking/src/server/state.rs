//! # Server World State
//!
//! The authoritative replicated state plus the broadcast recipient set.
//!
//! ## Design
//!
//! The whole value sits behind one `parking_lot::Mutex`. Every method here
//! is a complete step (accept, apply, disconnect, tick) so callers hold the
//! lock for exactly one of them and never across network I/O.

use std::collections::BTreeMap;
use std::sync::Arc;

use mirrorline_core::{DispatchReport, EntityContainer, ReplicaResult, Role};
use mirrorline_shared::physics::{below_floor, integrate_bullet};
use mirrorline_shared::{register_all, Bullet, Player};
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;

use super::connection::{ClientConnection, ConnectionId, Delivery};
use crate::config::ServerConfig;
use crate::error::{NetError, NetResult};
use crate::transport::Frame;

/// Result of a successful accept.
#[derive(Clone, Debug)]
pub struct Admission {
    /// The new connection.
    pub connection: ConnectionId,
    /// Slot id of its player, sent to the client as its remote id.
    pub player_id: u32,
    /// Fires if the server drops the connection.
    pub evicted: Arc<Notify>,
}

/// What one broadcast tick produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Bullets removed by the floor check.
    pub bullets_removed: usize,
    /// Size of the broadcast frame body (0 if nothing changed).
    pub frame_bytes: usize,
    /// Recipients the frame was queued for.
    pub recipients: usize,
    /// Recipients dropped because their queue was full.
    pub evicted: usize,
}

/// Server world state.
pub struct ServerState {
    /// Authoritative storages.
    container: EntityContainer,
    /// Broadcast recipients.
    clients: BTreeMap<ConnectionId, ClientConnection>,
    /// Next connection id to hand out.
    next_connection: u32,
    /// Admission limit.
    max_clients: usize,
    /// Bullet physics.
    gravity: f32,
    floor_height: f32,
}

impl ServerState {
    /// Creates an empty world with every entity kind registered.
    ///
    /// # Errors
    ///
    /// Fails only if the entity kinds cannot be registered.
    pub fn new(config: &ServerConfig) -> ReplicaResult<Self> {
        let mut container = EntityContainer::new(Role::Authority);
        register_all(&mut container)?;
        Ok(Self {
            container,
            clients: BTreeMap::new(),
            next_connection: 0,
            max_clients: config.max_clients,
            gravity: config.gravity,
            floor_height: config.floor_height,
        })
    }

    /// The authoritative storages.
    #[must_use]
    pub const fn container(&self) -> &EntityContainer {
        &self.container
    }

    /// Mutable access to the storages, for seeding and tests.
    pub fn container_mut(&mut self) -> &mut EntityContainer {
        &mut self.container
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Looks up a connection.
    #[must_use]
    pub fn client(&self, id: ConnectionId) -> Option<&ClientConnection> {
        self.clients.get(&id)
    }

    /// Admits a new connection.
    ///
    /// In one step: snapshots the world, spawns the player, queues the text
    /// id frame and the snapshot, and adds the connection as a recipient.
    /// The new player itself is still pending, so it reaches this client and
    /// everyone else through the next diff.
    ///
    /// # Errors
    ///
    /// [`NetError::ServerFull`] at the client limit.
    pub fn accept(&mut self, outbound: Sender<Frame>) -> NetResult<Admission> {
        if self.clients.len() >= self.max_clients {
            return Err(NetError::ServerFull(self.max_clients));
        }

        let snapshot = self.container.encode_snapshot();
        let players = self.container.storage_mut::<Player>()?;
        let player_id = players.emplace(Player::spawn());
        players.get_mut(player_id)?.id = player_id;

        let connection = ConnectionId(self.next_connection);
        self.next_connection = self.next_connection.wrapping_add(1);

        let client = ClientConnection::new(connection, player_id, outbound);
        // A closed queue means the socket already died; the reader task
        // runs the disconnect.
        if client.send(Frame::Text(player_id.to_string())) != Delivery::Queued
            || client.send(Frame::Binary(snapshot)) != Delivery::Queued
        {
            tracing::debug!("{:?} closed during accept", connection);
        }
        let evicted = client.eviction();
        self.clients.insert(connection, client);

        Ok(Admission {
            connection,
            player_id,
            evicted,
        })
    }

    /// Applies one inbound binary frame from `connection` under its policy,
    /// then keeps that connection's player above the minimum height.
    ///
    /// Frames from unknown connections are ignored.
    pub fn apply(&mut self, connection: ConnectionId, bytes: &[u8]) -> DispatchReport {
        let Some(policy) = self.clients.get(&connection).map(ClientConnection::policy) else {
            return DispatchReport::default();
        };
        let report = self.container.dispatch_with(bytes, &policy);

        // The policy only lets a client touch its own player.
        if let Ok(player) = self
            .container
            .storage_mut::<Player>()
            .and_then(|players| players.get_mut(policy.player_id))
        {
            if player.clamp_height() {
                tracing::debug!("Clamped player {} to the minimum height", policy.player_id);
            }
        }
        report
    }

    /// Removes a connection and its player, and wakes its reader.
    ///
    /// Returns false if the connection was already gone.
    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        let Some(client) = self.clients.remove(&connection) else {
            return false;
        };
        client.evict();
        if let Ok(players) = self.container.storage_mut::<Player>() {
            if let Err(err) = players.remove(client.player_id) {
                tracing::warn!("Player {} of {:?} already gone: {}", client.player_id, connection, err);
            }
        }
        true
    }

    /// Advances bullet physics by `dt` and removes bullets below the floor.
    ///
    /// Returns the number of removed bullets.
    pub fn step_physics(&mut self, dt: f32) -> usize {
        let (gravity, floor) = (self.gravity, self.floor_height);
        self.container
            .storage_mut::<Bullet>()
            .map(|bullets| {
                bullets.retain(|_, bullet| {
                    integrate_bullet(bullet, dt, gravity);
                    !below_floor(bullet, floor)
                })
            })
            .unwrap_or(0)
    }

    /// Encodes this tick's diffs and state updates and queues them for
    /// every recipient.
    ///
    /// A recipient whose queue is full is disconnected; its player's removal
    /// goes out with the next tick.
    pub fn broadcast(&mut self) -> TickOutcome {
        let frame = self.container.encode_tick();
        if frame.is_empty() {
            return TickOutcome::default();
        }
        let mut outcome = TickOutcome {
            frame_bytes: frame.len(),
            ..TickOutcome::default()
        };
        let mut stalled = Vec::new();
        for client in self.clients.values() {
            match client.send(Frame::Binary(frame.clone())) {
                Delivery::Queued => outcome.recipients += 1,
                Delivery::Full => stalled.push(client.id),
                Delivery::Closed => {
                    tracing::debug!("Recipient {:?} has no writer, skipping", client.id);
                }
            }
        }
        for connection in stalled {
            tracing::warn!("Dropping {:?}: outbound queue full", connection);
            if self.disconnect(connection) {
                outcome.evicted += 1;
            }
        }
        outcome
    }

    /// One full tick: physics, then broadcast.
    pub fn tick(&mut self, dt: f32) -> TickOutcome {
        let bullets_removed = self.step_physics(dt);
        TickOutcome {
            bullets_removed,
            ..self.broadcast()
        }
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("container", &self.container)
            .field("clients", &self.clients.len())
            .finish()
    }
}
