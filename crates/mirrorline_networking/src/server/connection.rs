//! # Client Connection Management
//!
//! Per-connection identity, outbound queue and the inbound admission policy.
//!
//! The outbound queue is bounded. A recipient whose queue fills up is not
//! reading its socket; the server evicts it instead of buffering for it.

use std::sync::Arc;

use mirrorline_core::{InboundPolicy, Op, Replicated, TypeTag};
use mirrorline_shared::{Bullet, Player};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;

use crate::transport::Frame;

/// Unique identifier for a client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    /// Invalid/null connection ID.
    pub const NULL: Self = Self(u32::MAX);

    /// Returns true if this is a null/invalid ID.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::NULL
    }
}

/// A broadcast recipient.
#[derive(Debug)]
pub struct ClientConnection {
    /// Connection ID.
    pub id: ConnectionId,
    /// Slot id of this connection's player.
    pub player_id: u32,
    /// Queue drained by the connection's writer task.
    outbound: Sender<Frame>,
    /// Wakes the connection's reader when the server drops it.
    evicted: Arc<Notify>,
}

/// Result of queueing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The writer task will send it.
    Queued,
    /// The queue is at capacity; the peer is not keeping up.
    Full,
    /// The writer task is gone.
    Closed,
}

impl ClientConnection {
    /// Creates a recipient.
    #[must_use]
    pub fn new(id: ConnectionId, player_id: u32, outbound: Sender<Frame>) -> Self {
        Self {
            id,
            player_id,
            outbound,
            evicted: Arc::new(Notify::new()),
        }
    }

    /// Queues a frame without blocking.
    pub fn send(&self, frame: Frame) -> Delivery {
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Signal fired when the server drops this connection.
    #[must_use]
    pub fn eviction(&self) -> Arc<Notify> {
        Arc::clone(&self.evicted)
    }

    /// Tells the connection's reader to stop. Safe to call before it waits.
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// What this connection may change in the world.
    #[must_use]
    pub const fn policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            player_id: self.player_id,
        }
    }
}

/// Inbound rules for one client: it may move its own player and fire bullets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// The only player this client may update.
    pub player_id: u32,
}

impl InboundPolicy for ConnectionPolicy {
    fn allows(&self, tag: TypeTag, op: Op, remote_id: u32) -> bool {
        match op {
            Op::Update => tag == Player::TAG && remote_id == self.player_id,
            Op::Instantiate => tag == Bullet::TAG,
            Op::Deinstantiate => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_null() {
        assert!(ConnectionId::default().is_null());
        assert!(!ConnectionId(3).is_null());
    }

    #[test]
    fn test_policy() {
        let policy = ConnectionPolicy { player_id: 2 };
        assert!(policy.allows(Player::TAG, Op::Update, 2));
        assert!(!policy.allows(Player::TAG, Op::Update, 3));
        assert!(!policy.allows(Player::TAG, Op::Instantiate, 0));
        assert!(policy.allows(Bullet::TAG, Op::Instantiate, 0));
        assert!(!policy.allows(Bullet::TAG, Op::Update, 0));
        assert!(!policy.allows(Player::TAG, Op::Deinstantiate, 2));
    }

    #[test]
    fn test_send_reports_full_and_closed() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(2);
        let connection = ClientConnection::new(ConnectionId(0), 0, tx);
        assert_eq!(connection.send(Frame::Text("0".into())), Delivery::Queued);
        assert_eq!(connection.send(Frame::Text("1".into())), Delivery::Queued);
        assert_eq!(connection.send(Frame::Text("2".into())), Delivery::Full);

        assert_eq!(rx.try_recv().ok(), Some(Frame::Text("0".into())));
        assert_eq!(connection.send(Frame::Text("3".into())), Delivery::Queued);

        drop(rx);
        assert_eq!(connection.send(Frame::Text("4".into())), Delivery::Closed);
    }

    #[tokio::test]
    async fn test_eviction_before_wait_is_kept() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let connection = ClientConnection::new(ConnectionId(0), 0, tx);
        let signal = connection.eviction();
        connection.evict();
        // the permit is stored, so a later wait returns at once
        tokio::time::timeout(std::time::Duration::from_secs(1), signal.notified())
            .await
            .unwrap();
    }
}
