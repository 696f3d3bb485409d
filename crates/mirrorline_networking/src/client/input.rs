//! Outbound input batches.

use mirrorline_core::protocol::encode_entities;
use mirrorline_core::{Op, WireWriter};
use mirrorline_shared::{Bullet, Player};

/// Local input gathered since the last send.
///
/// Encodes to at most two submessages: one `Update` for players and one
/// `Instantiate` for fired bullets.
#[derive(Clone, Debug, Default)]
pub struct InputBatch {
    players: Vec<(u32, Player)>,
    bullets: Vec<Bullet>,
}

impl InputBatch {
    /// Empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Proposes a new state for the player with server id `remote_id`.
    pub fn update_player(&mut self, remote_id: u32, player: Player) -> &mut Self {
        self.players.push((remote_id, player));
        self
    }

    /// Requests a new bullet. The server assigns its id.
    pub fn fire(&mut self, bullet: Bullet) -> &mut Self {
        self.bullets.push(bullet);
        self
    }

    /// True if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.bullets.is_empty()
    }

    /// Encodes the batch as concatenated submessages.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        if !self.players.is_empty() {
            encode_entities(
                &mut writer,
                Op::Update,
                self.players.iter().map(|(id, player)| (*id, player)),
            );
        }
        if !self.bullets.is_empty() {
            // 0 asks the server to allocate
            encode_entities(&mut writer, Op::Instantiate, self.bullets.iter().map(|b| (0, b)));
        }
        writer.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorline_core::{EntityContainer, Role};
    use mirrorline_shared::{register_all, Vec3};

    #[test]
    fn test_empty_batch_encodes_nothing() {
        let batch = InputBatch::new();
        assert!(batch.is_empty());
        assert!(batch.into_bytes().is_empty());
    }

    #[test]
    fn test_batch_applies_on_authority() {
        let mut server = EntityContainer::new(Role::Authority);
        register_all(&mut server).unwrap();
        let id = server.storage_mut::<Player>().unwrap().emplace(Player::spawn());

        let mut moved = Player::spawn();
        moved.position = Vec3::new(1.0, 2.0, 3.0);
        moved.id = id;

        let mut batch = InputBatch::new();
        batch.update_player(id, moved).fire(moved.fire()).fire(moved.fire());
        let report = server.dispatch(&batch.into_bytes());

        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.submessages, 2);
        assert_eq!(report.applied, 3);
        assert_eq!(server.storage::<Player>().unwrap().get(id).unwrap(), &moved);
        assert_eq!(server.storage::<Bullet>().unwrap().live_count(), 2);
    }
}
