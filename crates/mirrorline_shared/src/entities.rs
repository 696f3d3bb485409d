//! # Replicated Entity Kinds
//!
//! Field order on the wire is declaration order, every float little-endian.
//! Non-finite floats are refused on decode so one peer cannot poison
//! another's simulation.

use mirrorline_core::{
    EntityContainer, ReplicaResult, Replicated, StateSync, WireReader, WireWriter,
};

use crate::constants::{BULLET_SPEED, MIN_PLAYER_HEIGHT};
use crate::math::{Quaternion, Vec3};

fn write_vec3(writer: &mut WireWriter, v: Vec3) {
    writer.write_f32(v.x);
    writer.write_f32(v.y);
    writer.write_f32(v.z);
}

fn read_finite(reader: &mut WireReader<'_>) -> Option<f32> {
    reader.read_f32().filter(|v| v.is_finite())
}

fn read_vec3(reader: &mut WireReader<'_>) -> Option<Vec3> {
    Some(Vec3::new(
        read_finite(reader)?,
        read_finite(reader)?,
        read_finite(reader)?,
    ))
}

/// A connected player's avatar.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Player {
    /// World position
    pub position: Vec3,
    /// Look orientation
    pub rotation: Quaternion,
    /// Server slot id of this player, written when the connection is accepted
    pub id: u32,
}

impl Player {
    /// Fresh avatar at the origin.
    #[must_use]
    pub const fn spawn() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quaternion::IDENTITY,
            id: 0,
        }
    }

    /// Direction the player is looking along (-Z in local space).
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation.rotate(-Vec3::Z)
    }

    /// Lifts the player back to [`MIN_PLAYER_HEIGHT`] if it went below.
    ///
    /// Returns true if the position changed.
    pub fn clamp_height(&mut self) -> bool {
        if self.position.y < MIN_PLAYER_HEIGHT {
            self.position.y = MIN_PLAYER_HEIGHT;
            return true;
        }
        false
    }

    /// A bullet leaving this player's position along its look direction.
    #[must_use]
    pub fn fire(&self) -> Bullet {
        Bullet {
            position: self.position,
            velocity: self.forward() * BULLET_SPEED,
        }
    }
}

impl Replicated for Player {
    const KIND: &'static str = "mirrorline.Player";

    fn encode(&self, writer: &mut WireWriter) {
        write_vec3(writer, self.position);
        writer.write_f32(self.rotation.x);
        writer.write_f32(self.rotation.y);
        writer.write_f32(self.rotation.z);
        writer.write_f32(self.rotation.w);
        writer.write_u32(self.id);
    }

    fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
        Some(Self {
            position: read_vec3(reader)?,
            rotation: Quaternion::new(
                read_finite(reader)?,
                read_finite(reader)?,
                read_finite(reader)?,
                read_finite(reader)?,
            ),
            id: reader.read_u32()?,
        })
    }
}

/// A projectile under gravity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bullet {
    /// World position
    pub position: Vec3,
    /// Velocity in m/s
    pub velocity: Vec3,
}

impl Replicated for Bullet {
    const KIND: &'static str = "mirrorline.Bullet";

    fn encode(&self, writer: &mut WireWriter) {
        write_vec3(writer, self.position);
        write_vec3(writer, self.velocity);
    }

    fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
        Some(Self {
            position: read_vec3(reader)?,
            velocity: read_vec3(reader)?,
        })
    }
}

/// Registers every kind with its broadcast mode.
///
/// Players are re-sent every tick; bullets only on spawn and removal, since
/// each peer integrates them locally.
///
/// # Errors
///
/// Fails if a kind is already registered or two tags collide.
pub fn register_all(container: &mut EntityContainer) -> ReplicaResult<()> {
    container.register::<Player>(StateSync::EveryTick)?;
    container.register::<Bullet>(StateSync::DiffsOnly)?;
    Ok(())
}
