//! # Mirrorline Shared
//!
//! Types used by both client and server.
//!
//! Every entity kind here implements [`mirrorline_core::Replicated`] with an
//! explicit field order. Changing a field order is a wire break for every
//! peer, so do it on both ends at once.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod entities;
pub mod math;
pub mod physics;

pub use constants::{
    BULLET_SCALE, BULLET_SPEED, DEFAULT_PORT, DEFAULT_SERVER_ADDR, FLOOR_HEIGHT, GRAVITY,
    MAX_CLIENTS, MAX_FRAME_SIZE, MIN_PLAYER_HEIGHT, OUTBOUND_QUEUE_FRAMES, TICK_RATE,
};
pub use entities::{register_all, Bullet, Player};
pub use math::{Mat4, Quaternion, Vec3};
pub use physics::{below_floor, integrate_bullet};
