//! Bullet ballistics, run by the server every tick and by clients every frame.

use crate::entities::Bullet;

/// Advances a bullet by `dt` seconds under vertical acceleration `gravity`.
///
/// Explicit Euler: position moves with the old velocity, then gravity is
/// applied to the velocity.
#[inline]
pub fn integrate_bullet(bullet: &mut Bullet, dt: f32, gravity: f32) {
    bullet.position += bullet.velocity * dt;
    bullet.velocity.y += gravity * dt;
}

/// True once a bullet has fallen below the floor plane.
#[inline]
#[must_use]
pub fn below_floor(bullet: &Bullet, floor_height: f32) -> bool {
    bullet.position.y < floor_height
}
