//! Per-instance transforms for the external renderer.

use bytemuck::{Pod, Zeroable};
use mirrorline_core::EntityContainer;
use mirrorline_shared::{Bullet, Mat4, Player, Quaternion, Vec3, BULLET_SCALE};

/// One instance's model matrix, column-major, ready for an instance buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceTransform {
    /// Model matrix columns.
    pub model: [[f32; 4]; 4],
}

impl From<Mat4> for InstanceTransform {
    fn from(matrix: Mat4) -> Self {
        Self { model: matrix.cols }
    }
}

impl InstanceTransform {
    /// A player's transform: unit scale, its look rotation.
    #[must_use]
    pub fn for_player(player: &Player) -> Self {
        Mat4::from_scale_rotation_translation(1.0, player.rotation, player.position).into()
    }

    /// A bullet's transform: small, and pointing along its velocity.
    #[must_use]
    pub fn for_bullet(bullet: &Bullet) -> Self {
        let direction = bullet.velocity.normalize_or_zero();
        let rotation = if direction == Vec3::ZERO {
            Quaternion::IDENTITY
        } else {
            Quaternion::from_rotation_arc(-Vec3::Z, direction)
        };
        Mat4::from_scale_rotation_translation(BULLET_SCALE, rotation, bullet.position).into()
    }
}

/// Transforms for everything in a mirror, grouped by mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderInstances {
    /// One per live player.
    pub players: Vec<InstanceTransform>,
    /// One per live bullet.
    pub bullets: Vec<InstanceTransform>,
}

impl RenderInstances {
    /// Collects every live player and bullet in slot order.
    #[must_use]
    pub fn collect(container: &EntityContainer) -> Self {
        let players = container
            .storage::<Player>()
            .map(|s| s.iter().map(|(_, p)| InstanceTransform::for_player(p)).collect())
            .unwrap_or_default();
        let bullets = container
            .storage::<Bullet>()
            .map(|s| s.iter().map(|(_, b)| InstanceTransform::for_bullet(b)).collect())
            .unwrap_or_default();
        Self { players, bullets }
    }

    /// Player instances as raw bytes.
    #[must_use]
    pub fn player_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.players)
    }

    /// Bullet instances as raw bytes.
    #[must_use]
    pub fn bullet_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bullets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorline_core::Role;
    use mirrorline_shared::register_all;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_bullet_points_along_velocity() {
        let bullet = Bullet {
            position: Vec3::new(1.0, 0.0, 0.0),
            velocity: Vec3::new(0.0, 0.0, 5.0),
        };
        let transform = InstanceTransform::for_bullet(&bullet);
        let matrix = Mat4 { cols: transform.model };

        // local -Z (scaled) lands ahead of the bullet along +Z
        let tip = matrix.transform_point(-Vec3::Z);
        assert!(close(tip, Vec3::new(1.0, 0.0, BULLET_SCALE)), "{tip:?}");
    }

    #[test]
    fn test_resting_bullet_is_unrotated() {
        let bullet = Bullet::default();
        let transform = InstanceTransform::for_bullet(&bullet);
        let matrix = Mat4 { cols: transform.model };
        assert!(close(matrix.transform_point(Vec3::X), Vec3::X * BULLET_SCALE));
    }

    #[test]
    fn test_collect_and_bytes() {
        let mut container = EntityContainer::new(Role::Authority);
        register_all(&mut container).unwrap();
        container.storage_mut::<Player>().unwrap().emplace(Player::spawn());
        let bullets = container.storage_mut::<Bullet>().unwrap();
        bullets.emplace(Bullet::default());
        bullets.emplace(Bullet::default());

        let instances = RenderInstances::collect(&container);
        assert_eq!(instances.players.len(), 1);
        assert_eq!(instances.bullets.len(), 2);
        assert_eq!(instances.bullet_bytes().len(), 2 * 64);
        assert_eq!(instances.players[0].model, Mat4::IDENTITY.cols);
    }
}
