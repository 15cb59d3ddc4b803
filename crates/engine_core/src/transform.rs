//! Rigid pose with scale, used to place surfaces, cornices and blocks and to
//! move strike points between world and panel-local space.

use glam::{Quat, Vec3};

/// Position, rotation and per-axis scale of a placed object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Unscaled pose.
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Local +Y in world space (the panel normal for surfaces).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Local-space point to world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * (local * self.scale)
    }

    /// World-space point to local space. Zero scale components map to zero.
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        let unrotated = self.rotation.inverse() * (world - self.position);
        unrotated * safe_recip(self.scale)
    }

    /// Local direction to world space (rotation only).
    pub fn transform_direction(&self, local: Vec3) -> Vec3 {
        self.rotation * local
    }

    /// World direction to local space (rotation only).
    pub fn inverse_transform_direction(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * world
    }
}

fn safe_recip(v: Vec3) -> Vec3 {
    let r = |c: f32| if c.abs() > f32::EPSILON { 1.0 / c } else { 0.0 };
    Vec3::new(r(v.x), r(v.y), r(v.z))
}
