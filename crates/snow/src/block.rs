//! Pre-placed snow blocks that can be knocked off or smashed.

use crate::error::{Result, SnowError};
use glam::{EulerRot, Quat, Vec3};
use physics::{BodyDesc, ColliderHandle, ColliderMaterial, ColliderTag, PhysicsWorld, RigidBodyHandle};
use rand::Rng;

/// Squared speed a touching body needs to knock a resting block loose.
const KNOCK_SPEED_SQ: f32 = 0.35;
const KNOCK_SCALE: f32 = 0.04;
const KNOCK_RANGE: (f32, f32) = (0.2, 0.8);
const PIECE_DAMPING: f32 = 2.0;
const PIECE_MIN_SIZE: f32 = 0.03;

#[derive(Debug, Clone)]
pub struct SnowBlockConfig {
    pub position: Vec3,
    pub rotation: Quat,
    /// Edge length of the cube.
    pub size: f32,
    pub mass: f32,
    pub hit_force: f32,
    pub slide_direction: Vec3,
    pub breakable: bool,
    pub pieces: usize,
}

impl Default for SnowBlockConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            size: 0.3,
            mass: 1.0,
            hit_force: 3.0,
            slide_direction: Vec3::NEG_Y,
            breakable: true,
            pieces: 4,
        }
    }
}

/// Loose debris from a smashed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPiece {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
}

#[derive(Debug)]
pub enum BlockHit {
    /// Knocked free in one piece.
    Pushed,
    /// Smashed; the caller should despawn the block.
    Broken(Vec<BlockPiece>),
}

#[derive(Debug)]
pub struct SnowBlock {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    size: f32,
    hit_force: f32,
    slide_direction: Vec3,
    breakable: bool,
    pieces: usize,
}

impl SnowBlock {
    /// Place a kinematic block that hangs in place until disturbed.
    pub fn place(physics: &mut PhysicsWorld, config: SnowBlockConfig) -> Result<Self> {
        if config.size <= 0.0 || config.mass <= 0.0 {
            return Err(SnowError::InvalidBlock(format!(
                "size {} and mass {} must be positive",
                config.size, config.mass
            )));
        }
        let body = physics.add_body(
            config.position,
            config.rotation,
            BodyDesc {
                kinematic: true,
                ..Default::default()
            },
        );
        let collider = physics.add_box_collider(
            body,
            Vec3::splat(config.size * 0.5),
            ColliderTag::Block,
            ColliderMaterial::new(0.3, 0.0),
            Some(config.mass),
        );
        Ok(Self {
            body,
            collider,
            size: config.size,
            hit_force: config.hit_force,
            slide_direction: config.slide_direction,
            breakable: config.breakable,
            pieces: config.pieces,
        })
    }

    pub fn body(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }

    /// Slide direction, or straight down when none is set.
    fn direction(&self) -> Vec3 {
        if self.slide_direction.length_squared() > 0.01 {
            self.slide_direction.normalize()
        } else {
            Vec3::NEG_Y
        }
    }

    pub fn is_resting(&self, physics: &PhysicsWorld) -> bool {
        !physics.is_dynamic(self.body)
    }

    pub fn hit<R: Rng>(&mut self, physics: &mut PhysicsWorld, rng: &mut R, hit_point: Vec3) -> BlockHit {
        let dir = self.direction();
        if !(self.breakable && self.pieces > 1) {
            physics.release_body(self.body);
            physics.apply_impulse(self.body, dir * self.hit_force);
            return BlockHit::Pushed;
        }

        let mass = physics.body_mass(self.body).unwrap_or(1.0);
        let piece_edge = (self.size * 0.5 * 0.7).max(PIECE_MIN_SIZE);
        let spread = self.size * 0.1;
        let scatter = self.size * 0.06;

        let pieces = (0..self.pieces)
            .map(|i| {
                let jitter = Vec3::new(
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                )
                .clamp_length_max(1.0);
                let offset = (i as f32 - (self.pieces as f32 - 1.0) * 0.5) * spread;
                let position = hit_point + dir * offset + jitter * scatter;
                let rotation = Quat::from_euler(
                    EulerRot::XYZ,
                    rng.gen_range(0.0..std::f32::consts::TAU),
                    rng.gen_range(0.0..std::f32::consts::TAU),
                    rng.gen_range(0.0..std::f32::consts::TAU),
                );
                let body = physics.add_body(
                    position,
                    rotation,
                    BodyDesc {
                        linear_damping: PIECE_DAMPING,
                        ..Default::default()
                    },
                );
                let collider = physics.add_box_collider(
                    body,
                    Vec3::splat(piece_edge * 0.5),
                    ColliderTag::Block,
                    ColliderMaterial::new(0.3, 0.0),
                    Some(mass / self.pieces as f32),
                );
                physics.apply_impulse(body, dir * self.hit_force * 0.2);
                BlockPiece { body, collider }
            })
            .collect();
        BlockHit::Broken(pieces)
    }

    /// Free a resting block when something fast bumps into it.
    /// Returns true if it was knocked loose this call.
    pub fn check_knock_loose(&mut self, physics: &mut PhysicsWorld) -> bool {
        if !self.is_resting(physics) {
            return false;
        }
        // The solver has already stopped the other body by the time we look,
        // so recover its impact speed from the contact impulse as well.
        let bump = physics
            .contacts(self.collider)
            .into_iter()
            .filter_map(|c| physics.collider_parent(c.other).map(|body| (body, c.impulse)))
            .filter(|&(other, _)| physics.is_dynamic(other))
            .filter_map(|(other, impulse)| {
                let velocity = physics.body_velocity(other)?;
                let mass = physics.body_mass(other)?;
                let impact = if mass > 0.0 { impulse / mass } else { 0.0 };
                Some(velocity.length_squared().max(impact * impact))
            })
            .filter(|&speed_sq| speed_sq >= KNOCK_SPEED_SQ)
            .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))));

        let Some(speed_sq) = bump else {
            return false;
        };
        let strength = (speed_sq.sqrt() * KNOCK_SCALE).clamp(KNOCK_RANGE.0, KNOCK_RANGE.1);
        physics.release_body(self.body);
        physics.apply_impulse(self.body, self.direction() * strength);
        log::trace!("snow block knocked loose, impulse {:.2}", strength);
        true
    }
}
