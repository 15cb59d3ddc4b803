//! Physics world management with Rapier3D.

use crate::collision::{ColliderTag, IgnoredPairs};
use engine_core::{Quat, Vec3};
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use std::collections::HashMap;

/// Surface response of a collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderMaterial {
    pub friction: f32,
    pub restitution: f32,
}

impl ColliderMaterial {
    pub const fn new(friction: f32, restitution: f32) -> Self {
        Self { friction, restitution }
    }
}

impl Default for ColliderMaterial {
    fn default() -> Self {
        Self::new(0.5, 0.0)
    }
}

/// Parameters for a dynamic body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub lock_rotations: bool,
    /// Start as a gravity-free kinematic body until explicitly released.
    pub kinematic: bool,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            linear_damping: 0.0,
            angular_damping: 0.0,
            lock_rotations: false,
            kinematic: false,
        }
    }
}

/// A collider currently in contact with a queried collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub other: ColliderHandle,
    pub tag: Option<ColliderTag>,
    /// Magnitude of the impulse the solver applied on this pair last step.
    pub impulse: f32,
}

/// Main physics world containing all simulation state.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    tags: HashMap<ColliderHandle, ColliderTag>,
    ignored: IgnoredPairs,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

pub fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub fn to_vec3(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_isometry(position: Vec3, rotation: Quat) -> Isometry3<Real> {
    let q = UnitQuaternion::from_quaternion(Quaternion::new(rotation.w, rotation.x, rotation.y, rotation.z));
    Isometry3::from_parts(Translation3::new(position.x, position.y, position.z), q)
}

impl PhysicsWorld {
    /// Create a new physics world with default gravity.
    pub fn new() -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![0.0, -9.81, 0.0],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            tags: HashMap::new(),
            ignored: IgnoredPairs::default(),
        }
    }

    /// Match the solver timestep to the fixed update rate.
    pub fn set_timestep(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
    }

    /// Step the physics simulation.
    pub fn step(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &self.ignored,
            &(),
        );
    }

    /// Add a dynamic rigid body and return its handle.
    pub fn add_dynamic_body(&mut self, position: Vec3) -> RigidBodyHandle {
        self.add_body(position, Quat::IDENTITY, BodyDesc::default())
    }

    /// Add a rigid body described by `desc`.
    pub fn add_body(&mut self, position: Vec3, rotation: Quat, desc: BodyDesc) -> RigidBodyHandle {
        let builder = if desc.kinematic {
            RigidBodyBuilder::kinematic_position_based()
        } else {
            RigidBodyBuilder::dynamic().ccd_enabled(true)
        };
        let mut builder = builder
            .position(to_isometry(position, rotation))
            .linear_damping(desc.linear_damping)
            .angular_damping(desc.angular_damping);
        if desc.lock_rotations {
            builder = builder.lock_rotations();
        }
        self.rigid_body_set.insert(builder.build())
    }

    /// Add a box collider to a rigid body. `mass` overrides the density-derived mass.
    pub fn add_box_collider(
        &mut self,
        body_handle: RigidBodyHandle,
        half_extents: Vec3,
        tag: ColliderTag,
        material: ColliderMaterial,
        mass: Option<f32>,
    ) -> ColliderHandle {
        let mut builder = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .friction(material.friction)
            .restitution(material.restitution)
            .collision_groups(tag.groups());
        if tag.filters_contacts() {
            builder = builder.active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS);
        }
        if let Some(mass) = mass {
            builder = builder.mass(mass);
        }
        let handle = self
            .collider_set
            .insert_with_parent(builder.build(), body_handle, &mut self.rigid_body_set);
        self.tags.insert(handle, tag);
        handle
    }

    /// Add a ground plane collider (flat half-space at height `y`).
    pub fn add_ground_plane(&mut self, y: f32) -> ColliderHandle {
        let collider = ColliderBuilder::halfspace(Vector::y_axis())
            .translation(vector![0.0, y, 0.0])
            .friction(0.8)
            .restitution(0.0)
            .collision_groups(ColliderTag::Ground.groups())
            .build();
        let handle = self.collider_set.insert(collider);
        self.tags.insert(handle, ColliderTag::Ground);
        handle
    }

    /// Add a static cuboid collider with no parent body; it is fixed in world.
    pub fn add_static_cuboid(
        &mut self,
        translation: Vec3,
        rotation: Quat,
        half_extents: Vec3,
        tag: ColliderTag,
        material: ColliderMaterial,
    ) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .position(to_isometry(translation, rotation))
            .friction(material.friction)
            .restitution(material.restitution)
            .collision_groups(tag.groups())
            .build();
        let handle = self.collider_set.insert(collider);
        self.tags.insert(handle, tag);
        handle
    }

    /// Remove a collider by its handle.
    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.collider_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.rigid_body_set,
            true,
        );
        self.tags.remove(&handle);
        self.ignored.forget(handle);
    }

    /// Category of a collider, if it was created through this world.
    pub fn tag(&self, handle: ColliderHandle) -> Option<ColliderTag> {
        self.tags.get(&handle).copied()
    }

    /// Rigid body a collider is attached to.
    pub fn collider_parent(&self, handle: ColliderHandle) -> Option<RigidBodyHandle> {
        self.collider_set.get(handle).and_then(|c| c.parent())
    }

    /// Colliders with at least one active contact point against `collider`.
    pub fn contacts(&self, collider: ColliderHandle) -> Vec<Contact> {
        self.narrow_phase
            .contact_pairs_with(collider)
            .filter(|pair| pair.has_any_active_contact)
            .map(|pair| {
                let other = if pair.collider1 == collider {
                    pair.collider2
                } else {
                    pair.collider1
                };
                Contact {
                    other,
                    tag: self.tag(other),
                    impulse: pair.total_impulse().norm(),
                }
            })
            .collect()
    }

    /// Stop the solver from generating contacts between two colliders.
    pub fn ignore_pair(&mut self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.ignored.insert(a, b)
    }

    pub fn is_pair_ignored(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.ignored.contains(a, b)
    }

    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(handle).map(|body| to_vec3(body.translation()))
    }

    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(handle).map(|body| to_vec3(body.linvel()))
    }

    pub fn body_mass(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.rigid_body_set.get(handle).map(|body| body.mass())
    }

    pub fn is_dynamic(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set
            .get(handle)
            .map(|body| body.is_dynamic())
            .unwrap_or(false)
    }

    pub fn set_velocity(&mut self, handle: RigidBodyHandle, velocity: Vec3) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_linvel(to_vector(velocity), true);
        }
    }

    /// Apply an impulse to a dynamic body.
    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec3) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.apply_impulse(to_vector(impulse), true);
        }
    }

    /// Zero all motion and hand the body over to kinematic control.
    pub fn freeze_body(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_linvel(vector![0.0, 0.0, 0.0], false);
            body.set_angvel(vector![0.0, 0.0, 0.0], false);
            body.set_body_type(RigidBodyType::KinematicPositionBased, false);
        }
    }

    /// Turn a kinematic body into a free, gravity-affected dynamic body.
    pub fn release_body(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_body_type(RigidBodyType::Dynamic, true);
            body.set_gravity_scale(1.0, true);
            body.enable_ccd(true);
        }
    }

    /// Remove a rigid body and its colliders.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        let colliders: Vec<ColliderHandle> = self
            .rigid_body_set
            .get(handle)
            .map(|body| body.colliders().to_vec())
            .unwrap_or_default();
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        for collider in colliders {
            self.tags.remove(&collider);
            self.ignored.forget(collider);
        }
    }

    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_rests_on_ground_and_reports_contact() {
        let mut physics = PhysicsWorld::new();
        physics.add_ground_plane(0.0);
        let body = physics.add_dynamic_body(Vec3::new(0.0, 1.0, 0.0));
        let collider = physics.add_box_collider(
            body,
            Vec3::splat(0.1),
            ColliderTag::Block,
            ColliderMaterial::default(),
            None,
        );
        for _ in 0..120 {
            physics.step();
        }
        let contacts = physics.contacts(collider);
        assert!(
            contacts.iter().any(|c| c.tag == Some(ColliderTag::Ground)),
            "box should be touching the ground after two seconds"
        );
    }

    #[test]
    fn ignored_pair_lets_body_fall_through() {
        let mut physics = PhysicsWorld::new();
        let floor = physics.add_static_cuboid(
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::new(2.0, 0.05, 2.0),
            ColliderTag::SnowSurface,
            ColliderMaterial::default(),
        );
        let body = physics.add_dynamic_body(Vec3::new(0.0, 0.5, 0.0));
        let collider = physics.add_box_collider(
            body,
            Vec3::splat(0.1),
            ColliderTag::Clump,
            ColliderMaterial::default(),
            None,
        );
        assert!(physics.ignore_pair(collider, floor));
        assert!(physics.is_pair_ignored(floor, collider));
        for _ in 0..90 {
            physics.step();
        }
        let y = physics.body_position(body).map(|p| p.y).unwrap_or(0.0);
        assert!(y < -0.5, "body should have passed through the ignored floor, y = {}", y);
    }

    #[test]
    fn remove_body_drops_tags() {
        let mut physics = PhysicsWorld::new();
        let body = physics.add_dynamic_body(Vec3::ZERO);
        let collider = physics.add_box_collider(
            body,
            Vec3::splat(0.1),
            ColliderTag::Clump,
            ColliderMaterial::default(),
            None,
        );
        assert_eq!(physics.tag(collider), Some(ColliderTag::Clump));
        physics.remove_body(body);
        assert_eq!(physics.tag(collider), None);
        assert_eq!(physics.body_count(), 0);
    }
}
