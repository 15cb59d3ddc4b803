//! A falling snow clump: spawn, slide, deform, land, fade, merge.
//!
//! State machine, driven by one `advance` call per frame:
//!
//! ```text
//! Falling ⇄ StuckRecovery → Landed → Settling → Merged
//! ```
//!
//! `Merged` is reported exactly once; the owner despawns the clump and
//! forwards the emission to the ground sink.

use crate::shape::{ClumpBlueprint, FootprintProfile};
use crate::tuning::SnowTuning;
use glam::Vec3;
use noise::{NoiseFn, Perlin};
use physics::{BodyDesc, ColliderHandle, ColliderMaterial, ColliderTag, PhysicsWorld, RigidBodyHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClumpState {
    Falling,
    /// Barely moving while still up on the slope; kicked loose after a dwell.
    StuckRecovery,
    Landed,
    Settling,
    Merged,
}

/// How a clump plays out after landing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStyle {
    /// Short alpha fade, elements frozen in place.
    Roof,
    /// Longer fade with the elements spreading out and squashing down.
    Ground,
}

/// One visual sub-element. Offsets are relative to the body position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClumpElement {
    pub base_offset: Vec3,
    pub offset: Vec3,
    pub size: f32,
    pub base_color: [f32; 4],
    pub color: [f32; 4],
}

/// Samples a merged clump hands to the ground sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub position: Vec3,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClumpStep {
    Active,
    /// Reached the terminal state this frame.
    Merged(Emission),
    /// Already merged earlier; nothing to do.
    Gone,
}

/// Spawn parameters.
#[derive(Debug, Clone)]
pub struct ClumpSpawn {
    pub position: Vec3,
    pub blueprint: ClumpBlueprint,
    /// World slide direction; zero for a plain drop.
    pub slide_direction: Vec3,
    pub style: SettleStyle,
    /// Collider of the surface the clump broke off.
    pub origin_surface: Option<ColliderHandle>,
    /// Height of that surface's low edge.
    pub eaves_height: Option<f32>,
}

/// Per-frame inputs shared by every clump.
pub struct ClumpContext<'a> {
    pub physics: &'a mut PhysicsWorld,
    pub tuning: &'a SnowTuning,
    pub noise: &'a Perlin,
    pub now: f64,
}

#[derive(Debug)]
pub struct Clump {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    elements: Vec<ClumpElement>,
    profile: FootprintProfile,
    slide_direction: Vec3,
    style: SettleStyle,
    state: ClumpState,
    spawn_time: f64,
    spawn_position: Vec3,
    land_time: Option<f64>,
    last_position: Vec3,
    origin_surface: Option<ColliderHandle>,
    eaves_height: Option<f32>,
    stuck_since: Option<f64>,
    grace_checked: bool,
    dropped_from_eaves: bool,
}

fn smoothstep(from: f32, to: f32, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    from + (to - from) * (t * t * (3.0 - 2.0 * t))
}

impl Clump {
    /// Create the dynamics body and start the clump sliding.
    pub fn spawn(physics: &mut PhysicsWorld, spawn: ClumpSpawn, tuning: &SnowTuning, now: f64) -> Self {
        let body = physics.add_body(
            spawn.position,
            glam::Quat::IDENTITY,
            BodyDesc {
                linear_damping: 0.2,
                angular_damping: 2.0,
                lock_rotations: true,
                kinematic: false,
            },
        );
        let collider = physics.add_box_collider(
            body,
            spawn.blueprint.collider_half_extents(),
            ColliderTag::Clump,
            ColliderMaterial::new(0.08, 0.0),
            Some(spawn.blueprint.mass()),
        );

        let slide_direction = spawn.slide_direction.normalize_or_zero();
        if slide_direction != Vec3::ZERO {
            physics.set_velocity(body, slide_direction * tuning.slide_speed);
        }

        let elements = spawn
            .blueprint
            .elements
            .iter()
            .map(|seed| ClumpElement {
                base_offset: seed.offset,
                offset: seed.offset,
                size: seed.size,
                base_color: seed.color,
                color: seed.color,
            })
            .collect();

        Self {
            body,
            collider,
            elements,
            profile: spawn.blueprint.profile,
            slide_direction,
            style: spawn.style,
            state: ClumpState::Falling,
            spawn_time: now,
            spawn_position: spawn.position,
            land_time: None,
            last_position: spawn.position,
            origin_surface: spawn.origin_surface,
            eaves_height: spawn.eaves_height,
            stuck_since: None,
            grace_checked: false,
            dropped_from_eaves: false,
        }
    }

    /// Externally visible state; stuck recovery reads as falling.
    pub fn state(&self) -> ClumpState {
        match self.state {
            ClumpState::StuckRecovery => ClumpState::Falling,
            s => s,
        }
    }

    pub fn is_airborne(&self) -> bool {
        matches!(self.state, ClumpState::Falling | ClumpState::StuckRecovery)
    }

    pub fn body(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }

    pub fn elements(&self) -> &[ClumpElement] {
        &self.elements
    }

    pub fn profile(&self) -> FootprintProfile {
        self.profile
    }

    pub fn slide_direction(&self) -> Vec3 {
        self.slide_direction
    }

    /// Last position seen by `advance` (or the spawn point).
    pub fn position(&self) -> Vec3 {
        self.last_position
    }

    pub fn land_time(&self) -> Option<f64> {
        self.land_time
    }

    /// Administrative removal: skip the fade and merge right now.
    /// Returns `None` if the clump already merged.
    pub fn remove_immediate(&mut self, physics: &PhysicsWorld, tuning: &SnowTuning) -> Option<Emission> {
        if self.state == ClumpState::Merged {
            return None;
        }
        if let Some(p) = physics.body_position(self.body) {
            self.last_position = p;
        }
        self.state = ClumpState::Merged;
        Some(self.emission(tuning))
    }

    pub fn advance(&mut self, ctx: &mut ClumpContext) -> ClumpStep {
        match self.state {
            ClumpState::Merged => return ClumpStep::Gone,
            ClumpState::Falling | ClumpState::StuckRecovery => self.advance_airborne(ctx),
            ClumpState::Landed | ClumpState::Settling => {}
        }

        if self.state == ClumpState::Landed {
            self.state = ClumpState::Settling;
        }
        if self.state == ClumpState::Settling {
            return self.advance_settling(ctx);
        }
        ClumpStep::Active
    }

    fn advance_airborne(&mut self, ctx: &mut ClumpContext) {
        let tuning = ctx.tuning;
        let (position, velocity) = match (
            ctx.physics.body_position(self.body),
            ctx.physics.body_velocity(self.body),
        ) {
            (Some(p), Some(v)) => (p, v),
            _ => {
                // Body vanished underneath us; settle where we last were.
                self.land(ctx.physics, ctx.now);
                return;
            }
        };
        self.last_position = position;
        let speed = velocity.length();
        let sliding = self.slide_direction != Vec3::ZERO;

        if self.touches_landing(ctx.physics, position.y, tuning.land_height) {
            self.land(ctx.physics, ctx.now);
            return;
        }
        if sliding && position.y < tuning.land_height && speed < tuning.land_speed {
            self.land(ctx.physics, ctx.now);
            return;
        }

        if !self.grace_checked && ctx.now - self.spawn_time >= f64::from(tuning.grace_delay) {
            self.grace_checked = true;
            if sliding && position.distance(self.spawn_position) < tuning.grace_min_travel {
                log::trace!("clump hung at {:?}, re-applying slide", position);
                ctx.physics
                    .set_velocity(self.body, self.slide_direction * tuning.slide_speed);
            }
        }

        if let (false, true, Some(eaves)) = (self.dropped_from_eaves, sliding, self.eaves_height) {
            if position.y < eaves - tuning.eaves_margin {
                self.drop_from_surface(ctx.physics);
            }
        }

        if sliding && position.y > tuning.land_height && speed < tuning.stuck_speed {
            let since = *self.stuck_since.get_or_insert(ctx.now);
            self.state = ClumpState::StuckRecovery;
            if ctx.now - since > f64::from(tuning.stuck_dwell) {
                let mass = ctx.physics.body_mass(self.body).unwrap_or(1.0);
                let kick = (self.slide_direction + Vec3::NEG_Y).normalize_or_zero();
                ctx.physics
                    .apply_impulse(self.body, kick * tuning.stuck_impulse * mass);
                self.drop_from_surface(ctx.physics);
                self.stuck_since = Some(ctx.now);
            }
        } else {
            self.stuck_since = None;
            self.state = ClumpState::Falling;
        }

        self.deform(ctx.noise, tuning, ctx.now, velocity);
    }

    /// Contact with ground-type colliders, or with anything solid that is
    /// not roof or another clump once low enough.
    fn touches_landing(&self, physics: &PhysicsWorld, height: f32, land_height: f32) -> bool {
        physics.contacts(self.collider).iter().any(|c| match c.tag {
            Some(tag) if tag.is_roof() || tag == ColliderTag::Clump => false,
            Some(tag) if tag.is_landing_target() => true,
            _ => height < land_height,
        })
    }

    /// Stop colliding with the surface this clump came from.
    fn drop_from_surface(&mut self, physics: &mut PhysicsWorld) {
        if let Some(surface) = self.origin_surface {
            if physics.ignore_pair(self.collider, surface) {
                log::trace!("clump released from origin surface");
            }
        }
        self.dropped_from_eaves = true;
    }

    fn land(&mut self, physics: &mut PhysicsWorld, now: f64) {
        self.state = ClumpState::Landed;
        self.land_time = Some(now);
        for e in &mut self.elements {
            e.base_offset = e.offset;
        }
        physics.freeze_body(self.body);
    }

    fn deform(&mut self, noise: &Perlin, tuning: &SnowTuning, now: f64, velocity: Vec3) {
        let t = now - self.spawn_time;
        let speed = velocity.length();
        let strength = tuning.deform_base + speed * tuning.deform_per_speed;
        let dir = if speed > 0.01 { velocity / speed } else { Vec3::NEG_Y };

        for (i, e) in self.elements.iter_mut().enumerate() {
            let fi = i as f64;
            let n0 = noise.get([t * 1.2 + fi * 0.1, 0.37]) as f32;
            let n1 = noise.get([0.71, t * 1.5 + fi * 0.1]) as f32;
            let n2 = noise.get([t * 0.9 + fi * 0.07, t * 0.7 + 13.3]) as f32;
            let wobble = Vec3::new(n0, n1, n2) * strength;
            let stretch = dir * ((n0 + 1.0) * 0.5 - 0.3) * strength;
            let offset = (wobble + stretch).clamp_length_max(tuning.deform_max_offset);
            e.offset = e.base_offset + offset;
        }
    }

    fn advance_settling(&mut self, ctx: &mut ClumpContext) -> ClumpStep {
        let tuning = ctx.tuning;
        let land_time = self.land_time.unwrap_or(ctx.now);
        let duration = match self.style {
            SettleStyle::Roof => tuning.roof_fade,
            SettleStyle::Ground => tuning.ground_fade,
        };
        let t = if duration > 0.0 {
            ((ctx.now - land_time) as f32 / duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let alpha = smoothstep(1.0, 0.0, t);

        for e in &mut self.elements {
            if self.style == SettleStyle::Ground {
                let spread = smoothstep(0.0, 1.0, t);
                let squash = smoothstep(0.0, 0.7, t);
                let mut p = e.base_offset;
                p.x *= 1.0 + spread * 1.2;
                p.z *= 1.0 + spread * 1.2;
                p.y *= 1.0 - squash;
                e.offset = p;
            }
            e.color[3] = e.base_color[3] * alpha;
        }

        if t >= 1.0 {
            self.state = ClumpState::Merged;
            return ClumpStep::Merged(self.emission(tuning));
        }
        ClumpStep::Active
    }

    /// Footprint on the ground under the clump, capped sample count.
    fn emission(&self, tuning: &SnowTuning) -> Emission {
        let mut position = self.last_position;
        position.y = tuning.sink_height;
        Emission {
            position,
            count: self.elements.len().min(tuning.sink_emit_cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spawn_at(physics: &mut PhysicsWorld, position: Vec3, slide: Vec3, style: SettleStyle) -> Clump {
        let mut rng = StdRng::seed_from_u64(21);
        let blueprint = ClumpBlueprint::random(&mut rng, FootprintProfile::Local);
        Clump::spawn(
            physics,
            ClumpSpawn {
                position,
                blueprint,
                slide_direction: slide,
                style,
                origin_surface: None,
                eaves_height: None,
            },
            &SnowTuning::default(),
            0.0,
        )
    }

    /// Step physics + clump at 60 Hz until merged; returns (frames, emissions).
    fn run_until_merged(physics: &mut PhysicsWorld, clump: &mut Clump, max_frames: usize) -> (usize, Vec<Emission>) {
        let tuning = SnowTuning::default();
        let noise = Perlin::new(1);
        let dt = 1.0 / 60.0;
        let mut emissions = Vec::new();
        let mut merged_at = max_frames;
        for frame in 1..=max_frames {
            physics.set_timestep(dt as f32);
            physics.step();
            let mut ctx = ClumpContext {
                physics: &mut *physics,
                tuning: &tuning,
                noise: &noise,
                now: frame as f64 * dt,
            };
            if let ClumpStep::Merged(e) = clump.advance(&mut ctx) {
                emissions.push(e);
                merged_at = merged_at.min(frame);
            }
        }
        (merged_at, emissions)
    }

    #[test]
    fn plain_drop_lands_on_ground_and_merges_once() {
        let mut physics = PhysicsWorld::new();
        physics.add_ground_plane(0.0);
        let mut clump = spawn_at(&mut physics, Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO, SettleStyle::Ground);
        let (frames, emissions) = run_until_merged(&mut physics, &mut clump, 400);
        assert!(frames < 200, "clump took {} frames to merge", frames);
        assert_eq!(emissions.len(), 1, "merge must be reported exactly once");
        assert_eq!(clump.state(), ClumpState::Merged);
        let e = emissions[0];
        assert_eq!(e.count, clump.elements().len().min(60));
        assert!((e.position.y - 0.15).abs() < 1e-6);
    }

    #[test]
    fn landing_freezes_the_body() {
        let mut physics = PhysicsWorld::new();
        physics.add_ground_plane(0.0);
        let mut clump = spawn_at(&mut physics, Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, SettleStyle::Roof);
        let tuning = SnowTuning::default();
        let noise = Perlin::new(1);
        for frame in 1..120 {
            physics.step();
            let mut ctx = ClumpContext {
                physics: &mut physics,
                tuning: &tuning,
                noise: &noise,
                now: frame as f64 / 60.0,
            };
            clump.advance(&mut ctx);
            if clump.land_time().is_some() {
                break;
            }
        }
        assert!(clump.land_time().is_some(), "clump never landed");
        assert!(!physics.is_dynamic(clump.body()));
        assert_eq!(physics.body_velocity(clump.body()), Some(Vec3::ZERO));
    }

    #[test]
    fn deformation_stays_bounded() {
        let mut physics = PhysicsWorld::new();
        let mut clump = spawn_at(&mut physics, Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, SettleStyle::Roof);
        let tuning = SnowTuning::default();
        let noise = Perlin::new(9);
        for frame in 1..90 {
            physics.step();
            let mut ctx = ClumpContext {
                physics: &mut physics,
                tuning: &tuning,
                noise: &noise,
                now: frame as f64 / 60.0,
            };
            clump.advance(&mut ctx);
        }
        assert!(clump.is_airborne());
        for e in clump.elements() {
            assert!((e.offset - e.base_offset).length() <= tuning.deform_max_offset + 1e-5);
        }
    }

    #[test]
    fn remove_immediate_emits_once() {
        let mut physics = PhysicsWorld::new();
        let mut clump = spawn_at(&mut physics, Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, SettleStyle::Roof);
        let tuning = SnowTuning::default();
        assert!(clump.remove_immediate(&physics, &tuning).is_some());
        assert!(clump.remove_immediate(&physics, &tuning).is_none());
        let noise = Perlin::new(1);
        let mut ctx = ClumpContext {
            physics: &mut physics,
            tuning: &tuning,
            noise: &noise,
            now: 0.1,
        };
        assert_eq!(clump.advance(&mut ctx), ClumpStep::Gone);
    }

    /// Static snow layer at y = 2 (top at 2.05) with the given friction.
    fn snow_layer(physics: &mut PhysicsWorld, at: Vec3, friction: f32) -> ColliderHandle {
        physics.add_static_cuboid(
            at,
            glam::Quat::IDENTITY,
            Vec3::new(1.0, 0.05, 1.0),
            ColliderTag::SnowSurface,
            ColliderMaterial::new(friction, 0.0),
        )
    }

    /// Clump broken off `origin`, resting with its underside at `floor`.
    fn spawn_from(
        physics: &mut PhysicsWorld,
        tuning: &SnowTuning,
        floor: Vec3,
        origin: ColliderHandle,
        eaves_height: Option<f32>,
    ) -> Clump {
        let mut rng = StdRng::seed_from_u64(5);
        let blueprint = ClumpBlueprint::random(&mut rng, FootprintProfile::Local);
        let lift = blueprint.collider_half_extents().y;
        Clump::spawn(
            physics,
            ClumpSpawn {
                position: floor + Vec3::Y * lift,
                blueprint,
                slide_direction: Vec3::new(0.0, -0.4, 0.9),
                style: SettleStyle::Roof,
                origin_surface: Some(origin),
                eaves_height,
            },
            tuning,
            0.0,
        )
    }

    fn tick(physics: &mut PhysicsWorld, clump: &mut Clump, tuning: &SnowTuning, noise: &Perlin, now: f64) -> ClumpStep {
        physics.step();
        let mut ctx = ClumpContext {
            physics,
            tuning,
            noise,
            now,
        };
        clump.advance(&mut ctx)
    }

    #[test]
    fn clump_stalled_on_sticky_snow_is_kicked_off_and_merges() {
        let mut physics = PhysicsWorld::new();
        physics.add_ground_plane(0.0);
        let layer = snow_layer(&mut physics, Vec3::new(0.0, 2.0, 0.0), 5.0);
        let tuning = SnowTuning::default();
        let noise = Perlin::new(3);
        let mut clump = spawn_from(&mut physics, &tuning, Vec3::new(0.0, 2.05, 0.0), layer, None);

        let mut merged = Vec::new();
        for frame in 1..=240 {
            if let ClumpStep::Merged(e) = tick(&mut physics, &mut clump, &tuning, &noise, frame as f64 / 60.0) {
                merged.push((frame, e));
            }
        }
        assert!(physics.is_pair_ignored(clump.collider(), layer), "stuck clump should drop through its origin");
        assert_eq!(merged.len(), 1, "merged {:?}", merged);
        let (frame, emission) = merged[0];
        assert!(frame < 150, "stuck clump took {} frames to merge", frame);
        assert!(emission.position.z > 0.0, "kick goes along the slide direction");
    }

    #[test]
    fn hung_clump_gets_its_slide_back_after_grace_delay() {
        let mut physics = PhysicsWorld::new();
        let layer = snow_layer(&mut physics, Vec3::new(0.0, 2.0, 0.0), 5.0);
        // Keep stuck recovery out of the way so only the grace check acts.
        let tuning = SnowTuning {
            stuck_dwell: 10.0,
            ..Default::default()
        };
        let noise = Perlin::new(3);
        let mut clump = spawn_from(&mut physics, &tuning, Vec3::new(0.0, 2.05, 0.0), layer, None);
        let slide = clump.slide_direction();

        let mut regrabbed = None;
        for frame in 1..=30 {
            let now = frame as f64 / 60.0;
            let before = physics.body_velocity(clump.body()).expect("clump body");
            tick(&mut physics, &mut clump, &tuning, &noise, now);
            if now >= f64::from(tuning.grace_delay) {
                regrabbed = Some((before, physics.body_velocity(clump.body()).expect("clump body")));
                break;
            }
        }
        let (before, after) = regrabbed.expect("grace delay reached");
        assert!(before.length() < 0.05, "clump should have stalled, was moving at {:?}", before);
        assert!((after - slide * tuning.slide_speed).length() < 1e-4, "got {:?}", after);
    }

    #[test]
    fn passing_the_eaves_releases_the_origin_surface() {
        let mut physics = PhysicsWorld::new();
        let roof = snow_layer(&mut physics, Vec3::new(10.0, 2.0, 0.0), 0.1);
        let tuning = SnowTuning::default();
        let noise = Perlin::new(3);
        let eaves = 2.5;
        let mut clump = spawn_from(&mut physics, &tuning, Vec3::new(0.0, 3.0, 0.0), roof, Some(eaves));

        tick(&mut physics, &mut clump, &tuning, &noise, 1.0 / 60.0);
        assert!(!physics.is_pair_ignored(clump.collider(), roof));

        for frame in 2..=60 {
            tick(&mut physics, &mut clump, &tuning, &noise, frame as f64 / 60.0);
            if clump.position().y < eaves - tuning.eaves_margin {
                break;
            }
            assert!(!physics.is_pair_ignored(clump.collider(), roof), "released above the eaves at frame {}", frame);
        }
        assert!(clump.position().y < eaves - tuning.eaves_margin, "clump never fell past the eaves");
        assert!(physics.is_pair_ignored(clump.collider(), roof));
    }
}

