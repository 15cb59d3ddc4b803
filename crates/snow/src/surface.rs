//! Accumulated snow on one tilted roof panel.
//!
//! Samples live in the panel's local space: a box of `half_extents` around
//! the panel pose, with local +Y pointing out of the roof. The downhill axis
//! is whichever of local X / Z carries more of the slide direction.

use crate::error::{Result, SnowError};
use crate::particles::ParticleStore;
use engine_core::Transform;
use glam::Vec3;
use physics::ColliderHandle;
use rand::Rng;

/// Construction inputs for a surface. Immutable for the surface's lifetime.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// World pose of the snow layer's centre.
    pub pose: Transform,
    /// Local half size of the snow layer (x = width, y = thickness, z = depth).
    pub half_extents: Vec3,
    /// World-space downhill direction.
    pub slide_direction: Vec3,
    /// Whether strikes may reach the high edge.
    pub reachable_to_top: bool,
    pub capacity: usize,
    /// Samples placed by the initial fill.
    pub burst: usize,
    pub particle_size: (f32, f32),
    pub particle_lifetime: f32,
    pub friction: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            pose: Transform::default(),
            half_extents: Vec3::new(0.625, 0.08, 0.5),
            slide_direction: Vec3::new(0.0, -0.42, -0.9),
            reachable_to_top: true,
            capacity: 28_000,
            burst: 26_000,
            particle_size: (0.028, 0.05),
            particle_lifetime: 9999.0,
            friction: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAxis {
    X,
    Z,
}

impl PanelAxis {
    fn get(self, v: Vec3) -> f32 {
        match self {
            PanelAxis::X => v.x,
            PanelAxis::Z => v.z,
        }
    }

    fn other(self) -> PanelAxis {
        match self {
            PanelAxis::X => PanelAxis::Z,
            PanelAxis::Z => PanelAxis::X,
        }
    }

    fn compose(self, along: f32, across: f32, up: f32) -> Vec3 {
        match self {
            PanelAxis::X => Vec3::new(along, up, across),
            PanelAxis::Z => Vec3::new(across, up, along),
        }
    }
}

/// Dominant downhill axis in panel-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownhillAxis {
    pub axis: PanelAxis,
    /// +1 when the low edge sits on the positive side of `axis`.
    pub sign: f32,
}

impl DownhillAxis {
    pub fn from_local_slide(local: Vec3) -> Option<Self> {
        let (axis, component) = if local.x.abs() >= local.z.abs() {
            (PanelAxis::X, local.x)
        } else {
            (PanelAxis::Z, local.z)
        };
        if component.abs() < 1e-4 {
            return None;
        }
        Some(Self {
            axis,
            sign: component.signum(),
        })
    }

    pub fn unit(&self) -> Vec3 {
        self.axis.compose(self.sign, 0.0, 0.0)
    }
}

/// Per-panel snow accumulation and its sample store.
#[derive(Debug)]
pub struct SurfaceSnowField {
    pose: Transform,
    half_extents: Vec3,
    downhill: DownhillAxis,
    slide_direction: Vec3,
    reachable_to_top: bool,
    store: ParticleStore,
    burst: usize,
    particle_size: (f32, f32),
    particle_lifetime: f32,
    friction: f32,
    collider: Option<ColliderHandle>,
    last_direct_strike: Option<f64>,
    edge_timer: f32,
}

impl SurfaceSnowField {
    pub fn new(config: SurfaceConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(SnowError::InvalidSurface("capacity must be positive".into()));
        }
        if config.burst > config.capacity {
            return Err(SnowError::InvalidSurface(format!(
                "burst of {} exceeds capacity {}",
                config.burst, config.capacity
            )));
        }
        if config.half_extents.min_element() <= 0.0 {
            return Err(SnowError::InvalidSurface(format!(
                "half extents must be positive, got {:?}",
                config.half_extents
            )));
        }
        let (lo, hi) = config.particle_size;
        if !(lo > 0.0 && lo <= hi) {
            return Err(SnowError::InvalidSurface(format!("bad particle size range {:?}", config.particle_size)));
        }
        let slide = config.slide_direction.normalize_or_zero();
        let downhill = DownhillAxis::from_local_slide(config.pose.inverse_transform_direction(slide))
            .ok_or_else(|| {
                SnowError::InvalidSurface(format!(
                    "slide direction {:?} has no component along the panel",
                    config.slide_direction
                ))
            })?;

        Ok(Self {
            pose: config.pose,
            half_extents: config.half_extents,
            downhill,
            slide_direction: slide,
            reachable_to_top: config.reachable_to_top,
            store: ParticleStore::with_capacity(config.capacity),
            burst: config.burst,
            particle_size: config.particle_size,
            particle_lifetime: config.particle_lifetime,
            friction: config.friction,
            collider: None,
            last_direct_strike: None,
            edge_timer: 0.0,
        })
    }

    /// Initial fill: scatter the configured burst uniformly through the layer.
    pub fn burst_fill<R: Rng>(&mut self, rng: &mut R) -> usize {
        let h = self.half_extents;
        let mut placed = 0;
        for _ in 0..self.burst {
            let local = Vec3::new(
                rng.gen_range(-h.x..=h.x),
                rng.gen_range(-h.y..=h.y),
                rng.gen_range(-h.z..=h.z),
            );
            let size = rng.gen_range(self.particle_size.0..=self.particle_size.1);
            if self.store.emit(local, self.particle_lifetime, size).is_none() {
                break;
            }
            placed += 1;
        }
        placed
    }

    pub fn pose(&self) -> &Transform {
        &self.pose
    }

    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    pub fn downhill(&self) -> DownhillAxis {
        self.downhill
    }

    /// Normalised world-space slide direction.
    pub fn slide_direction(&self) -> Vec3 {
        self.slide_direction
    }

    pub fn reachable_to_top(&self) -> bool {
        self.reachable_to_top
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn collider(&self) -> Option<ColliderHandle> {
        self.collider
    }

    pub fn set_collider(&mut self, collider: ColliderHandle) {
        self.collider = Some(collider);
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    /// Live sample count.
    pub fn remaining_mass(&self) -> usize {
        self.store.live_count()
    }

    fn proximity_local(&self, local: Vec3) -> f32 {
        let axis = self.downhill.axis;
        let along = axis.get(local) * self.downhill.sign;
        (0.5 - along / (2.0 * axis.get(self.half_extents))).clamp(0.0, 1.0)
    }

    /// 0 at the low edge, 1 at the high edge, clamped.
    pub fn proximity_to_high_edge(&self, world_point: Vec3) -> f32 {
        self.proximity_local(self.pose.inverse_transform_point(world_point))
    }

    /// Strike gate for surfaces that cannot be reached to the top.
    pub fn within_reach(&self, proximity: f32, cutoff: f32) -> bool {
        self.reachable_to_top || proximity <= cutoff
    }

    /// Cross-axis coordinate of a world point, -1..1 across the panel.
    pub fn cross_coordinate(&self, world_point: Vec3) -> f32 {
        let across = self.downhill.axis.other();
        let local = self.pose.inverse_transform_point(world_point);
        (across.get(local) / across.get(self.half_extents)).clamp(-1.0, 1.0)
    }

    /// World point on top of the snow layer at `proximity` along the
    /// downhill axis and `cross` (-1..1) across it.
    pub fn point_at(&self, proximity: f32, cross: f32) -> Vec3 {
        let axis = self.downhill.axis;
        let along = self.downhill.sign * axis.get(self.half_extents) * (1.0 - 2.0 * proximity.clamp(0.0, 1.0));
        let across = cross.clamp(-1.0, 1.0) * axis.other().get(self.half_extents);
        self.pose
            .transform_point(axis.compose(along, across, self.half_extents.y))
    }

    /// World height of the low edge's top, where snow tips over the eaves.
    pub fn low_edge_height(&self) -> f32 {
        self.point_at(0.0, 0.0).y
    }

    /// Kill every sample within `radius` of a world point. Never adds mass.
    pub fn remove_near(&mut self, world_point: Vec3, radius: f32) -> usize {
        let local = self.pose.inverse_transform_point(world_point);
        self.remove_near_local(local, radius)
    }

    pub fn remove_near_local(&mut self, local: Vec3, radius: f32) -> usize {
        if radius <= 0.0 {
            return 0;
        }
        self.store.kill_within(local, radius)
    }

    /// Kill every sample whose proximity is below `edge_fraction`: snow that
    /// has already slid past the low edge.
    pub fn remove_edge_band(&mut self, edge_fraction: f32) -> usize {
        let axis = self.downhill.axis;
        let sign = self.downhill.sign;
        let limit = axis.get(self.half_extents) * (1.0 - 2.0 * edge_fraction.clamp(0.0, 1.0));
        self.store.kill_where(|p| axis.get(p.position) * sign > limit)
    }

    /// Remove everything left on the panel.
    pub fn clear_all(&mut self) -> usize {
        self.store.kill_all()
    }

    /// Continuous low-edge cleanup, run on a fixed interval.
    pub fn tick_edge_cleanup(&mut self, dt: f32, interval: f32, edge_fraction: f32) -> usize {
        self.edge_timer += dt;
        if self.edge_timer < interval {
            return 0;
        }
        self.edge_timer = 0.0;
        self.remove_edge_band(edge_fraction)
    }

    pub fn age(&mut self, dt: f32) {
        self.store.age(dt);
    }

    /// Is a direct strike at `now` still inside the debounce window?
    pub fn debounced(&self, now: f64, window: f32) -> bool {
        self.last_direct_strike
            .map(|last| now - last < f64::from(window))
            .unwrap_or(false)
    }

    pub fn mark_direct_strike(&mut self, now: f64) {
        self.last_direct_strike = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tilted_config() -> SurfaceConfig {
        let rotation = Quat::from_rotation_x(25f32.to_radians());
        SurfaceConfig {
            pose: Transform::from_position_rotation(Vec3::new(0.0, 1.95, 0.0), rotation),
            slide_direction: rotation * Vec3::new(0.0, 0.0, 1.0),
            capacity: 4000,
            burst: 4000,
            ..Default::default()
        }
    }

    fn filled(config: SurfaceConfig) -> SurfaceSnowField {
        let mut field = SurfaceSnowField::new(config).expect("valid surface");
        field.burst_fill(&mut StdRng::seed_from_u64(3));
        field
    }

    #[test]
    fn downhill_axis_picks_dominant_component() {
        let field = SurfaceSnowField::new(tilted_config()).expect("valid surface");
        assert_eq!(field.downhill().axis, PanelAxis::Z);
        assert_eq!(field.downhill().sign, 1.0);
    }

    #[test]
    fn proximity_runs_from_low_to_high_edge() {
        let field = SurfaceSnowField::new(tilted_config()).expect("valid surface");
        for p in [0.0, 0.2, 0.5, 0.9, 1.0] {
            let point = field.point_at(p, 0.3);
            assert!(
                (field.proximity_to_high_edge(point) - p).abs() < 1e-4,
                "proximity {} did not round-trip",
                p
            );
        }
        let low = field.point_at(0.0, 0.0);
        let high = field.point_at(1.0, 0.0);
        assert!(low.y < high.y, "low edge should sit lower than the high edge");
        assert!((field.low_edge_height() - low.y).abs() < 1e-6);
    }

    #[test]
    fn proximity_is_clamped_outside_panel() {
        let field = SurfaceSnowField::new(tilted_config()).expect("valid surface");
        let beyond = field.point_at(0.0, 0.0) + field.slide_direction() * 3.0;
        assert_eq!(field.proximity_to_high_edge(beyond), 0.0);
    }

    #[test]
    fn remove_near_never_adds_mass() {
        let mut field = filled(tilted_config());
        let mut last = field.remaining_mass();
        assert_eq!(last, 4000);
        for p in [0.1, 0.3, 0.5, 0.7] {
            let point = field.point_at(p, 0.0);
            let removed = field.remove_near(point, 0.3);
            assert!(removed > 0);
            assert!(field.remaining_mass() <= last);
            last = field.remaining_mass();
        }
    }

    #[test]
    fn edge_band_clears_low_edge_only() {
        let mut field = filled(tilted_config());
        let removed = field.remove_edge_band(0.1);
        assert!(removed > 0);
        assert_eq!(field.remove_edge_band(0.1), 0, "band is already empty");
        for (_, p) in field.store().iter_live() {
            let world = field.pose().transform_point(p.position);
            assert!(field.proximity_to_high_edge(world) >= 0.1 - 1e-4);
        }
    }

    #[test]
    fn reach_gate_only_applies_to_unreachable_surfaces() {
        let mut config = tilted_config();
        config.reachable_to_top = false;
        let gated = SurfaceSnowField::new(config).expect("valid surface");
        assert!(!gated.within_reach(0.9, 0.45));
        assert!(gated.within_reach(0.2, 0.45));
        let open = SurfaceSnowField::new(tilted_config()).expect("valid surface");
        assert!(open.within_reach(0.9, 0.45));
    }

    #[test]
    fn debounce_window() {
        let mut field = SurfaceSnowField::new(tilted_config()).expect("valid surface");
        assert!(!field.debounced(0.0, 0.4));
        field.mark_direct_strike(1.0);
        assert!(field.debounced(1.2, 0.4));
        assert!(!field.debounced(1.45, 0.4));
    }

    #[test]
    fn rejects_degenerate_config() {
        let mut config = tilted_config();
        config.burst = config.capacity + 1;
        assert!(SurfaceSnowField::new(config).is_err());

        let mut config = tilted_config();
        config.slide_direction = config.pose.up();
        assert!(SurfaceSnowField::new(config).is_err());
    }
}
