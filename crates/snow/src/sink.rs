//! Ground accumulation that absorbs settled clumps.

use crate::particles::ParticleStore;
use glam::Vec3;
use rand::Rng;

/// Shared append-only ground snow. Any number of clumps may emit into it;
/// emissions are independent of each other.
#[derive(Debug, Clone)]
pub struct GroundSink {
    store: ParticleStore,
    /// Tint applied by the renderer to every ground sample.
    pub color: [f32; 4],
    size_range: (f32, f32),
}

impl GroundSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: ParticleStore::with_capacity(capacity),
            color: [0.82, 0.85, 0.9, 0.9],
            size_range: (0.03, 0.06),
        }
    }

    /// Pre-fill with an initial blanket of snow over a box around `center`.
    pub fn blanket<R: Rng>(&mut self, rng: &mut R, center: Vec3, half_extents: Vec3, count: usize, lifetime: f32) -> usize {
        let mut placed = 0;
        for _ in 0..count {
            let offset = Vec3::new(
                rng.gen_range(-1.0..=1.0) * half_extents.x,
                rng.gen_range(-1.0..=1.0) * half_extents.y,
                rng.gen_range(-1.0..=1.0) * half_extents.z,
            );
            let size = rng.gen_range(self.size_range.0..self.size_range.1);
            if self.store.emit(center + offset, lifetime, size).is_none() {
                break;
            }
            placed += 1;
        }
        placed
    }

    /// Scatter `count` samples over a square footprint centred on `position`
    /// (at the position's height). Returns how many actually fit.
    pub fn emit<R: Rng>(&mut self, rng: &mut R, position: Vec3, count: usize, footprint: f32, lifetime: f32) -> usize {
        let footprint = footprint.abs();
        let mut placed = 0;
        for _ in 0..count {
            let offset = Vec3::new(
                rng.gen_range(-footprint..=footprint),
                0.0,
                rng.gen_range(-footprint..=footprint),
            );
            let size = rng.gen_range(self.size_range.0..self.size_range.1);
            if self.store.emit(position + offset, lifetime, size).is_none() {
                log::debug!("ground sink full, dropped {} samples", count - placed);
                break;
            }
            placed += 1;
        }
        placed
    }

    pub fn live_count(&self) -> usize {
        self.store.live_count()
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn age(&mut self, dt: f32) {
        self.store.age(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn emission_lands_inside_footprint() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sink = GroundSink::new(100);
        let center = Vec3::new(1.0, 0.15, -1.0);
        assert_eq!(sink.emit(&mut rng, center, 40, 0.25, 9999.0), 40);
        for (_, p) in sink.store().iter_live() {
            assert!((p.position.x - center.x).abs() <= 0.25 + 1e-6);
            assert!((p.position.z - center.z).abs() <= 0.25 + 1e-6);
            assert_eq!(p.position.y, center.y);
        }
    }

    #[test]
    fn full_sink_drops_overflow() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sink = GroundSink::new(10);
        assert_eq!(sink.emit(&mut rng, Vec3::ZERO, 25, 0.25, 10.0), 10);
        assert_eq!(sink.live_count(), 10);
    }

    #[test]
    fn negative_footprint_scatters_like_positive() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sink = GroundSink::new(10);
        assert_eq!(sink.emit(&mut rng, Vec3::ZERO, 3, -0.1, 10.0), 3);
        for (_, p) in sink.store().iter_live() {
            assert!(p.position.x.abs() <= 0.1 + 1e-6);
        }
    }
}
