//! Random clump shapes and the footprint profiles each strike kind uses.

use glam::Vec3;
use rand::Rng;

/// Broad silhouette of a clump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeFamily {
    /// Wide and low.
    Flat,
    /// Tall and round.
    Lump,
    /// Narrow and long.
    Elongated,
}

/// Which kind of break-off a clump comes from. Drives count and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintProfile {
    /// Small, tall, narrow piece knocked off by a low hit.
    Local,
    /// Large, wide slab.
    Slab,
    /// Small piece dropped by a cascade or avalanche step.
    Cascade,
}

impl FootprintProfile {
    fn count_range(self) -> (usize, usize) {
        match self {
            FootprintProfile::Local => (28, 60),
            FootprintProfile::Slab => (70, 110),
            FootprintProfile::Cascade => (20, 45),
        }
    }

    /// (width, height, depth) multipliers on top of the shape family.
    fn scale(self) -> Vec3 {
        match self {
            FootprintProfile::Local => Vec3::new(0.75, 1.25, 0.75),
            FootprintProfile::Slab => Vec3::new(1.7, 0.9, 1.5),
            FootprintProfile::Cascade => Vec3::new(0.8, 0.8, 0.8),
        }
    }
}

/// One visual sub-element of a clump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementSeed {
    pub offset: Vec3,
    pub size: f32,
    pub color: [f32; 4],
}

/// Everything needed to spawn one clump.
#[derive(Debug, Clone, PartialEq)]
pub struct ClumpBlueprint {
    pub family: ShapeFamily,
    pub profile: FootprintProfile,
    /// (width, height, depth) scales.
    pub scale: Vec3,
    pub elements: Vec<ElementSeed>,
}

impl ClumpBlueprint {
    pub fn random<R: Rng>(rng: &mut R, profile: FootprintProfile) -> Self {
        let family = match rng.gen_range(0..3) {
            0 => ShapeFamily::Flat,
            1 => ShapeFamily::Lump,
            _ => ShapeFamily::Elongated,
        };
        let base = match family {
            ShapeFamily::Flat => Vec3::new(
                rng.gen_range(0.9..1.5),
                rng.gen_range(0.4..0.75),
                rng.gen_range(0.85..1.3),
            ),
            ShapeFamily::Lump => Vec3::new(
                rng.gen_range(0.7..1.2),
                rng.gen_range(0.9..1.5),
                rng.gen_range(0.7..1.2),
            ),
            ShapeFamily::Elongated => Vec3::new(
                rng.gen_range(0.5..0.9),
                rng.gen_range(0.6..1.1),
                rng.gen_range(1.2..1.8),
            ),
        };
        let scale = base * profile.scale();

        let (lo, hi) = profile.count_range();
        let count = rng.gen_range(lo..=hi);
        let elements = (0..count)
            .map(|_| {
                let u = rng.gen_range(-0.5..0.5);
                let v = rng.gen_range(-0.5..0.5);
                let w = rng.gen_range(-0.5..0.5);
                ElementSeed {
                    offset: Vec3::new(u * 0.28 * scale.x, w * 0.22 * scale.y, v * 0.28 * scale.z),
                    size: rng.gen_range(0.025..0.055),
                    color: [1.0, 1.0, 1.0, rng.gen_range(0.9..1.0)],
                }
            })
            .collect();

        Self {
            family,
            profile,
            scale,
            elements,
        }
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    /// Body mass grows with the amount of snow, 1..3.
    pub fn mass(&self) -> f32 {
        let t = (self.count() as f32 - 28.0) / 67.0;
        1.0 + 2.0 * t.clamp(0.0, 1.0)
    }

    /// Half extents of the collision box.
    pub fn collider_half_extents(&self) -> Vec3 {
        Vec3::new(0.25 * self.scale.x, 0.06 * self.scale.y, 0.2 * self.scale.z)
    }

    /// Radius of surface snow removed where this clump broke off.
    pub fn removal_radius(&self) -> f32 {
        let base = 0.18 + (self.scale.x + self.scale.z) * 0.1;
        match self.profile {
            FootprintProfile::Slab => base * 1.4,
            _ => base,
        }
    }
}
