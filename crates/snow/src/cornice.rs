//! Overhanging cornice built from small kinematic segments.
//!
//! Segments hang motionless until struck. A hit near the middle of the span
//! brings the whole cornice down; a hit near either end only drops the
//! struck segment and its direct neighbours.

use crate::error::{Result, SnowError};
use engine_core::Transform;
use glam::Vec3;
use physics::{BodyDesc, ColliderHandle, ColliderMaterial, ColliderTag, PhysicsWorld, RigidBodyHandle};

/// Normalised span positions strictly inside this range trigger a full collapse.
const FULL_SPAN: (f32, f32) = (0.3, 0.7);
/// Index radius of a partial collapse.
const LOCAL_RADIUS: usize = 1;
/// Impulse for slope-attached segments sliding off along the roof.
const SLIDE_IMPULSE: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct CorniceLayout {
    /// Pose of the roof edge the cornice hangs from. Local +Z faces outward.
    pub pose: Transform,
    pub segment_count: usize,
    pub rows: usize,
    pub width: f32,
    pub depth: f32,
    pub segment_size: Vec3,
    pub gap: f32,
    /// Thickness of the roof slab the segments rest on.
    pub roof_thickness: f32,
    /// Mass of one segment body; collapse impulses are sized against it.
    pub segment_mass: f32,
    pub fall_impulse: f32,
    /// Set for slope-attached cornices: segments slide along this instead
    /// of tipping outward.
    pub slide_direction: Option<Vec3>,
    /// When false, a hit only ever drops the struck segment.
    pub coordinated: bool,
}

impl Default for CorniceLayout {
    fn default() -> Self {
        Self {
            pose: Transform::default(),
            segment_count: 30,
            rows: 1,
            width: 4.0,
            depth: 3.0,
            segment_size: Vec3::new(0.2, 0.15, 0.2),
            gap: 0.02,
            roof_thickness: 0.2,
            segment_mass: 1.0,
            fall_impulse: 3.0,
            slide_direction: None,
            coordinated: true,
        }
    }
}

impl CorniceLayout {
    fn validate(&self) -> Result<()> {
        if self.segment_count == 0 || self.rows == 0 {
            return Err(SnowError::InvalidCornice(format!(
                "need at least one segment and one row, got {}x{}",
                self.segment_count, self.rows
            )));
        }
        if self.width <= self.gap || self.depth <= self.gap {
            return Err(SnowError::InvalidCornice(format!(
                "span {}x{} too small for gap {}",
                self.width, self.depth, self.gap
            )));
        }
        if !(self.segment_mass > 0.0 && self.segment_mass.is_finite()) {
            return Err(SnowError::InvalidCornice(format!(
                "segment mass must be positive, got {}",
                self.segment_mass
            )));
        }
        if self.segment_size.min_element() <= 0.0 {
            return Err(SnowError::InvalidCornice(format!(
                "segment size must be positive, got {:?}",
                self.segment_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CorniceSegment {
    pub index: usize,
    /// Position along the span, (i + 0.5) / segment_count.
    pub normalized_position: f32,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    collapsed: bool,
}

impl CorniceSegment {
    pub fn has_collapsed(&self) -> bool {
        self.collapsed
    }

    /// Hand the segment to free-fall dynamics. Only the first call does anything.
    pub fn collapse(&mut self, physics: &mut PhysicsWorld, impulse: Vec3) -> bool {
        if self.collapsed {
            return false;
        }
        self.collapsed = true;
        physics.release_body(self.body);
        physics.apply_impulse(self.body, impulse);
        true
    }
}

#[derive(Debug)]
pub struct CorniceManager {
    layout: CorniceLayout,
    segments: Vec<CorniceSegment>,
}

impl CorniceManager {
    /// Lay the segments out row-major on top of the roof edge.
    pub fn build(physics: &mut PhysicsWorld, layout: CorniceLayout) -> Result<Self> {
        layout.validate()?;

        let usable_width = layout.width - layout.gap;
        let usable_depth = layout.depth - layout.gap;
        let step_x = usable_width / layout.segment_count as f32;
        let step_z = usable_depth / layout.rows as f32;
        let lift = layout.roof_thickness * 0.5 + layout.segment_size.y * 0.5;
        // Neighbours keep at least `gap` between them whatever the segment size.
        let half = Vec3::new(
            layout.segment_size.x.min(step_x - layout.gap).max(0.01),
            layout.segment_size.y,
            layout.segment_size.z.min(step_z - layout.gap).max(0.01),
        ) * 0.5;

        let mut segments = Vec::with_capacity(layout.segment_count * layout.rows);
        for row in 0..layout.rows {
            let z = -usable_depth * 0.5 + step_z * (row as f32 + 0.5);
            for i in 0..layout.segment_count {
                let x = -usable_width * 0.5 + step_x * (i as f32 + 0.5);
                let position = layout.pose.transform_point(Vec3::new(x, lift, z));
                let body = physics.add_body(
                    position,
                    layout.pose.rotation,
                    BodyDesc {
                        kinematic: true,
                        ..Default::default()
                    },
                );
                let collider = physics.add_box_collider(
                    body,
                    half,
                    ColliderTag::Cornice,
                    ColliderMaterial::default(),
                    Some(layout.segment_mass),
                );
                segments.push(CorniceSegment {
                    index: segments.len(),
                    normalized_position: (i as f32 + 0.5) / layout.segment_count as f32,
                    body,
                    collider,
                    collapsed: false,
                });
            }
        }

        log::debug!(
            "cornice built: {} segments ({} x {})",
            segments.len(),
            layout.segment_count,
            layout.rows
        );
        Ok(Self { layout, segments })
    }

    pub fn layout(&self) -> &CorniceLayout {
        &self.layout
    }

    pub fn segments(&self) -> &[CorniceSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn collapsed_count(&self) -> usize {
        self.segments.iter().filter(|s| s.collapsed).count()
    }

    /// Direction segments tip toward when they fall: local forward of the edge.
    pub fn outward_direction(&self) -> Vec3 {
        self.layout.pose.rotation * Vec3::Z
    }

    fn collapse_impulse(&self) -> Vec3 {
        match self.layout.slide_direction {
            Some(slide) if slide.length_squared() > 0.01 => slide.normalize() * SLIDE_IMPULSE,
            _ => (Vec3::NEG_Y + self.outward_direction()).normalize_or_zero() * self.layout.fall_impulse,
        }
    }

    /// Indices a hit on `index` brings down.
    pub fn affected_range(&self, index: usize) -> std::ops::RangeInclusive<usize> {
        let last = self.segments.len().saturating_sub(1);
        let index = index.min(last);
        if !self.layout.coordinated {
            return index..=index;
        }
        let t = self.segments.get(index).map_or(0.0, |s| s.normalized_position);
        if t > FULL_SPAN.0 && t < FULL_SPAN.1 {
            0..=last
        } else {
            index.saturating_sub(LOCAL_RADIUS)..=(index + LOCAL_RADIUS).min(last)
        }
    }

    /// Strike one segment. Returns how many segments started falling.
    pub fn strike(&mut self, physics: &mut PhysicsWorld, index: usize) -> usize {
        if self.segments.is_empty() {
            return 0;
        }
        let range = self.affected_range(index);
        let impulse = self.collapse_impulse();
        let fell = self.segments[range.clone()]
            .iter_mut()
            .map(|s| s.collapse(physics, impulse))
            .filter(|&fell| fell)
            .count();
        log::debug!(
            "cornice hit on segment {}: {} of {:?} fell",
            index,
            fell,
            range
        );
        fell
    }

    /// Segment whose body is nearest to a world point.
    pub fn nearest_segment(&self, physics: &PhysicsWorld, point: Vec3) -> Option<usize> {
        self.segments
            .iter()
            .filter_map(|s| physics.body_position(s.body).map(|p| (s.index, p.distance_squared(point))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    /// Index of the segment owning a collider.
    pub fn segment_for_collider(&self, collider: ColliderHandle) -> Option<usize> {
        self.segments.iter().position(|s| s.collider == collider)
    }
}
