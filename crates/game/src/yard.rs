//! Demo yard: a small gabled house with snow on both slopes, a porch, some
//! rocks, a shed carrying a cornice, and a couple of loose snow blocks.

use crate::config::YardLayout;
use anyhow::{Context, Result};
use engine_core::Transform;
use glam::{Quat, Vec3};
use hecs::Entity;
use physics::{ColliderMaterial, ColliderTag};
use rand::Rng;
use snow::{CorniceLayout, GroundSink, SnowBlockConfig, SnowScene, SurfaceConfig};

/// Handles to everything a scripted strike can aim at.
#[derive(Debug, Clone)]
pub struct Yard {
    pub front_roof: Entity,
    pub back_roof: Entity,
    pub cornice: Option<Entity>,
    pub blocks: Vec<Entity>,
}

const SHED_POSITION: Vec3 = Vec3::new(3.0, 1.2, 0.0);

fn slope(layout: &YardLayout, front: bool) -> SurfaceConfig {
    let pitch = layout.roof_pitch_degrees.to_radians();
    let (angle, downhill) = if front { (pitch, Vec3::Z) } else { (-pitch, Vec3::NEG_Z) };
    let rotation = Quat::from_rotation_x(angle);
    let d = layout.roof_half_depth;
    let z = d * pitch.cos() * downhill.z;
    let y = layout.ridge_height - d * pitch.sin();
    SurfaceConfig {
        pose: Transform::from_position_rotation(Vec3::new(0.0, y, z), rotation),
        half_extents: Vec3::new(layout.roof_half_width, layout.snow_thickness, d),
        slide_direction: rotation * downhill,
        reachable_to_top: front || layout.back_reachable_to_top,
        capacity: layout.samples_per_slope + layout.samples_per_slope / 16,
        burst: layout.samples_per_slope,
        ..Default::default()
    }
}

pub fn build<R: Rng>(scene: &mut SnowScene, layout: &YardLayout, rng: &mut R) -> Result<Yard> {
    scene.add_ground(0.0);

    let pitch = layout.roof_pitch_degrees.to_radians();
    let eaves = layout.ridge_height - 2.0 * layout.roof_half_depth * pitch.sin();
    let house_half = Vec3::new(
        layout.roof_half_width * 0.85,
        eaves * 0.5,
        layout.roof_half_depth * pitch.cos() * 0.8,
    );
    scene.add_static(
        ColliderTag::Structure,
        Vec3::new(0.0, house_half.y, 0.0),
        Quat::IDENTITY,
        house_half,
        ColliderMaterial::default(),
    );

    let front_roof = scene.add_surface(slope(layout, true)).context("front roof slope")?;
    let back_roof = scene.add_surface(slope(layout, false)).context("back roof slope")?;

    if layout.porch {
        let reach = 2.0 * layout.roof_half_depth * pitch.cos();
        scene.add_static(
            ColliderTag::Porch,
            Vec3::new(0.0, 0.08, reach + 0.35),
            Quat::IDENTITY,
            Vec3::new(layout.roof_half_width, 0.08, 0.3),
            ColliderMaterial::new(0.7, 0.0),
        );
    }

    for _ in 0..layout.decor_rocks {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let radius = rng.gen_range(1.6..2.6);
        let size = rng.gen_range(0.08..0.2);
        scene.add_static(
            ColliderTag::Decor,
            Vec3::new(angle.cos() * radius, size, angle.sin() * radius),
            Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU)),
            Vec3::splat(size),
            ColliderMaterial::new(0.8, 0.0),
        );
    }

    // Shed roof the cornice hangs off, facing +Z.
    scene.add_static(
        ColliderTag::Roof,
        SHED_POSITION,
        Quat::IDENTITY,
        Vec3::new(1.0, 0.1, 0.4),
        ColliderMaterial::default(),
    );
    let cornice = if layout.cornice_segments > 0 {
        let entity = scene
            .add_cornice(CorniceLayout {
                pose: Transform::from_position(SHED_POSITION + Vec3::new(0.0, 0.0, 0.25)),
                segment_count: layout.cornice_segments,
                rows: layout.cornice_rows.max(1),
                width: 2.0,
                depth: 0.3,
                ..Default::default()
            })
            .context("shed cornice")?;
        Some(entity)
    } else {
        None
    };

    let blocks = (0..layout.blocks)
        .map(|i| {
            let x = SHED_POSITION.x - 0.6 + 0.4 * i as f32;
            scene
                .add_block(SnowBlockConfig {
                    position: Vec3::new(x, SHED_POSITION.y + 0.25, SHED_POSITION.z - 0.2),
                    slide_direction: Vec3::new(0.0, -0.3, -1.0),
                    breakable: i % 2 == 0,
                    ..Default::default()
                })
                .context("snow block")
        })
        .collect::<Result<Vec<_>>>()?;

    log::info!(
        "yard built: eaves at {:.2} m, {} rocks, cornice: {}, {} blocks",
        eaves,
        layout.decor_rocks,
        cornice.is_some(),
        blocks.len()
    );

    Ok(Yard {
        front_roof,
        back_roof,
        cornice,
        blocks,
    })
}

/// Ground sink with an initial blanket over the yard.
pub fn ground_sink<R: Rng>(capacity: usize, blanket: usize, lifetime: f32, rng: &mut R) -> Option<GroundSink> {
    if capacity == 0 {
        return None;
    }
    let mut sink = GroundSink::new(capacity);
    let placed = sink.blanket(
        rng,
        Vec3::new(0.0, 0.05, 0.0),
        Vec3::new(3.5, 0.05, 3.5),
        blanket.min(capacity),
        lifetime,
    );
    log::info!("ground sink: {} of {} samples pre-placed", placed, capacity);
    Some(sink)
}
