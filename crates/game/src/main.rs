//! Snowfall - headless roof snow demo.
//!
//! Builds a small yard, replays a list of scripted strikes against it and
//! logs what the simulation does with them.

mod config;
mod yard;

use anyhow::Result;
use config::{DemoConfig, ScriptedStrike, StrikeAim};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use snow::{FrameReport, SnowScene, StrikeOutcome, StrikeTarget};
use yard::Yard;

/// Totals over a whole run.
#[derive(Debug, Default)]
struct RunStats {
    strikes_accepted: usize,
    strikes_rejected: usize,
    clumps_merged: usize,
    ground_samples: usize,
    blocks_knocked: usize,
    sequences_finished: usize,
}

impl RunStats {
    fn absorb(&mut self, report: &FrameReport) {
        self.clumps_merged += report.clumps_merged;
        self.ground_samples += report.ground_samples;
        self.blocks_knocked += report.blocks_knocked;
        self.sequences_finished += report.sequences_finished.len();
    }
}

/// Turn a scripted aim into a concrete target and world point.
fn resolve(scene: &SnowScene, yard: &Yard, aim: StrikeAim) -> Option<(StrikeTarget, Vec3)> {
    match aim {
        StrikeAim::FrontRoof { proximity, cross } | StrikeAim::BackRoof { proximity, cross } => {
            let surface = if matches!(aim, StrikeAim::FrontRoof { .. }) {
                yard.front_roof
            } else {
                yard.back_roof
            };
            let point = scene.surface(surface)?.point_at(proximity, cross);
            Some((StrikeTarget::Surface(surface), point))
        }
        StrikeAim::CorniceSegment(segment) => {
            let manager = yard.cornice?;
            let body = scene.cornice(manager)?.segments().get(segment)?.body;
            let point = scene.physics().body_position(body)?;
            Some((StrikeTarget::Cornice { manager, segment }, point))
        }
        StrikeAim::Block(index) => {
            let entity = *yard.blocks.get(index)?;
            let body = scene.world().get::<&snow::SnowBlock>(entity).ok()?.body();
            let point = scene.physics().body_position(body)?;
            Some((StrikeTarget::Block(entity), point))
        }
        StrikeAim::AnyClump => {
            let entity = scene.clump_entities().into_iter().next()?;
            let point = scene.world().get::<&snow::Clump>(entity).ok()?.position();
            Some((StrikeTarget::Clump(entity), point))
        }
    }
}

fn log_frame(frame: u64, report: &FrameReport) {
    if report.clumps_merged > 0 {
        log::debug!(
            "frame {}: {} clump(s) merged, {} ground samples",
            frame,
            report.clumps_merged,
            report.ground_samples
        );
    }
    if report.blocks_knocked > 0 {
        log::info!("frame {}: {} snow block(s) knocked loose", frame, report.blocks_knocked);
    }
    for summary in &report.sequences_finished {
        log::info!(
            "frame {}: {:?} finished after {} steps{}{}",
            frame,
            summary.kind,
            summary.steps,
            if summary.cleared { ", leftovers cleared" } else { "" },
            if summary.aborted { ", surface gone" } else { "" }
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DemoConfig::load();
    if std::env::args().any(|a| a == "--write-config") {
        config.save();
        log::info!("Wrote config.ron");
        return Ok(());
    }

    log::info!(
        "Starting Snowfall: {:.1} s at {:.0} fps, seed {:?}",
        config.run_seconds,
        config.frame_rate,
        config.seed
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut scene = SnowScene::new(config.tuning.clone(), config.seed);
    scene.set_physics_rate(config.physics_rate);
    scene.set_ground_sink(yard::ground_sink(
        config.ground_sink_capacity,
        config.yard.ground_blanket,
        config.tuning.sink_lifetime,
        &mut rng,
    ));
    let yard = yard::build(&mut scene, &config.yard, &mut rng)?;

    let mut strikes: Vec<ScriptedStrike> = config.strikes.clone();
    strikes.sort_by(|a, b| a.at.total_cmp(&b.at));
    let mut pending = strikes.into_iter().peekable();

    let dt = config.frame_seconds();
    let frames = (config.run_seconds / dt).ceil() as u64;
    let mut stats = RunStats::default();

    for frame in 0..frames {
        while let Some(strike) = pending.next_if(|s| f64::from(s.at) <= scene.now()) {
            let Some((target, point)) = resolve(&scene, &yard, strike.aim) else {
                log::warn!("t={:.2}: nothing to strike for {:?}", scene.now(), strike.aim);
                continue;
            };
            let outcome = scene.strike(target, point);
            match outcome {
                StrikeOutcome::Rejected(reason) => {
                    stats.strikes_rejected += 1;
                    log::info!("t={:.2}: {:?} rejected ({:?})", scene.now(), strike.aim, reason);
                }
                accepted => {
                    stats.strikes_accepted += 1;
                    log::info!("t={:.2}: {:?} -> {:?}", scene.now(), strike.aim, accepted);
                }
            }
        }

        let report = scene.frame(dt);
        log_frame(frame, &report);
        stats.absorb(&report);
    }

    log::info!(
        "Done: {} strikes accepted, {} rejected, {} clumps merged, {} sequences finished, {} blocks knocked",
        stats.strikes_accepted,
        stats.strikes_rejected,
        stats.clumps_merged,
        stats.sequences_finished,
        stats.blocks_knocked
    );
    log::info!(
        "Snow left: front {} / back {}, {} clumps still moving, ground sink {} (+{})",
        scene.remaining_mass(yard.front_roof)?,
        scene.remaining_mass(yard.back_roof)?,
        scene.clump_count(),
        scene.ground_sink().map_or(0, |s| s.live_count()),
        stats.ground_samples
    );

    Ok(())
}
