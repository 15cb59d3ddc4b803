//! The snow scene: owns the ECS world, the physics world and the clock,
//! routes strikes and drives everything once per frame.

use crate::block::{BlockHit, BlockPiece, SnowBlock, SnowBlockConfig};
use crate::cascade::{
    classify, CascadeSequence, RejectReason, SequenceKind, SequenceStep, SequenceSummary, StrikeKind, StrikeOutcome,
};
use crate::clump::{Clump, ClumpContext, ClumpSpawn, ClumpStep, Emission, SettleStyle};
use crate::cornice::{CorniceLayout, CorniceManager};
use crate::error::{Result, SnowError};
use crate::shape::{ClumpBlueprint, FootprintProfile};
use crate::sink::GroundSink;
use crate::surface::{SurfaceConfig, SurfaceSnowField};
use crate::tuning::SnowTuning;
use engine_core::Time;
use glam::{Quat, Vec3};
use hecs::{Entity, World};
use noise::Perlin;
use physics::{ColliderHandle, ColliderMaterial, ColliderTag, PhysicsWorld};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// What a strike landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeTarget {
    Surface(Entity),
    Cornice { manager: Entity, segment: usize },
    Block(Entity),
    Clump(Entity),
}

/// What happened during one `frame` call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    pub physics_steps: u32,
    /// Clumps spawned by running sequences.
    pub clumps_spawned: usize,
    pub clumps_merged: usize,
    /// Samples added to the ground sink.
    pub ground_samples: usize,
    pub blocks_knocked: usize,
    pub edge_samples_removed: usize,
    pub sequences_finished: Vec<SequenceSummary>,
}

pub struct SnowScene {
    world: World,
    physics: PhysicsWorld,
    time: Time,
    tuning: SnowTuning,
    rng: StdRng,
    noise: Perlin,
    ground_sink: Option<GroundSink>,
    sequences: Vec<CascadeSequence>,
}

impl SnowScene {
    /// Empty scene. A seed makes every random draw reproducible.
    /// Invalid tuning is replaced by the defaults with a warning.
    pub fn new(tuning: SnowTuning, seed: Option<u64>) -> Self {
        let tuning = match tuning.validate() {
            Ok(()) => tuning,
            Err(e) => {
                log::warn!("{}, using default tuning", e);
                SnowTuning::default()
            }
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = Perlin::new(seed.map_or(0, |s| s as u32));
        Self {
            world: World::new(),
            physics: PhysicsWorld::new(),
            time: Time::new(),
            tuning,
            rng,
            noise,
            ground_sink: None,
            sequences: Vec::new(),
        }
    }

    pub fn with_ground_sink(mut self, sink: GroundSink) -> Self {
        self.ground_sink = Some(sink);
        self
    }

    pub fn set_ground_sink(&mut self, sink: Option<GroundSink>) {
        self.ground_sink = sink;
    }

    /// Physics tick rate, independent of the frame rate passed to `frame`.
    pub fn set_physics_rate(&mut self, hz: f32) {
        self.time.set_fixed_rate(f64::from(hz));
    }

    // ── Setup ───────────────────────────────────────────────────────────

    pub fn add_ground(&mut self, y: f32) -> ColliderHandle {
        self.physics.add_ground_plane(y)
    }

    /// Static scenery: house body, porch, decor.
    pub fn add_static(
        &mut self,
        tag: ColliderTag,
        position: Vec3,
        rotation: Quat,
        half_extents: Vec3,
        material: ColliderMaterial,
    ) -> ColliderHandle {
        self.physics
            .add_static_cuboid(position, rotation, half_extents, tag, material)
    }

    /// Build a surface, give it a collider, fill it and trim the low edge.
    pub fn add_surface(&mut self, config: SurfaceConfig) -> Result<Entity> {
        let mut field = SurfaceSnowField::new(config)?;
        let pose = *field.pose();
        let collider = self.physics.add_static_cuboid(
            pose.position,
            pose.rotation,
            field.half_extents() * pose.scale,
            ColliderTag::SnowSurface,
            ColliderMaterial::new(field.friction(), 0.0),
        );
        field.set_collider(collider);
        let placed = field.burst_fill(&mut self.rng);
        let trimmed = field.remove_edge_band(self.tuning.edge_band_fraction);
        log::info!(
            "surface ready: {} samples ({} trimmed off the low edge), reachable to top: {}",
            placed - trimmed,
            trimmed,
            field.reachable_to_top()
        );
        Ok(self.world.spawn((field,)))
    }

    /// Despawn a surface. Running sequences on it stop on their next poll.
    pub fn remove_surface(&mut self, entity: Entity) -> bool {
        let collider = match self.world.get::<&SurfaceSnowField>(entity) {
            Ok(field) => field.collider(),
            Err(_) => return false,
        };
        if let Some(collider) = collider {
            self.physics.remove_collider(collider);
        }
        self.world.despawn(entity).is_ok()
    }

    pub fn add_cornice(&mut self, layout: CorniceLayout) -> Result<Entity> {
        let cornice = CorniceManager::build(&mut self.physics, layout)?;
        log::info!("cornice ready: {} segments", cornice.len());
        Ok(self.world.spawn((cornice,)))
    }

    pub fn add_block(&mut self, config: SnowBlockConfig) -> Result<Entity> {
        let block = SnowBlock::place(&mut self.physics, config)?;
        Ok(self.world.spawn((block,)))
    }

    /// Spawn a clump directly, outside any strike.
    pub fn spawn_clump(&mut self, spawn: ClumpSpawn) -> Entity {
        let clump = Clump::spawn(&mut self.physics, spawn, &self.tuning, self.time.now());
        self.world.spawn((clump,))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn now(&self) -> f64 {
        self.time.now()
    }

    pub fn tuning(&self) -> &SnowTuning {
        &self.tuning
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn ground_sink(&self) -> Option<&GroundSink> {
        self.ground_sink.as_ref()
    }

    pub fn surface(&self, entity: Entity) -> Option<hecs::Ref<'_, SurfaceSnowField>> {
        self.world.get::<&SurfaceSnowField>(entity).ok()
    }

    pub fn cornice(&self, entity: Entity) -> Option<hecs::Ref<'_, CorniceManager>> {
        self.world.get::<&CorniceManager>(entity).ok()
    }

    pub fn remaining_mass(&self, surface: Entity) -> Result<usize> {
        self.surface(surface)
            .map(|field| field.remaining_mass())
            .ok_or(SnowError::NoSuchEntity(surface))
    }

    pub fn clump_count(&self) -> usize {
        self.world.query::<&Clump>().iter().count()
    }

    pub fn clump_entities(&self) -> Vec<Entity> {
        self.world.query::<&Clump>().iter().map(|(e, _)| e).collect()
    }

    pub fn block_piece_count(&self) -> usize {
        self.world.query::<&BlockPiece>().iter().count()
    }

    pub fn active_sequences(&self) -> usize {
        self.sequences.len()
    }

    pub fn sequence_kinds(&self, surface: Entity) -> Vec<SequenceKind> {
        self.sequences
            .iter()
            .filter(|s| s.surface() == surface)
            .map(|s| s.kind())
            .collect()
    }

    /// Map a hit collider to a strike target. Surfaces win over cornice
    /// segments, which win over clumps and blocks.
    pub fn resolve_target(&self, collider: ColliderHandle) -> Option<StrikeTarget> {
        if let Some((entity, _)) = self
            .world
            .query::<&SurfaceSnowField>()
            .iter()
            .find(|(_, field)| field.collider() == Some(collider))
        {
            return Some(StrikeTarget::Surface(entity));
        }
        if let Some((manager, segment)) = self
            .world
            .query::<&CorniceManager>()
            .iter()
            .find_map(|(entity, cornice)| cornice.segment_for_collider(collider).map(|i| (entity, i)))
        {
            return Some(StrikeTarget::Cornice { manager, segment });
        }
        if let Some((entity, _)) = self
            .world
            .query::<&Clump>()
            .iter()
            .find(|(_, clump)| clump.collider() == collider)
        {
            return Some(StrikeTarget::Clump(entity));
        }
        self.world
            .query::<&SnowBlock>()
            .iter()
            .find(|(_, block)| block.collider() == collider)
            .map(|(entity, _)| StrikeTarget::Block(entity))
    }

    // ── Strikes ─────────────────────────────────────────────────────────

    pub fn strike(&mut self, target: StrikeTarget, world_point: Vec3) -> StrikeOutcome {
        let outcome = match target {
            StrikeTarget::Surface(entity) => self.strike_surface(entity, world_point),
            StrikeTarget::Cornice { manager, segment } => self.strike_cornice(manager, segment),
            StrikeTarget::Block(entity) => self.strike_block(entity, world_point),
            StrikeTarget::Clump(entity) => self.strike_clump(entity),
        };
        log::debug!("strike {:?} at {:?}: {:?}", target, world_point, outcome);
        outcome
    }

    /// Resolve the collider and strike whatever owns it.
    pub fn strike_collider(&mut self, collider: ColliderHandle, world_point: Vec3) -> StrikeOutcome {
        match self.resolve_target(collider) {
            Some(target) => self.strike(target, world_point),
            None => StrikeOutcome::Rejected(RejectReason::NoTarget),
        }
    }

    fn strike_surface(&mut self, entity: Entity, point: Vec3) -> StrikeOutcome {
        let now = self.time.now();
        let tuning = &self.tuning;

        let (kind, proximity, cross, spawn) = {
            let Ok(mut field) = self.world.get::<&mut SurfaceSnowField>(entity) else {
                return StrikeOutcome::Rejected(RejectReason::NoTarget);
            };
            if field.remaining_mass() < tuning.min_strike_mass {
                return StrikeOutcome::Rejected(RejectReason::NoMass);
            }
            if field.debounced(now, tuning.debounce_seconds) {
                return StrikeOutcome::Rejected(RejectReason::Debounced);
            }
            let proximity = field.proximity_to_high_edge(point);
            if !field.within_reach(proximity, tuning.reach_cutoff) {
                return StrikeOutcome::Rejected(RejectReason::OutOfReach);
            }
            field.mark_direct_strike(now);

            let kind = classify(proximity, field.reachable_to_top(), tuning);
            field.remove_edge_band(tuning.edge_band_fraction);
            let cross = field.cross_coordinate(point);

            let spawn = match kind {
                StrikeKind::Avalanche => None,
                StrikeKind::Slab | StrikeKind::Local => {
                    let profile = if kind == StrikeKind::Slab {
                        FootprintProfile::Slab
                    } else {
                        FootprintProfile::Local
                    };
                    let blueprint = ClumpBlueprint::random(&mut self.rng, profile);
                    let base = field.point_at(proximity, cross);
                    let removed = field.remove_near(base, blueprint.removal_radius());
                    log::trace!("{:?} break-off removed {} samples", kind, removed);
                    Some(ClumpSpawn {
                        position: base + Vec3::Y * tuning.spawn_lift,
                        blueprint,
                        slide_direction: field.slide_direction(),
                        style: SettleStyle::Ground,
                        origin_surface: field.collider(),
                        eaves_height: Some(field.low_edge_height()),
                    })
                }
            };
            (kind, proximity, cross, spawn)
        };

        if let Some(spawn) = spawn {
            self.spawn_clump(spawn);
        }

        match kind {
            StrikeKind::Avalanche => {
                let sequence = CascadeSequence::avalanche(entity, cross, now, &self.tuning);
                self.start_sequence(sequence);
                StrikeOutcome::Avalanche
            }
            StrikeKind::Slab => {
                let cascade_started = self.tuning.cascade_fall_steps > 0;
                if cascade_started {
                    let sequence = CascadeSequence::cascade_fall(entity, proximity, cross, now, &self.tuning);
                    self.start_sequence(sequence);
                }
                StrikeOutcome::Slab { cascade_started }
            }
            StrikeKind::Local => StrikeOutcome::Local,
        }
    }

    fn strike_cornice(&mut self, manager: Entity, segment: usize) -> StrikeOutcome {
        let Ok(mut cornice) = self.world.get::<&mut CorniceManager>(manager) else {
            return StrikeOutcome::Rejected(RejectReason::NoTarget);
        };
        match cornice.strike(&mut self.physics, segment) {
            0 => StrikeOutcome::Rejected(RejectReason::AlreadyCollapsed),
            collapsed => StrikeOutcome::Cornice { collapsed },
        }
    }

    fn strike_block(&mut self, entity: Entity, point: Vec3) -> StrikeOutcome {
        let (hit, body) = {
            let Ok(mut block) = self.world.get::<&mut SnowBlock>(entity) else {
                return StrikeOutcome::Rejected(RejectReason::NoTarget);
            };
            (block.hit(&mut self.physics, &mut self.rng, point), block.body())
        };
        match hit {
            BlockHit::Pushed => StrikeOutcome::Block { pieces: 0 },
            BlockHit::Broken(pieces) => {
                let count = pieces.len();
                self.physics.remove_body(body);
                let _ = self.world.despawn(entity);
                for piece in pieces {
                    self.world.spawn((piece,));
                }
                StrikeOutcome::Block { pieces: count }
            }
        }
    }

    fn strike_clump(&mut self, entity: Entity) -> StrikeOutcome {
        let removed = {
            let Ok(mut clump) = self.world.get::<&mut Clump>(entity) else {
                return StrikeOutcome::Rejected(RejectReason::NoTarget);
            };
            clump
                .remove_immediate(&self.physics, &self.tuning)
                .map(|emission| (emission, clump.body()))
        };
        match removed {
            Some((emission, body)) => {
                self.physics.remove_body(body);
                let _ = self.world.despawn(entity);
                self.emit_to_sink(emission);
                StrikeOutcome::ClumpRemoved
            }
            None => StrikeOutcome::Rejected(RejectReason::NoTarget),
        }
    }

    /// Start a sequence on a surface. An avalanche replaces everything in
    /// flight there; a cascade fall only replaces an earlier cascade fall.
    fn start_sequence(&mut self, sequence: CascadeSequence) {
        let before = self.sequences.len();
        let (surface, kind) = (sequence.surface(), sequence.kind());
        self.sequences.retain(|s| {
            s.surface() != surface || (kind == SequenceKind::CascadeFall && s.kind() != kind)
        });
        if self.sequences.len() < before {
            log::debug!("replacing in-flight {:?} on {:?}", sequence.kind(), sequence.surface());
        }
        self.sequences.push(sequence);
    }

    fn emit_to_sink(&mut self, emission: Emission) -> usize {
        match self.ground_sink.as_mut() {
            Some(sink) => sink.emit(
                &mut self.rng,
                emission.position,
                emission.count,
                self.tuning.sink_footprint,
                self.tuning.sink_lifetime,
            ),
            None => {
                log::debug!("no ground sink, {} samples dropped", emission.count);
                0
            }
        }
    }

    // ── Frame ───────────────────────────────────────────────────────────

    pub fn frame(&mut self, dt: f32) -> FrameReport {
        let mut report = FrameReport::default();

        self.time.advance_seconds(dt);
        self.physics.set_timestep(self.time.fixed_timestep_seconds());
        while self.time.should_fixed_update() {
            self.physics.step();
            report.physics_steps += 1;
        }
        let now = self.time.now();
        let dt = self.time.delta_seconds();

        for (_, block) in self.world.query_mut::<&mut SnowBlock>() {
            if block.check_knock_loose(&mut self.physics) {
                report.blocks_knocked += 1;
            }
        }

        self.advance_clumps(now, &mut report);
        self.run_sequences(now, &mut report);

        let (interval, fraction) = (self.tuning.edge_cleanup_interval, self.tuning.edge_band_fraction);
        for (_, field) in self.world.query_mut::<&mut SurfaceSnowField>() {
            report.edge_samples_removed += field.tick_edge_cleanup(dt, interval, fraction);
            field.age(dt);
        }
        if let Some(sink) = self.ground_sink.as_mut() {
            sink.age(dt);
        }

        report
    }

    fn advance_clumps(&mut self, now: f64, report: &mut FrameReport) {
        let mut merged = Vec::new();
        {
            let mut ctx = ClumpContext {
                physics: &mut self.physics,
                tuning: &self.tuning,
                noise: &self.noise,
                now,
            };
            for (entity, clump) in self.world.query_mut::<&mut Clump>() {
                match clump.advance(&mut ctx) {
                    ClumpStep::Merged(emission) => merged.push((entity, clump.body(), Some(emission))),
                    ClumpStep::Gone => merged.push((entity, clump.body(), None)),
                    ClumpStep::Active => {}
                }
            }
        }

        for (entity, body, emission) in merged {
            self.physics.remove_body(body);
            let _ = self.world.despawn(entity);
            if let Some(emission) = emission {
                report.clumps_merged += 1;
                report.ground_samples += self.emit_to_sink(emission);
            }
        }
    }

    fn run_sequences(&mut self, now: f64, report: &mut FrameReport) {
        let mut sequences = std::mem::take(&mut self.sequences);
        sequences.retain_mut(|sequence| match self.drive_sequence(sequence, now, report) {
            Some(summary) => {
                log::debug!(
                    "{:?} on {:?} finished after {} steps (cleared: {}, aborted: {})",
                    summary.kind,
                    summary.surface,
                    summary.steps,
                    summary.cleared,
                    summary.aborted
                );
                report.sequences_finished.push(summary);
                false
            }
            None => true,
        });
        sequences.append(&mut self.sequences);
        self.sequences = sequences;
    }

    /// Run every step that is due. Returns a summary once the sequence ends.
    fn drive_sequence(
        &mut self,
        sequence: &mut CascadeSequence,
        now: f64,
        report: &mut FrameReport,
    ) -> Option<SequenceSummary> {
        loop {
            if !self.world.contains(sequence.surface()) {
                return Some(SequenceSummary {
                    surface: sequence.surface(),
                    kind: sequence.kind(),
                    steps: sequence.steps_taken(),
                    cleared: false,
                    aborted: true,
                });
            }
            let step = match sequence.poll(now, &mut self.rng) {
                Some(step) => step,
                None if sequence.is_exhausted() => return Some(self.finish_sequence(sequence)),
                None => return None,
            };
            let remaining = self.sequence_step(sequence.surface(), step, report)?;
            if sequence.should_stop(remaining, &self.tuning) {
                return Some(self.finish_sequence(sequence));
            }
        }
    }

    /// Break snow off at one step position. `None` if the surface is gone.
    fn sequence_step(&mut self, surface: Entity, step: SequenceStep, report: &mut FrameReport) -> Option<usize> {
        let tuning = &self.tuning;
        let (spawn, remaining) = {
            let mut field = self.world.get::<&mut SurfaceSnowField>(surface).ok()?;
            let base = field.point_at(step.proximity, step.cross);
            let removed = field.remove_near(base, step.removal_radius);
            field.remove_edge_band(tuning.edge_band_fraction);
            log::trace!(
                "sequence step {} at proximity {:.2} removed {}",
                step.index,
                step.proximity,
                removed
            );
            let spawn = (removed > 0).then(|| ClumpSpawn {
                position: base + Vec3::Y * tuning.spawn_lift,
                blueprint: ClumpBlueprint::random(&mut self.rng, FootprintProfile::Cascade),
                slide_direction: field.slide_direction(),
                style: SettleStyle::Roof,
                origin_surface: field.collider(),
                eaves_height: Some(field.low_edge_height()),
            });
            (spawn, field.remaining_mass())
        };
        if let Some(spawn) = spawn {
            self.spawn_clump(spawn);
            report.clumps_spawned += 1;
        }
        Some(remaining)
    }

    fn finish_sequence(&mut self, sequence: &CascadeSequence) -> SequenceSummary {
        let mut cleared = false;
        if let Ok(mut field) = self.world.get::<&mut SurfaceSnowField>(sequence.surface()) {
            if sequence.wants_final_clear(field.remaining_mass(), &self.tuning) {
                let removed = field.clear_all();
                log::trace!("cleared {} leftover samples", removed);
                cleared = true;
            }
        }
        SequenceSummary {
            surface: sequence.surface(),
            kind: sequence.kind(),
            steps: sequence.steps_taken(),
            cleared,
            aborted: false,
        }
    }
}
