//! Strike classification and the timed collapse sequences.
//!
//! A sequence is a plain step generator: it holds its own progress and the
//! clock time of its next step, and the scene polls it once per frame.
//! Cancelling one is just dropping it.

use crate::tuning::SnowTuning;
use hecs::Entity;
use rand::Rng;

/// How a strike on accumulated snow is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeKind {
    /// One small, narrow clump.
    Local,
    /// One big clump, plus a short cascade when struck directly.
    Slab,
    /// Full sweep from the high edge to the low edge.
    Avalanche,
}

/// Why a strike did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The surface is (essentially) empty.
    NoMass,
    /// Too soon after the previous direct strike.
    Debounced,
    /// Near the high edge of a surface that cannot be reached to the top.
    OutOfReach,
    /// Target entity no longer exists.
    NoTarget,
    /// Every segment/block the strike could affect already fell.
    AlreadyCollapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeOutcome {
    Rejected(RejectReason),
    Local,
    /// `cascade_started` is false when cascade falls are tuned off.
    Slab { cascade_started: bool },
    Avalanche,
    /// Number of cornice segments that started falling.
    Cornice { collapsed: usize },
    /// A resting clump was struck and merged on the spot.
    ClumpRemoved,
    /// A snow block was knocked loose or broken into `pieces`.
    Block { pieces: usize },
}

impl StrikeOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, StrikeOutcome::Rejected(_))
    }
}

/// Pick a collapse policy for an accepted strike. Boundaries are inclusive:
/// exactly the slab threshold is a slab, exactly the avalanche threshold
/// on a reachable surface is an avalanche. Only direct strikes come through
/// here; sequence steps spawn their clumps without classification.
pub fn classify(proximity: f32, reachable_to_top: bool, tuning: &SnowTuning) -> StrikeKind {
    if proximity >= tuning.avalanche_threshold && reachable_to_top {
        StrikeKind::Avalanche
    } else if proximity >= tuning.slab_threshold {
        StrikeKind::Slab
    } else {
        StrikeKind::Local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    Avalanche,
    /// Short walk toward the low edge after a direct slab hit.
    CascadeFall,
}

/// One due step: where on the surface to break snow off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceStep {
    pub index: u32,
    pub proximity: f32,
    /// Cross-axis coordinate, -1..1.
    pub cross: f32,
    pub removal_radius: f32,
}

#[derive(Debug, Clone)]
pub struct CascadeSequence {
    surface: Entity,
    kind: SequenceKind,
    from_proximity: f32,
    to_proximity: f32,
    cross: f32,
    jitter: f32,
    removal_radius: f32,
    delay: f64,
    max_steps: u32,
    steps_taken: u32,
    next_at: f64,
}

impl CascadeSequence {
    /// Sweep from just under the high edge to just above the low edge.
    /// The first step is due immediately.
    pub fn avalanche(surface: Entity, cross: f32, now: f64, tuning: &SnowTuning) -> Self {
        Self {
            surface,
            kind: SequenceKind::Avalanche,
            from_proximity: 0.95,
            to_proximity: 0.05,
            cross,
            jitter: tuning.avalanche_cross_jitter,
            removal_radius: tuning.avalanche_removal_radius,
            delay: f64::from(tuning.avalanche_step_delay),
            max_steps: tuning.avalanche_max_steps.max(1),
            steps_taken: 0,
            next_at: now,
        }
    }

    /// Walk from a slab hit down to the low edge. The first step comes one
    /// delay after the hit so it does not overlap the slab itself.
    pub fn cascade_fall(surface: Entity, from_proximity: f32, cross: f32, now: f64, tuning: &SnowTuning) -> Self {
        let delay = f64::from(tuning.cascade_fall_delay);
        Self {
            surface,
            kind: SequenceKind::CascadeFall,
            from_proximity,
            to_proximity: 0.0,
            cross,
            jitter: tuning.avalanche_cross_jitter * 0.5,
            removal_radius: tuning.cascade_fall_removal_radius,
            delay,
            max_steps: tuning.cascade_fall_steps.max(1),
            steps_taken: 0,
            next_at: now + delay,
        }
    }

    pub fn surface(&self) -> Entity {
        self.surface
    }

    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps_taken >= self.max_steps
    }

    /// Position along the sweep for step `index`.
    fn proximity_for(&self, index: u32) -> f32 {
        let t = match self.kind {
            SequenceKind::Avalanche if self.max_steps > 1 => index as f32 / (self.max_steps - 1) as f32,
            SequenceKind::Avalanche => 0.0,
            SequenceKind::CascadeFall => (index + 1) as f32 / self.max_steps as f32,
        };
        self.from_proximity + (self.to_proximity - self.from_proximity) * t
    }

    /// Return the next step if it is due at `now`, advancing progress.
    pub fn poll<R: Rng>(&mut self, now: f64, rng: &mut R) -> Option<SequenceStep> {
        if self.is_exhausted() || now < self.next_at {
            return None;
        }
        let index = self.steps_taken;
        let jitter = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        self.steps_taken += 1;
        self.next_at += self.delay;
        Some(SequenceStep {
            index,
            proximity: self.proximity_for(index),
            cross: (self.cross + jitter).clamp(-1.0, 1.0),
            removal_radius: self.removal_radius,
        })
    }

    /// Should the sequence stop after a step left `remaining` samples?
    pub fn should_stop(&self, remaining: usize, tuning: &SnowTuning) -> bool {
        if self.is_exhausted() {
            return true;
        }
        match self.kind {
            SequenceKind::Avalanche => remaining < tuning.avalanche_stop_mass,
            SequenceKind::CascadeFall => remaining < tuning.min_strike_mass,
        }
    }

    /// After stopping, does the leftover need a forced clear?
    pub fn wants_final_clear(&self, remaining: usize, tuning: &SnowTuning) -> bool {
        self.kind == SequenceKind::Avalanche && remaining > 0 && remaining < tuning.avalanche_clear_mass
    }
}

/// How a finished sequence ended, reported once per sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSummary {
    pub surface: Entity,
    pub kind: SequenceKind,
    pub steps: u32,
    pub cleared: bool,
    /// The surface was gone before the sequence could finish.
    pub aborted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn surface_entity() -> Entity {
        let mut world = hecs::World::new();
        world.spawn(())
    }

    #[test]
    fn classification_boundaries_are_inclusive() {
        let t = SnowTuning::default();
        assert_eq!(classify(0.49, true, &t), StrikeKind::Local);
        assert_eq!(classify(0.5, true, &t), StrikeKind::Slab);
        assert_eq!(classify(0.59, true, &t), StrikeKind::Slab);
        assert_eq!(classify(0.6, true, &t), StrikeKind::Avalanche);
    }

    #[test]
    fn avalanche_needs_a_reachable_surface() {
        let t = SnowTuning::default();
        assert_eq!(classify(0.9, false, &t), StrikeKind::Slab);
        assert_eq!(classify(0.9, true, &t), StrikeKind::Avalanche);
        assert_eq!(classify(0.2, false, &t), StrikeKind::Local);
    }

    #[test]
    fn avalanche_steps_are_spaced_and_walk_downhill() {
        let tuning = SnowTuning::default();
        let mut rng = StdRng::seed_from_u64(4);
        let mut seq = CascadeSequence::avalanche(surface_entity(), 0.0, 10.0, &tuning);

        let first = seq.poll(10.0, &mut rng).expect("first step is due immediately");
        assert_eq!(first.index, 0);
        assert!(seq.poll(10.05, &mut rng).is_none(), "second step waits one delay");
        let second = seq.poll(10.1, &mut rng).expect("second step due");
        assert!(second.proximity < first.proximity);
        assert!(second.cross.abs() <= tuning.avalanche_cross_jitter + 1e-6);

        let mut now = 10.1;
        let mut last = second;
        while let Some(step) = {
            now += 0.1;
            seq.poll(now, &mut rng)
        } {
            last = step;
        }
        assert_eq!(seq.steps_taken(), tuning.avalanche_max_steps);
        assert!((last.proximity - 0.05).abs() < 1e-5, "last step reaches the low edge band");
        assert!(seq.should_stop(10_000, &tuning));
    }

    #[test]
    fn cascade_fall_ends_at_low_edge() {
        let tuning = SnowTuning::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut seq = CascadeSequence::cascade_fall(surface_entity(), 0.5, 0.2, 0.0, &tuning);
        assert!(seq.poll(0.0, &mut rng).is_none());
        let mut proximities = Vec::new();
        let mut now = 0.0;
        for _ in 0..20 {
            now += 0.2;
            if let Some(step) = seq.poll(now, &mut rng) {
                proximities.push(step.proximity);
            }
        }
        assert_eq!(proximities.len(), 4);
        assert!(proximities.windows(2).all(|w| w[1] < w[0]));
        assert!(proximities[3].abs() < 1e-6);
    }

    #[test]
    fn final_clear_only_for_sparse_avalanche_leftovers() {
        let tuning = SnowTuning::default();
        let seq = CascadeSequence::avalanche(surface_entity(), 0.0, 0.0, &tuning);
        assert!(seq.wants_final_clear(40, &tuning));
        assert!(!seq.wants_final_clear(0, &tuning));
        assert!(!seq.wants_final_clear(500, &tuning));
        assert!(seq.should_stop(29, &tuning));
        assert!(!seq.should_stop(30, &tuning));
    }
}
