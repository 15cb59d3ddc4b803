//! Tuned constants for strike handling, clump motion and settling.
//!
//! None of these are derived; they were picked by eye and are meant to be
//! overridden from config. Every field falls back to its default when
//! missing from the config file.

use crate::error::{Result, SnowError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowTuning {
    // ── Strike gating ───────────────────────────────────────────────────
    /// Minimum spacing between two direct strikes on one surface (seconds).
    pub debounce_seconds: f32,
    /// Strikes are ignored once a surface holds fewer live samples than this.
    pub min_strike_mass: usize,
    /// Proximity above which strikes are refused on surfaces that cannot
    /// be reached to the top.
    pub reach_cutoff: f32,

    // ── Classification ──────────────────────────────────────────────────
    /// Proximity at or above which a hit breaks off a slab.
    pub slab_threshold: f32,
    /// Proximity at or above which a direct hit on a reachable surface
    /// starts an avalanche.
    pub avalanche_threshold: f32,

    // ── Avalanche sequence ──────────────────────────────────────────────
    pub avalanche_step_delay: f32,
    pub avalanche_max_steps: u32,
    /// Stop stepping once remaining mass falls below this.
    pub avalanche_stop_mass: usize,
    /// After the last step, clear everything if fewer samples than this remain.
    pub avalanche_clear_mass: usize,
    /// Cross-axis jitter per step, as a fraction of the surface half-width.
    pub avalanche_cross_jitter: f32,
    pub avalanche_removal_radius: f32,

    // ── Cascade fall (after a direct slab hit) ──────────────────────────
    pub cascade_fall_steps: u32,
    pub cascade_fall_delay: f32,
    pub cascade_fall_removal_radius: f32,

    // ── Low edge cleanup ────────────────────────────────────────────────
    /// Width of the low-edge band, as a proximity value.
    pub edge_band_fraction: f32,
    pub edge_cleanup_interval: f32,

    // ── Clump motion ────────────────────────────────────────────────────
    /// Height above the strike point at which clumps spawn.
    pub spawn_lift: f32,
    /// Initial speed along the slide direction.
    pub slide_speed: f32,
    /// Delay before the one-off "has it moved at all" check.
    pub grace_delay: f32,
    pub grace_min_travel: f32,
    pub stuck_speed: f32,
    pub stuck_dwell: f32,
    /// Recovery impulse per unit of body mass.
    pub stuck_impulse: f32,
    /// Distance below the origin surface's low edge that counts as past the eaves.
    pub eaves_margin: f32,
    /// World height under which a slow or touching clump is considered landed.
    pub land_height: f32,
    pub land_speed: f32,

    // ── Settling ────────────────────────────────────────────────────────
    pub roof_fade: f32,
    pub ground_fade: f32,

    // ── Ground sink emission ────────────────────────────────────────────
    pub sink_emit_cap: usize,
    pub sink_lifetime: f32,
    /// Half-width of the square footprint emitted samples scatter over.
    pub sink_footprint: f32,
    pub sink_height: f32,

    // ── Falling deformation ─────────────────────────────────────────────
    pub deform_base: f32,
    pub deform_per_speed: f32,
    pub deform_max_offset: f32,
}

impl Default for SnowTuning {
    fn default() -> Self {
        Self {
            debounce_seconds: 0.4,
            min_strike_mass: 1,
            reach_cutoff: 0.45,

            slab_threshold: 0.5,
            avalanche_threshold: 0.6,

            avalanche_step_delay: 0.09,
            avalanche_max_steps: 18,
            avalanche_stop_mass: 30,
            avalanche_clear_mass: 150,
            avalanche_cross_jitter: 0.15,
            avalanche_removal_radius: 0.32,

            cascade_fall_steps: 4,
            cascade_fall_delay: 0.12,
            cascade_fall_removal_radius: 0.22,

            edge_band_fraction: 0.06,
            edge_cleanup_interval: 0.15,

            spawn_lift: 0.25,
            slide_speed: 0.25,
            grace_delay: 0.25,
            grace_min_travel: 0.05,
            stuck_speed: 0.15,
            stuck_dwell: 0.06,
            stuck_impulse: 1.2,
            eaves_margin: 0.1,
            land_height: 0.6,
            land_speed: 0.05,

            roof_fade: 0.15,
            ground_fade: 0.5,

            sink_emit_cap: 60,
            sink_lifetime: 9999.0,
            sink_footprint: 0.25,
            sink_height: 0.15,

            deform_base: 0.03,
            deform_per_speed: 0.08,
            deform_max_offset: 0.12,
        }
    }
}

impl SnowTuning {
    /// Thresholds must be ordered for the classification bands to make sense.
    pub fn bands_are_ordered(&self) -> bool {
        self.slab_threshold <= self.avalanche_threshold
            && (0.0..=1.0).contains(&self.slab_threshold)
            && (0.0..=1.0).contains(&self.avalanche_threshold)
    }

    /// Reject values that would break strike handling at runtime: negative
    /// or non-finite durations, distances and speeds, and proximities
    /// outside 0..1.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("debounce_seconds", self.debounce_seconds),
            ("avalanche_step_delay", self.avalanche_step_delay),
            ("avalanche_cross_jitter", self.avalanche_cross_jitter),
            ("avalanche_removal_radius", self.avalanche_removal_radius),
            ("cascade_fall_delay", self.cascade_fall_delay),
            ("cascade_fall_removal_radius", self.cascade_fall_removal_radius),
            ("edge_cleanup_interval", self.edge_cleanup_interval),
            ("spawn_lift", self.spawn_lift),
            ("slide_speed", self.slide_speed),
            ("grace_delay", self.grace_delay),
            ("grace_min_travel", self.grace_min_travel),
            ("stuck_speed", self.stuck_speed),
            ("stuck_dwell", self.stuck_dwell),
            ("stuck_impulse", self.stuck_impulse),
            ("eaves_margin", self.eaves_margin),
            ("land_speed", self.land_speed),
            ("roof_fade", self.roof_fade),
            ("ground_fade", self.ground_fade),
            ("sink_lifetime", self.sink_lifetime),
            ("sink_footprint", self.sink_footprint),
            ("deform_base", self.deform_base),
            ("deform_per_speed", self.deform_per_speed),
            ("deform_max_offset", self.deform_max_offset),
        ];
        if let Some((name, value)) = non_negative.iter().find(|(_, v)| !(v.is_finite() && *v >= 0.0)) {
            return Err(SnowError::InvalidTuning(format!("{} must be finite and >= 0, got {}", name, value)));
        }
        let unit = [
            ("reach_cutoff", self.reach_cutoff),
            ("edge_band_fraction", self.edge_band_fraction),
        ];
        if let Some((name, value)) = unit.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(SnowError::InvalidTuning(format!("{} must lie in 0..=1, got {}", name, value)));
        }
        if !self.bands_are_ordered() {
            return Err(SnowError::InvalidTuning(format!(
                "slab threshold {} and avalanche threshold {} must lie in 0..=1, slab first",
                self.slab_threshold, self.avalanche_threshold
            )));
        }
        if !self.land_height.is_finite() || !self.sink_height.is_finite() {
            return Err(SnowError::InvalidTuning("land and sink heights must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SnowTuning::default().validate().is_ok());
    }

    #[test]
    fn negative_footprint_is_rejected() {
        let tuning = SnowTuning {
            sink_footprint: -0.1,
            ..Default::default()
        };
        let err = tuning.validate().expect_err("negative footprint");
        assert!(err.to_string().contains("sink_footprint"), "{}", err);
    }

    #[test]
    fn nan_and_out_of_range_values_are_rejected() {
        let nan = SnowTuning {
            stuck_dwell: f32::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
        let reach = SnowTuning {
            reach_cutoff: 1.5,
            ..Default::default()
        };
        assert!(reach.validate().is_err());
        let bands = SnowTuning {
            slab_threshold: 0.7,
            avalanche_threshold: 0.6,
            ..Default::default()
        };
        assert!(bands.validate().is_err());
    }
}
