//! Simulation clock.
//!
//! `Time` is driven by explicit frame deltas (there is no wall clock behind
//! it) and banks them for a fixed-timestep physics loop, so physics ticks
//! at its own rate regardless of how frames are paced.

use std::time::Duration;

/// Frame clock plus fixed-step accumulator.
#[derive(Debug)]
pub struct Time {
    /// Last frame delta after clamping.
    frame: Duration,
    /// Simulated time since construction.
    clock: Duration,
    /// Physics tick length (60 Hz unless changed).
    tick: Duration,
    /// Frame time not yet consumed by physics ticks.
    banked: Duration,
    /// Longest frame delta accepted; anything above is cut down.
    max_frame: Duration,
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

impl Time {
    pub fn new() -> Self {
        Self {
            frame: Duration::ZERO,
            clock: Duration::ZERO,
            tick: Duration::from_secs_f64(1.0 / 60.0),
            banked: Duration::ZERO,
            max_frame: Duration::from_millis(250),
        }
    }

    /// Move the clock forward by one frame.
    pub fn advance(&mut self, delta: Duration) {
        self.frame = delta.min(self.max_frame);
        self.clock += self.frame;
        self.banked += self.frame;
    }

    /// Same as [`Time::advance`], in seconds. Negative deltas count as zero.
    pub fn advance_seconds(&mut self, dt: f32) {
        self.advance(Duration::from_secs_f32(dt.max(0.0)));
    }

    pub fn delta_seconds(&self) -> f32 {
        self.frame.as_secs_f32()
    }

    /// Simulated seconds since start at full precision. Schedules
    /// (debounce windows, sequence steps) are measured against this.
    pub fn now(&self) -> f64 {
        self.clock.as_secs_f64()
    }

    pub fn fixed_timestep_seconds(&self) -> f32 {
        self.tick.as_secs_f32()
    }

    /// Consume one physics tick from the bank if enough time is banked.
    pub fn should_fixed_update(&mut self) -> bool {
        match self.banked.checked_sub(self.tick) {
            Some(rest) => {
                self.banked = rest;
                true
            }
            None => false,
        }
    }

    /// Physics tick rate in Hz. Non-positive rates are ignored.
    pub fn set_fixed_rate(&mut self, hz: f64) {
        if hz > 0.0 {
            self.tick = Duration::from_secs_f64(1.0 / hz);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(time: &mut Time) -> usize {
        let mut ticks = 0;
        while time.should_fixed_update() {
            ticks += 1;
        }
        ticks
    }

    #[test]
    fn frame_time_is_banked_into_ticks() {
        let mut time = Time::new();
        time.advance_seconds(0.055);
        // 55 ms at 60 Hz: three ticks, about 5 ms stays banked.
        assert_eq!(drain(&mut time), 3);
        assert!((time.now() - 0.055).abs() < 1e-6);
        time.advance_seconds(0.015);
        assert_eq!(drain(&mut time), 1, "banked remainder carries into the next frame");
    }

    #[test]
    fn fixed_rate_changes_tick_count() {
        let mut time = Time::new();
        time.set_fixed_rate(120.0);
        time.set_fixed_rate(0.0);
        time.advance_seconds(0.055);
        assert_eq!(drain(&mut time), 6);
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut time = Time::new();
        time.advance_seconds(5.0);
        assert!(time.delta_seconds() <= 0.25 + 1e-6, "frame delta should be clamped");
        assert!(time.now() < 0.26);
    }
}
