//! Demo configuration (run length, tuning, yard, scripted strikes). Loaded from config.ron at startup.

use serde::{Deserialize, Serialize};
use snow::SnowTuning;
use std::path::{Path, PathBuf};

/// Which part of the yard a scripted strike aims at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StrikeAim {
    /// Front roof slope at a proximity / cross-axis coordinate.
    FrontRoof { proximity: f32, cross: f32 },
    /// Back roof slope (not reachable to the top).
    BackRoof { proximity: f32, cross: f32 },
    CorniceSegment(usize),
    Block(usize),
    /// Whatever clump is currently in flight, if any.
    AnyClump,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptedStrike {
    /// Seconds since start.
    pub at: f32,
    pub aim: StrikeAim,
}

/// Static layout of the demo yard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YardLayout {
    pub ridge_height: f32,
    pub roof_pitch_degrees: f32,
    pub roof_half_width: f32,
    /// Half length of one slope, ridge to eaves.
    pub roof_half_depth: f32,
    pub snow_thickness: f32,
    pub samples_per_slope: usize,
    pub back_reachable_to_top: bool,
    pub porch: bool,
    pub decor_rocks: usize,
    pub ground_blanket: usize,
    pub cornice_segments: usize,
    pub cornice_rows: usize,
    pub blocks: usize,
}

impl Default for YardLayout {
    fn default() -> Self {
        Self {
            ridge_height: 2.3,
            roof_pitch_degrees: 25.0,
            roof_half_width: 0.625,
            roof_half_depth: 0.5,
            snow_thickness: 0.08,
            samples_per_slope: 26_000,
            back_reachable_to_top: false,
            porch: true,
            decor_rocks: 4,
            ground_blanket: 2_000,
            cornice_segments: 30,
            cornice_rows: 1,
            blocks: 2,
        }
    }
}

/// Persistent demo settings. Loaded from `config.ron` in the current directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Simulated run length in seconds.
    #[serde(default = "default_run_seconds")]
    pub run_seconds: f32,
    /// Frame rate of the headless loop.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
    /// Fixed physics tick rate.
    #[serde(default = "default_frame_rate")]
    pub physics_rate: f32,
    /// Fixed seed for reproducible runs; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Ground sink capacity. Zero runs without a sink.
    #[serde(default = "default_sink_capacity")]
    pub ground_sink_capacity: usize,
    #[serde(default)]
    pub tuning: SnowTuning,
    #[serde(default)]
    pub yard: YardLayout,
    #[serde(default = "default_strikes")]
    pub strikes: Vec<ScriptedStrike>,
}

fn default_run_seconds() -> f32 {
    10.0
}
fn default_frame_rate() -> f32 {
    60.0
}
fn default_sink_capacity() -> usize {
    30_000
}
fn default_strikes() -> Vec<ScriptedStrike> {
    use StrikeAim::*;
    vec![
        ScriptedStrike { at: 0.5, aim: FrontRoof { proximity: 0.2, cross: 0.0 } },
        ScriptedStrike { at: 1.0, aim: BackRoof { proximity: 0.9, cross: 0.0 } },
        ScriptedStrike { at: 1.2, aim: BackRoof { proximity: 0.3, cross: -0.4 } },
        ScriptedStrike { at: 1.6, aim: FrontRoof { proximity: 0.5, cross: 0.5 } },
        ScriptedStrike { at: 1.7, aim: FrontRoof { proximity: 0.2, cross: 0.5 } },
        ScriptedStrike { at: 2.0, aim: AnyClump },
        ScriptedStrike { at: 3.0, aim: FrontRoof { proximity: 0.85, cross: 0.0 } },
        ScriptedStrike { at: 4.0, aim: CorniceSegment(1) },
        ScriptedStrike { at: 5.0, aim: CorniceSegment(15) },
        ScriptedStrike { at: 5.5, aim: Block(0) },
        ScriptedStrike { at: 6.0, aim: Block(1) },
    ]
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            run_seconds: default_run_seconds(),
            frame_rate: default_frame_rate(),
            physics_rate: default_frame_rate(),
            seed: None,
            ground_sink_capacity: default_sink_capacity(),
            tuning: SnowTuning::default(),
            yard: YardLayout::default(),
            strikes: default_strikes(),
        }
    }
}

impl DemoConfig {
    /// Load config from `config.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match ron::from_str::<Self>(&data) {
                Ok(c) => return c.with_valid_tuning(),
                Err(e) => log::warn!("Invalid config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }

    /// Swap out tuning that would misbehave at runtime for the defaults.
    fn with_valid_tuning(mut self) -> Self {
        if let Err(e) = self.tuning.validate() {
            log::warn!("{}, using default tuning", e);
            self.tuning = SnowTuning::default();
        }
        self
    }

    /// Save current config to `config.ron`. Logs on error.
    pub fn save(&self) {
        let path = config_path();
        if let Ok(s) = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            if let Err(e) = std::fs::write(&path, s) {
                log::warn!("Could not write config to {:?}: {}", path, e);
            }
        }
    }

    /// Frame delta of the headless loop.
    pub fn frame_seconds(&self) -> f32 {
        1.0 / self.frame_rate.max(1.0)
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("config.ron")
}
