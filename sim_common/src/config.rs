//! Process-wide simulator configuration (§6), loadable from TOML.
//!
//! `max_ops_per_tick` is profile-sourced only (§6: "from profile; default
//! 3") — each engine reads it off its loaded `EngineProfile`'s baseline
//! performance map, so it has no field here.

use crate::complexity::ComplexityLevel;
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default tick duration: 10 microseconds.
pub const DEFAULT_TICK_DURATION_NS: u64 = 10_000;
/// Default fetch width (ops moved from inbox to engine queue per tick).
pub const DEFAULT_FETCH_WIDTH: usize = 3;

/// Complexity-dependent timeout bounds for tick/pause/resume sends (§6).
const TIMEOUT_FLOOR_US: u64 = 50;
const TIMEOUT_CEIL_US: u64 = 500;

/// Top-level simulator configuration, loaded once at wrapper construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulated duration of one tick, in nanoseconds.
    #[serde(default = "default_tick_duration_ns")]
    pub tick_duration_ns: u64,
    /// Max operations moved from inbox to engine queue per fetch cycle.
    #[serde(default = "default_fetch_width")]
    pub fetch_width: usize,
    /// Complexity level driving feature gating and timeout scaling.
    #[serde(default)]
    pub complexity_level: RawComplexityLevel,
    /// Seed for the engine base's deterministic variance generator.
    #[serde(default)]
    pub variance_seed: u64,
    /// Cache-pressure default the profile doesn't document (§9 open question).
    #[serde(default = "default_pressure_factor")]
    pub pressure_factor: f64,
}

/// Wire-friendly wrapper so TOML can carry either an int or nothing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RawComplexityLevel(pub i64);

fn default_tick_duration_ns() -> u64 {
    DEFAULT_TICK_DURATION_NS
}
fn default_fetch_width() -> usize {
    DEFAULT_FETCH_WIDTH
}
fn default_pressure_factor() -> f64 {
    0.3
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_duration_ns: DEFAULT_TICK_DURATION_NS,
            fetch_width: DEFAULT_FETCH_WIDTH,
            complexity_level: RawComplexityLevel(ComplexityLevel::Advanced as i64),
            variance_seed: 0,
            pressure_factor: 0.3,
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&content)
            .map_err(|e| SimError::InvalidProfile { path: path.display().to_string(), reason: e.to_string() })?;
        Ok(config)
    }

    /// Resolved complexity level (falls back to `Advanced` on bad input).
    pub fn complexity_level(&self) -> ComplexityLevel {
        ComplexityLevel::from_raw(self.complexity_level.0)
    }

    /// Complexity-dependent timeout for `process_tick`/pause/resume sends.
    ///
    /// Higher complexity levels run a longer pipeline, so they're granted
    /// more time: Minimal=50us .. Maximum=500us, linearly spaced.
    pub fn tick_timeout(&self) -> Duration {
        let level = self.complexity_level() as u64;
        let span = TIMEOUT_CEIL_US - TIMEOUT_FLOOR_US;
        let us = TIMEOUT_FLOOR_US + span * level / 3;
        Duration::from_micros(us)
    }

    /// Same scaling as `tick_timeout`, used for pause sends.
    pub fn pause_timeout(&self) -> Duration {
        self.tick_timeout()
    }

    /// Same scaling as `tick_timeout`, used for resume sends.
    pub fn resume_timeout(&self) -> Duration {
        self.tick_timeout()
    }

    /// Tick duration as a `Duration`.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(self.tick_duration_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.tick_duration_ns, 10_000);
        assert_eq!(cfg.fetch_width, 3);
    }

    #[test]
    fn timeout_scales_with_complexity() {
        let mut cfg = SimConfig::default();
        cfg.complexity_level = RawComplexityLevel(0);
        assert_eq!(cfg.tick_timeout(), Duration::from_micros(50));
        cfg.complexity_level = RawComplexityLevel(3);
        assert_eq!(cfg.tick_timeout(), Duration::from_micros(500));
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        std::fs::write(&path, "tick_duration_ns = 20000\nfetch_width = 5\n").unwrap();
        let cfg = SimConfig::load(&path).unwrap();
        assert_eq!(cfg.tick_duration_ns, 20_000);
        assert_eq!(cfg.fetch_width, 5);
    }
}
