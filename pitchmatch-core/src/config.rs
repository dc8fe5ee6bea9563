//! # Trainer Configuration
//!
//! Runtime parameters for matching, analysis and scheduling. Loaded from a
//! JSON file so thresholds can be adjusted without recompiling; every field
//! falls back to its default when omitted.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete trainer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Half-width of the tolerance band around the target, in Hz.
    pub tolerance_hz: f32,
    /// Continuous in-tolerance time required to confirm a match.
    pub hold_duration_ms: u64,
    /// Estimates below this confidence are treated as silence.
    pub confidence_threshold: f32,
    /// Analysis window size in samples.
    pub window_size: usize,
    /// Polling cadence of the session tick.
    pub tick_rate_hz: f32,
    /// RMS below which a frame is considered silent.
    pub min_rms: f32,
    /// Pick a random target as soon as the session starts.
    pub select_on_start: bool,
    /// Play the reference tone whenever a target is selected.
    pub play_reference_tone: bool,
    /// Length of the reference tone.
    pub tone_duration_ms: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            tolerance_hz: 20.0,
            hold_duration_ms: 1000,
            confidence_threshold: 0.9,
            window_size: 2048,
            tick_rate_hz: 60.0,
            min_rms: 0.01,
            select_on_start: true,
            play_reference_tone: true,
            tone_duration_ms: 1000,
        }
    }
}

impl TrainerConfig {
    /// Reads and validates a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        log::info!("[CONFIG] Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`TrainerConfig::from_file`], but falls back to defaults on any error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("[CONFIG] {:#}. Using defaults.", err);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance_hz > 0.0) {
            bail!("tolerance_hz must be positive (got {})", self.tolerance_hz);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1] (got {})",
                self.confidence_threshold
            );
        }
        if self.window_size < 64 {
            bail!("window_size must be at least 64 samples (got {})", self.window_size);
        }
        if !(self.tick_rate_hz > 0.0) {
            bail!("tick_rate_hz must be positive (got {})", self.tick_rate_hz);
        }
        if !(self.min_rms >= 0.0) {
            bail!("min_rms must not be negative (got {})", self.min_rms);
        }
        Ok(())
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_duration_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_rate_hz)
    }

    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_duration_ms)
    }
}
