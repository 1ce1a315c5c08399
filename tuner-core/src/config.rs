//! # Engine Configuration
//!
//! Read-only JSON configuration for the tuner and metronome engines. Every
//! field has a default, so an empty object (or no file at all) is valid.

use crate::envelope::ToneEnvelope;
use crate::error::ConfigError;
use crate::metronome::Tempo;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tuner: TunerConfig,
    pub metronome: MetronomeConfig,
}

/// Pitch detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Samples per analysis frame
    pub frame_size: usize,
    /// Preferred capture rate; the device may pick another
    pub sample_rate: u32,
    /// Frames with an RMS below this are treated as silence
    pub noise_gate_rms: f32,
    /// Amplitude below which edge samples count as quiet when trimming
    pub trim_threshold: f32,
    /// Tolerance for reporting a note as in tune
    pub in_tune_cents: f32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            frame_size: crate::audio::BUFFER_SIZE,
            sample_rate: 44100,
            noise_gate_rms: 0.01,
            trim_threshold: 0.2,
            in_tune_cents: crate::tuning::IN_TUNE_CENTS,
        }
    }
}

/// Metronome settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub default_bpm: u32,
    /// Cadence of the maintenance tick
    pub tick_interval_ms: u64,
    /// How far ahead of the audio clock beats are committed
    pub lookahead_ms: u64,
    pub downbeat_hz: f32,
    pub beat_hz: f32,
    pub envelope: ToneEnvelope,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            default_bpm: 120,
            tick_interval_ms: 25,
            lookahead_ms: 100,
            downbeat_hz: 1000.0,
            beat_hz: 800.0,
            envelope: ToneEnvelope::default(),
        }
    }
}

impl MetronomeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn default_tempo(&self) -> Result<Tempo, ConfigError> {
        Ok(Tempo::new(self.default_bpm)?)
    }
}

impl Config {
    /// Loads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tuner;
        if t.frame_size < 3 {
            return Err(invalid(format!("frame_size must be at least 3, got {}", t.frame_size)));
        }
        if t.sample_rate == 0 {
            return Err(invalid("sample_rate must be positive"));
        }
        if !(t.noise_gate_rms >= 0.0) || !(t.trim_threshold > 0.0) || !(t.in_tune_cents > 0.0) {
            return Err(invalid("tuner thresholds must be positive"));
        }

        let m = &self.metronome;
        m.default_tempo()?;
        if m.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms must be positive"));
        }
        // Beats are only committed inside the lookahead window, so a window
        // shorter than one tick leaves gaps where beats are scheduled late.
        if m.lookahead_ms <= m.tick_interval_ms {
            return Err(invalid(format!(
                "lookahead_ms ({}) must exceed tick_interval_ms ({})",
                m.lookahead_ms, m.tick_interval_ms
            )));
        }
        if !(m.downbeat_hz > 0.0) || !(m.beat_hz > 0.0) {
            return Err(invalid("click frequencies must be positive"));
        }
        m.envelope.validate().map_err(invalid)?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
