//! # Click Synthesis
//!
//! Short sine tones shaped by an exponential attack/decay envelope. Hard
//! onsets and offsets are audible as clicks of their own, so both ramps are
//! exponential and the tone is silent outside `[start, start + decay)`.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Amplitude envelope of a click.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneEnvelope {
    /// Time from onset to peak gain
    pub attack_secs: f64,
    /// Time from onset until the gain is back at the floor; also the tone length
    pub decay_secs: f64,
    pub peak_gain: f32,
    /// Gain the ramps start from and return to (exponential ramps cannot reach 0)
    pub floor_gain: f32,
}

impl Default for ToneEnvelope {
    fn default() -> Self {
        Self {
            attack_secs: 0.001,
            decay_secs: 0.05,
            peak_gain: 1.0,
            floor_gain: 0.001,
        }
    }
}

impl ToneEnvelope {
    /// Total length of a tone using this envelope.
    pub fn duration(&self) -> f64 {
        self.decay_secs
    }

    /// Gain `t` seconds after onset. Zero before the onset and after the decay.
    pub fn gain_at(&self, t: f64) -> f32 {
        if t < 0.0 || t >= self.decay_secs {
            return 0.0;
        }
        let peak = self.peak_gain as f64;
        let floor = self.floor_gain as f64;
        let gain = if t < self.attack_secs {
            floor * (peak / floor).powf(t / self.attack_secs)
        } else {
            let progress = (t - self.attack_secs) / (self.decay_secs - self.attack_secs);
            peak * (floor / peak).powf(progress)
        };
        gain as f32
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.attack_secs > 0.0) || !(self.decay_secs > self.attack_secs) {
            return Err("envelope needs 0 < attack_secs < decay_secs");
        }
        if !(self.floor_gain > 0.0) || !(self.peak_gain > self.floor_gain) {
            return Err("envelope needs 0 < floor_gain < peak_gain");
        }
        Ok(())
    }
}

/// A tone committed to the output at an exact audio-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    /// Onset on the output clock, in seconds
    pub start_time: f64,
    pub envelope: ToneEnvelope,
}

impl Tone {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.envelope.duration()
    }

    /// Whether the tone produces any sound inside `[from, to)`.
    pub fn overlaps(&self, from: f64, to: f64) -> bool {
        self.start_time < to && self.end_time() > from
    }

    /// Instantaneous sample value at output-clock time `t`.
    pub fn sample_at(&self, t: f64) -> f32 {
        let elapsed = t - self.start_time;
        let gain = self.envelope.gain_at(elapsed);
        if gain == 0.0 {
            return 0.0;
        }
        gain * (TAU * self.frequency_hz as f64 * elapsed).sin() as f32
    }
}

/// Mixes every tone that sounds inside the block into `out`.
///
/// `out` is mono and starts at clock time `block_start`; samples are added,
/// not overwritten, so callers clear the block first.
pub fn render_tones(tones: &[Tone], out: &mut [f32], block_start: f64, sample_rate: u32) {
    let dt = 1.0 / sample_rate as f64;
    let block_end = block_start + out.len() as f64 * dt;
    for tone in tones.iter().filter(|t| t.overlaps(block_start, block_end)) {
        for (i, sample) in out.iter_mut().enumerate() {
            *sample += tone.sample_at(block_start + i as f64 * dt);
        }
    }
}
