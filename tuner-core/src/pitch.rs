//! # Pitch Detection Module
//!
//! Monophonic pitch detection by time-domain autocorrelation.
//!
//! ## Features
//! - RMS noise gate to reject silence and handling noise
//! - Edge trimming of low-energy lead-in and tail
//! - First-peak-after-descent period search (skips the lag 0 peak)
//! - Parabolic interpolation for sub-sample accuracy

use crate::AudioFrame;
use crate::config::TunerConfig;
use crate::tuning::{self, NoteMatch};
use tracing::trace;

/// Why a frame did not produce a pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPitch {
    /// Frame energy is below the noise gate.
    NoSignal,
    /// Trimmed frame too short, silent, or without a periodic structure.
    DegenerateFrame,
}

/// Outcome of one detection call.
///
/// `valid == false` is the "no frequency" sentinel; `frequency_hz` is 0 then.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    pub valid: bool,
}

impl PitchEstimate {
    pub fn found(frequency_hz: f32) -> Self {
        Self { frequency_hz, valid: true }
    }

    pub fn none() -> Self {
        Self { frequency_hz: 0.0, valid: false }
    }

    /// The detected frequency, if any.
    pub fn frequency(&self) -> Option<f32> {
        self.valid.then_some(self.frequency_hz)
    }

    /// Classifies the estimate against equal temperament.
    pub fn note(&self) -> Option<NoteMatch> {
        self.frequency().and_then(tuning::find_nearest_note)
    }
}

/// Autocorrelation pitch detector.
///
/// Holds a scratch buffer for the correlation so repeated calls on
/// same-sized frames do not allocate.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    noise_gate_rms: f32,
    trim_threshold: f32,
    correlation: Vec<f32>,
}

impl Default for PitchDetector {
    fn default() -> Self {
        Self::new(&TunerConfig::default())
    }
}

impl PitchDetector {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            noise_gate_rms: config.noise_gate_rms,
            trim_threshold: config.trim_threshold,
            correlation: Vec::with_capacity(config.frame_size),
        }
    }

    /// Estimates the fundamental frequency of `frame`.
    ///
    /// Never fails: silent or unusable frames yield [`PitchEstimate::none`].
    pub fn detect(&mut self, frame: &AudioFrame) -> PitchEstimate {
        match self.analyze(frame) {
            Ok(freq) => PitchEstimate::found(freq),
            Err(reason) => {
                trace!(?reason, len = frame.len(), "frame rejected");
                PitchEstimate::none()
            }
        }
    }

    /// Like [`detect`](Self::detect) but reports why a frame was rejected.
    ///
    /// # Arguments
    /// * `frame` - Mono samples and the rate they were captured at
    ///
    /// # Returns
    /// * `Ok(frequency)` - Fundamental frequency in Hz
    /// * `Err(NoPitch::NoSignal)` - Empty frame or RMS below the noise gate
    /// * `Err(NoPitch::DegenerateFrame)` - No usable period after trimming
    pub fn analyze(&mut self, frame: &AudioFrame) -> Result<f32, NoPitch> {
        if frame.is_empty() {
            return Err(NoPitch::NoSignal);
        }
        let signal = frame.samples();

        // --- Noise Gate ---
        let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt();
        // Written as a negated comparison so a NaN RMS is gated too.
        if !(rms >= self.noise_gate_rms) {
            return Err(NoPitch::NoSignal);
        }

        let trimmed = trim_edges(signal, self.trim_threshold);
        if trimmed.len() < 3 {
            return Err(NoPitch::DegenerateFrame);
        }

        autocorrelate(trimmed, &mut self.correlation);
        let c = &self.correlation;
        let n = c.len();
        if c[0] <= 0.0 {
            return Err(NoPitch::DegenerateFrame);
        }

        // --- Skip the lag 0 peak and its downward slope ---
        let mut d = 0;
        while d + 1 < n && c[d] > c[d + 1] {
            d += 1;
        }
        if d + 1 >= n {
            return Err(NoPitch::DegenerateFrame);
        }

        // --- Coarse period: highest correlation after the first dip ---
        let mut peak = d;
        for i in (d + 1)..n {
            if c[i] > c[peak] {
                peak = i;
            }
        }

        // --- Parabolic refinement, only with two interior neighbours ---
        let mut period = peak as f32;
        if peak > 0 && peak + 1 < n {
            let (x1, x2, x3) = (c[peak - 1], c[peak], c[peak + 1]);
            let a = (x1 + x3 - 2.0 * x2) / 2.0;
            let b = (x3 - x1) / 2.0;
            if a != 0.0 {
                period -= b / (2.0 * a);
            }
        }

        let frequency = frame.sample_rate() as f32 / period;
        if period > 0.0 && frequency.is_finite() && frequency > 0.0 {
            Ok(frequency)
        } else {
            Err(NoPitch::DegenerateFrame)
        }
    }
}

/// Drops the leading and trailing regions before the signal first dips
/// below `threshold`, searching at most half the frame from each end.
fn trim_edges(signal: &[f32], threshold: f32) -> &[f32] {
    let len = signal.len();
    let half = len / 2;

    let start = (0..half)
        .find(|&i| signal[i].abs() < threshold)
        .unwrap_or(0);
    let end = (1..half)
        .map(|i| len - i)
        .find(|&i| signal[i].abs() < threshold)
        .unwrap_or(len - 1);

    if start >= end { &[] } else { &signal[start..end] }
}

/// Unnormalized autocorrelation for every lag in `0..buffer.len()`.
///
/// O(n²); at 2048 samples this stays well inside one frame period.
fn autocorrelate(buffer: &[f32], out: &mut Vec<f32>) {
    let n = buffer.len();
    out.clear();
    out.extend((0..n).map(|lag| {
        buffer[..n - lag]
            .iter()
            .zip(&buffer[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_frame(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> AudioFrame {
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioFrame::new(samples, sample_rate)
    }

    fn assert_within_one_percent(detected: f32, expected: f32) {
        let error = (detected - expected).abs() / expected;
        assert!(
            error < 0.01,
            "detected {detected:.2} Hz, expected {expected:.2} Hz ({:.3}% off)",
            error * 100.0
        );
    }

    #[test]
    fn detects_a440() {
        let mut detector = PitchDetector::default();
        let estimate = detector.detect(&sine_frame(440.0, 44100, 2048, 0.8));
        assert!(estimate.valid);
        assert_within_one_percent(estimate.frequency_hz, 440.0);
        assert_eq!(estimate.note().unwrap().name, "A");
    }

    #[test]
    fn detects_several_frequencies_and_rates() {
        let mut detector = PitchDetector::default();
        for &(freq, rate) in &[(220.0, 44100), (196.0, 48000), (329.63, 44100), (659.25, 48000)] {
            let estimate = detector.detect(&sine_frame(freq, rate, 2048, 0.6));
            let detected = estimate.frequency().expect("sine should be detected");
            assert_within_one_percent(detected, freq);
        }
    }

    #[test]
    fn detects_low_e_at_default_frame_size() {
        let config = TunerConfig::default();
        let mut detector = PitchDetector::new(&config);
        let frame = sine_frame(82.41, config.sample_rate, config.frame_size, 0.7);
        assert_within_one_percent(detector.detect(&frame).frequency().unwrap(), 82.41);
    }

    #[test]
    fn silence_is_invalid() {
        let mut detector = PitchDetector::default();
        let frame = AudioFrame::new(vec![0.0; 2048], 44100);
        assert_eq!(detector.detect(&frame), PitchEstimate::none());
        assert_eq!(detector.analyze(&frame), Err(NoPitch::NoSignal));
    }

    #[test]
    fn quiet_signal_is_gated() {
        let mut detector = PitchDetector::default();
        // amplitude 0.01 sine has an RMS of about 0.007
        let frame = sine_frame(440.0, 44100, 2048, 0.01);
        assert_eq!(detector.analyze(&frame), Err(NoPitch::NoSignal));
    }

    #[test]
    fn empty_and_tiny_frames_do_not_panic() {
        let mut detector = PitchDetector::default();
        assert_eq!(detector.analyze(&AudioFrame::new(vec![], 44100)), Err(NoPitch::NoSignal));
        assert_eq!(
            detector.analyze(&AudioFrame::new(vec![0.9, -0.9], 44100)),
            Err(NoPitch::DegenerateFrame)
        );
        assert!(!detector.detect(&AudioFrame::new(vec![0.5], 44100)).valid);
    }

    #[test]
    fn constant_offset_has_no_period() {
        // No sample dips below the trim threshold and the correlation only
        // ever decreases, so there is no second peak to find.
        let mut detector = PitchDetector::default();
        let frame = AudioFrame::new(vec![0.5; 1024], 44100);
        assert_eq!(detector.analyze(&frame), Err(NoPitch::DegenerateFrame));
    }

    #[test]
    fn peak_on_last_lag_skips_refinement() {
        // Trims to [0.15, -0.15, -0.15, 0.15]; the correlation bottoms out at
        // lag 2 and peaks on lag 3, which has no right neighbour.
        let mut detector = PitchDetector::default();
        let frame = AudioFrame::new(vec![0.15, -0.15, -0.15, 0.15, 0.5], 44100);
        assert_eq!(detector.analyze(&frame), Ok(14700.0));
        assert_eq!(detector.correlation.len(), 4);
    }

    #[test]
    fn flat_correlation_at_lag_zero_is_degenerate() {
        // The loud sample sits past the trimmed range, so every lag of the
        // kept all-zero slice correlates to 0 and c[0] == c[1].
        let mut detector = PitchDetector::default();
        let frame = AudioFrame::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.9], 44100);
        assert_eq!(detector.analyze(&frame), Err(NoPitch::DegenerateFrame));
        assert_eq!(detector.correlation[0], detector.correlation[1]);
        assert!(!detector.detect(&frame).valid);
    }

    #[test]
    fn zero_sample_rate_is_invalid() {
        let mut detector = PitchDetector::default();
        let samples = sine_frame(440.0, 44100, 2048, 0.8).samples().to_vec();
        let frame = AudioFrame::new(samples, 0);
        assert_eq!(detector.analyze(&frame), Err(NoPitch::DegenerateFrame));
    }

    #[test]
    fn trim_keeps_signal_between_quiet_points() {
        let signal = [0.9, 0.8, 0.1, 0.5, -0.5, 0.05, 0.7, 0.9];
        assert_eq!(trim_edges(&signal, 0.2), &[0.1, 0.5, -0.5]);
    }

    #[test]
    fn trim_defaults_when_nothing_is_quiet() {
        let signal = [0.9; 6];
        assert_eq!(trim_edges(&signal, 0.2).len(), 5);
    }

    #[test]
    fn autocorrelation_matches_direct_sum() {
        let mut out = Vec::new();
        autocorrelate(&[1.0, 2.0, 3.0], &mut out);
        assert_eq!(out, vec![14.0, 8.0, 3.0]);
    }
}
