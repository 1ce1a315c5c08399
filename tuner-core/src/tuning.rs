//! # Tuning Reference Module
//!
//! Equal temperament note math anchored at A4 = 440 Hz, the chromatic name
//! table used to label detected pitches, and the standard six-string guitar
//! tuning.
//!
//! ## Features
//! - Frequency to nearest MIDI note resolution
//! - Cent deviation measurements
//! - Standard tuning (E2 A2 D3 G3 B3 E4) with nearest-string lookup

use once_cell::sync::Lazy;

/// Concert pitch reference in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

/// Default tolerance, in cents, inside which a note counts as in tune.
pub const IN_TUNE_CENTS: f32 = 5.0;

/// Chromatic pitch class names, indexed by `midi mod 12`.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// The result of classifying a frequency against equal temperament.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteMatch {
    /// Pitch class name (e.g. "A", "C#")
    pub name: &'static str,
    /// Frequency of the nearest equal-tempered note in Hz
    pub reference_frequency_hz: f32,
    /// MIDI number of the nearest note
    pub midi_number: i32,
    /// Signed deviation from the reference (positive = sharp)
    pub cents_deviation: f32,
}

impl NoteMatch {
    /// Scientific pitch octave of the matched note (MIDI 60 is C4).
    pub fn octave(&self) -> i32 {
        self.midi_number.div_euclid(12) - 1
    }

    /// Name with octave, e.g. "A4".
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.octave())
    }

    /// Whether the deviation is inside the default tolerance.
    pub fn is_in_tune(&self) -> bool {
        self.is_within(IN_TUNE_CENTS)
    }

    /// Whether the deviation is strictly inside `tolerance_cents`.
    pub fn is_within(&self, tolerance_cents: f32) -> bool {
        self.cents_deviation.abs() < tolerance_cents
    }
}

/// One open string of a fretted instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenString {
    /// Conventional string number, 6 is the lowest string.
    pub number: u8,
    /// Note label, e.g. "E2"
    pub label: String,
    pub midi_number: i32,
    /// Target frequency in Hz
    pub frequency: f32,
}

/// Standard guitar tuning, ordered low to high.
///
/// Frequencies are derived from the MIDI numbers so the table can never
/// disagree with [`midi_to_frequency`].
static STANDARD_TUNING: Lazy<Vec<OpenString>> = Lazy::new(|| {
    const OPEN_MIDI: [i32; 6] = [40, 45, 50, 55, 59, 64];
    OPEN_MIDI
        .iter()
        .enumerate()
        .map(|(i, &midi)| OpenString {
            number: (6 - i) as u8,
            label: format!("{}{}", note_name(midi), midi.div_euclid(12) - 1),
            midi_number: midi,
            frequency: midi_to_frequency(midi),
        })
        .collect()
});

/// Returns the six open strings of standard tuning, lowest first.
pub fn standard_tuning() -> &'static [OpenString] {
    &STANDARD_TUNING
}

/// Pitch class name of a MIDI note number.
pub fn note_name(midi: i32) -> &'static str {
    NOTE_NAMES[midi.rem_euclid(12) as usize]
}

/// Equal temperament frequency of a MIDI note.
pub fn midi_to_frequency(midi: i32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0)
}

/// Fractional number of semitones between `freq` and A4.
pub fn semitones_from_a4(freq: f32) -> f32 {
    12.0 * (freq / A4_FREQUENCY).log2()
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents = 1 semitone, 1200 cents = 1 octave. Positive values are sharp.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Resolves a frequency to the nearest equal-tempered note.
///
/// Returns `None` for non-positive or non-finite input, since there is no
/// note to name.
pub fn find_nearest_note(freq: f32) -> Option<NoteMatch> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let midi = semitones_from_a4(freq).round() as i32 + A4_MIDI;
    let reference = midi_to_frequency(midi);

    Some(NoteMatch {
        name: note_name(midi),
        reference_frequency_hz: reference,
        midi_number: midi,
        cents_deviation: calculate_cents_deviation(freq, reference),
    })
}

/// Finds the open string closest to `freq` on a logarithmic scale.
///
/// Returns the string and the deviation from it in cents.
pub fn nearest_string(freq: f32) -> Option<(&'static OpenString, f32)> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    standard_tuning()
        .iter()
        .map(|s| (s, calculate_cents_deviation(freq, s.frequency)))
        .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
}
