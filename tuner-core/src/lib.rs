// tuner-core/src/lib.rs

//! The core logic for the instrument tuner and metronome.
//! This crate is responsible for audio capture and playback, pitch
//! detection, note classification and lookahead beat scheduling. It is
//! completely headless and contains no UI code.

pub mod audio;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod metronome;
pub mod notify;
pub mod output;
pub mod pitch;
pub mod tuning;

pub use config::{Config, MetronomeConfig, TunerConfig};
pub use engine::{Metronome, Tuner};
pub use error::{ConfigError, EngineError, TempoError};
pub use metronome::{BeatEvent, BeatScheduler, SchedulerState, Tempo};
pub use notify::{ChannelNotifier, Notification, Notifier};
pub use output::{AudioOutput, RecordingOutput, ToneOutput};
pub use pitch::{PitchDetector, PitchEstimate};
pub use tuning::NoteMatch;

/// One block of mono audio as delivered by the input.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Wraps `samples` (expected in `[-1, 1]`) captured at `sample_rate` Hz.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
