//! Error types for the tuner and metronome engines

use thiserror::Error;

/// A tempo request outside the supported range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tempo {bpm} bpm is outside the supported range {min}-{max} bpm")]
pub struct TempoError {
    pub bpm: u32,
    pub min: u32,
    pub max: u32,
}

/// Engine session errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Microphone or speaker could not be acquired
    #[error("audio {direction} unavailable: {source}")]
    ResourceUnavailable {
        direction: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The engine's worker thread went away unexpectedly
    #[error("{0} worker stopped unexpectedly")]
    WorkerLost(&'static str),
}

impl EngineError {
    pub fn input_unavailable(source: anyhow::Error) -> Self {
        Self::ResourceUnavailable { direction: "input", source: source.into() }
    }

    pub fn output_unavailable(source: anyhow::Error) -> Self {
        Self::ResourceUnavailable { direction: "output", source: source.into() }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Tempo(#[from] TempoError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
