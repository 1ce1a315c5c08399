//! The audio session: the single owner of the sound card.
//!
//! The tuner needs the microphone and the metronome needs the speaker, and
//! only one of them may hold the device at a time. Every mode switch goes
//! through [`Session`], which fully stops the active engine before starting
//! the next one.

use std::sync::Arc;
use std::time::Duration;
use tuner_core::{Config, EngineError, Metronome, Notifier, Tempo, ToneOutput, Tuner};
use tracing::{debug, info};

/// Upper bound on how long releasing the speaker waits for clicks that are
/// already scheduled (lookahead plus one click).
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);

enum Active {
    Idle,
    Tuner(Tuner),
    Metronome {
        metronome: Metronome,
        output: Arc<ToneOutput>,
    },
}

pub struct Session {
    config: Config,
    notifier: Arc<dyn Notifier>,
    tempo: Tempo,
    active: Active,
}

impl Session {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let tempo = Tempo::new(config.metronome.default_bpm).unwrap_or_default();
        Self { config, notifier, tempo, active: Active::Idle }
    }

    pub fn mode(&self) -> &'static str {
        match self.active {
            Active::Idle => "idle",
            Active::Tuner(_) => "tuner",
            Active::Metronome { .. } => "metronome",
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Switches to the tuner. No-op if it is already listening.
    pub fn start_tuner(&mut self) -> Result<(), EngineError> {
        if matches!(self.active, Active::Tuner(_)) {
            return Ok(());
        }
        self.release();

        let mut tuner = Tuner::new(self.config.tuner.clone());
        tuner.start(Arc::clone(&self.notifier))?;
        self.active = Active::Tuner(tuner);
        info!("session: tuner active");
        Ok(())
    }

    /// Switches to the metronome, or retunes it if it is already ticking.
    pub fn start_metronome(&mut self, tempo: Option<Tempo>) -> Result<(), EngineError> {
        if let Some(tempo) = tempo {
            self.tempo = tempo;
        }
        if let Active::Metronome { metronome, .. } = &mut self.active {
            metronome.set_tempo(self.tempo);
            return Ok(());
        }
        self.release();

        let output = Arc::new(ToneOutput::open(self.config.tuner.sample_rate)?);
        let mut metronome = Metronome::new(self.config.metronome.clone());
        metronome.set_tempo(self.tempo);
        metronome.start(output.clone(), Arc::clone(&self.notifier))?;
        info!(
            bpm = self.tempo.bpm(),
            sample_rate = output.sample_rate(),
            "session: metronome active"
        );
        self.active = Active::Metronome { metronome, output };
        Ok(())
    }

    /// Remembers `tempo` and applies it to a running metronome.
    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
        if let Active::Metronome { metronome, .. } = &mut self.active {
            metronome.set_tempo(tempo);
        }
    }

    /// Stops whatever is running. No-op when idle.
    pub fn stop(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        match std::mem::replace(&mut self.active, Active::Idle) {
            Active::Idle => {}
            Active::Tuner(mut tuner) => tuner.stop(),
            Active::Metronome { mut metronome, output } => {
                metronome.stop();
                // The scheduler thread held the other reference and has been
                // joined, so this is normally the last one.
                match Arc::try_unwrap(output) {
                    Ok(output) => output.close(OUTPUT_DRAIN),
                    Err(_) => debug!("output still shared, dropping without drain"),
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
