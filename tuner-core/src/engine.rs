//! # Engines
//!
//! Threaded sessions around the pure detector and scheduler.
//!
//! - [`Tuner`] owns the microphone while running: a worker thread opens the
//!   capture stream, analyses each frame and reports pitches.
//! - [`Metronome`] drives a [`BeatScheduler`] from a 25 ms maintenance tick
//!   against an [`AudioOutput`], and delivers beat notifications from a
//!   separate thread so a slow listener never delays scheduling.
//!
//! Neither engine knows about the other. Whoever owns them must stop one
//! before starting the other so they never contend for the audio device.

use crate::config::{MetronomeConfig, TunerConfig};
use crate::error::{EngineError, EngineResult};
use crate::metronome::{BeatScheduler, Tempo, notification_delay};
use crate::notify::Notifier;
use crate::output::AudioOutput;
use crate::pitch::PitchDetector;
use crate::{AudioFrame, audio};
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Handle to a running worker thread.
#[derive(Debug)]
struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn stop(self, name: &str) {
        let _ = self.shutdown.send(());
        if self.handle.join().is_err() {
            error!("{} thread panicked", name);
        }
    }
}

/// Live pitch detection session.
#[derive(Debug)]
pub struct Tuner {
    config: TunerConfig,
    worker: Option<Worker>,
}

impl Tuner {
    pub fn new(config: TunerConfig) -> Self {
        Self { config, worker: None }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts listening on the default input device.
    pub fn start(&mut self, notifier: Arc<dyn Notifier>) -> EngineResult<()> {
        let frame_size = self.config.frame_size;
        let rate = self.config.sample_rate;
        self.start_with(notifier, move |frames| {
            audio::start_audio_capture(frames, frame_size, rate).map(|(stream, _)| stream)
        })
    }

    /// Starts with a custom frame source.
    ///
    /// `open_input` runs on the worker thread and receives the frame sender;
    /// whatever it returns is kept alive until the session stops, which is
    /// how a capture stream stays open. If it fails the session never
    /// starts and the error is returned as
    /// [`EngineError::ResourceUnavailable`].
    ///
    /// Starting an already running tuner is a no-op.
    pub fn start_with<F, G>(
        &mut self,
        notifier: Arc<dyn Notifier>,
        open_input: F,
    ) -> EngineResult<()>
    where
        F: FnOnce(Sender<AudioFrame>) -> anyhow::Result<G> + Send + 'static,
        G: 'static,
    {
        if self.is_running() {
            debug!("tuner already running");
            return Ok(());
        }

        let detector = PitchDetector::new(&self.config);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<anyhow::Result<()>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("tuner".into())
            .spawn(move || {
                let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<AudioFrame>();
                let input = match open_input(frame_tx) {
                    Ok(input) => input,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                info!("tuner listening");
                run_detection(detector, &frame_rx, &shutdown_rx, notifier.as_ref());
                drop(input);
                info!("tuner stopped");
            })
            .map_err(|e| EngineError::input_unavailable(e.into()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker { shutdown: shutdown_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                error!("could not open audio input: {:#}", e);
                Err(EngineError::input_unavailable(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::WorkerLost("tuner"))
            }
        }
    }

    /// Stops listening and releases the input. No-op when idle.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop("tuner");
        }
    }
}

impl Drop for Tuner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Analyses frames until shutdown or until the input goes away.
fn run_detection(
    mut detector: PitchDetector,
    frames: &Receiver<AudioFrame>,
    shutdown: &Receiver<()>,
    notifier: &dyn Notifier,
) {
    loop {
        select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => {
                    // If analysis fell behind, only the newest frame matters.
                    let frame = frames.try_iter().last().unwrap_or(frame);
                    let estimate = detector.detect(&frame);
                    if let Some(note) = estimate.note() {
                        notifier.on_pitch(estimate.frequency_hz, &note);
                    }
                }
                Err(_) => {
                    warn!("input closed");
                    break;
                }
            },
            recv(shutdown) -> _ => break,
        }
    }
}

enum Command {
    SetTempo(f64),
    Stop,
}

#[derive(Debug)]
struct MetronomeWorker {
    commands: Sender<Command>,
    scheduler: JoinHandle<()>,
    /// Dropping this cancels beat notifications that are still pending.
    cancel_notices: Sender<()>,
    notices: JoinHandle<()>,
}

/// Metronome session.
#[derive(Debug)]
pub struct Metronome {
    config: MetronomeConfig,
    tempo: Tempo,
    worker: Option<MetronomeWorker>,
}

impl Metronome {
    /// Creates an idle metronome at the configured default tempo (120 bpm if
    /// the configured one is out of range).
    pub fn new(config: MetronomeConfig) -> Self {
        let tempo = Tempo::new(config.default_bpm).unwrap_or_default();
        Self { config, tempo, worker: None }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts ticking on `output`. The first beat is a downbeat at the
    /// output's current time. Starting while running is a no-op.
    pub fn start(
        &mut self,
        output: Arc<dyn AudioOutput>,
        notifier: Arc<dyn Notifier>,
    ) -> EngineResult<()> {
        if self.is_running() {
            debug!("metronome already running");
            return Ok(());
        }

        let mut scheduler = BeatScheduler::new(&self.config);
        scheduler.start(self.tempo.bpm() as f64, output.as_ref());

        let (command_tx, command_rx) = crossbeam_channel::unbounded::<Command>();
        let (notice_tx, notice_rx) = crossbeam_channel::unbounded::<(u8, Instant)>();
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let interval = self.config.tick_interval();

        let notices = thread::Builder::new()
            .name("beat-notify".into())
            .spawn(move || deliver_notices(&notice_rx, &cancel_rx, notifier.as_ref()))
            .map_err(|e| EngineError::output_unavailable(e.into()))?;

        let scheduler = match thread::Builder::new()
            .name("metronome".into())
            .spawn(move || {
                run_scheduler(scheduler, output.as_ref(), &command_rx, &notice_tx, interval)
            })
        {
            Ok(handle) => handle,
            Err(e) => {
                drop(cancel_tx);
                let _ = notices.join();
                return Err(EngineError::output_unavailable(e.into()));
            }
        };

        info!(bpm = self.tempo.bpm(), "metronome started");
        self.worker = Some(MetronomeWorker {
            commands: command_tx,
            scheduler,
            cancel_notices: cancel_tx,
            notices,
        });
        Ok(())
    }

    /// Changes the tempo. While running it takes effect from the next beat
    /// the scheduler computes; beats already committed keep their times.
    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
        if let Some(worker) = &self.worker {
            let _ = worker.commands.send(Command::SetTempo(tempo.bpm() as f64));
        }
    }

    /// Stops scheduling new beats and cancels pending notifications.
    /// Clicks already handed to the output still play. No-op when idle.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.commands.send(Command::Stop);
        if worker.scheduler.join().is_err() {
            error!("metronome thread panicked");
        }
        drop(worker.cancel_notices);
        if worker.notices.join().is_err() {
            error!("beat notification thread panicked");
        }
        info!("metronome stopped");
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The maintenance loop: one scheduling pass per tick until stopped.
fn run_scheduler(
    mut scheduler: BeatScheduler,
    output: &dyn AudioOutput,
    commands: &Receiver<Command>,
    notices: &Sender<(u8, Instant)>,
    interval: Duration,
) {
    let ticker = crossbeam_channel::tick(interval);
    commit_beats(&mut scheduler, output, notices);

    loop {
        select! {
            recv(commands) -> cmd => match cmd {
                Ok(Command::SetTempo(bpm)) => {
                    debug!(bpm, "tempo change");
                    scheduler.set_bpm(bpm);
                }
                Ok(Command::Stop) | Err(_) => break,
            },
            recv(ticker) -> _ => commit_beats(&mut scheduler, output, notices),
        }
    }
    scheduler.stop();
}

fn commit_beats(
    scheduler: &mut BeatScheduler,
    output: &dyn AudioOutput,
    notices: &Sender<(u8, Instant)>,
) {
    let events = scheduler.step(output);
    if events.is_empty() {
        return;
    }
    let now = output.current_time();
    let wall_now = Instant::now();
    for event in events {
        let due = wall_now + notification_delay(&event, now);
        let _ = notices.send((event.beat_index, due));
    }
}

/// Delivers each beat notification at its due time until cancelled.
fn deliver_notices(
    notices: &Receiver<(u8, Instant)>,
    cancel: &Receiver<()>,
    notifier: &dyn Notifier,
) {
    for (beat_index, due) in notices.iter() {
        let wait = due.saturating_duration_since(Instant::now());
        select! {
            recv(cancel) -> _ => return,
            recv(crossbeam_channel::after(wait)) -> _ => notifier.on_beat(beat_index),
        }
    }
}
