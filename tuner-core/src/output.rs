//! # Audio Output Module
//!
//! The output side of the audio session: a monotonic audio clock plus
//! fire-and-forget tone scheduling at exact clock times.
//!
//! [`ToneOutput`] drives the default CPAL output device. The stream lives on
//! its own thread (CPAL streams are not `Send` on every platform); the clock
//! is the number of frames the device has pulled, so it advances exactly with
//! the audio that was rendered.

use crate::envelope::{Tone, render_tones};
use crate::error::{EngineError, EngineResult};
use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Output collaborator used by the metronome.
pub trait AudioOutput: Send + Sync {
    /// Current time on the audio clock in seconds. Monotonic, arbitrary epoch.
    fn current_time(&self) -> f64;

    /// Plays `tone` starting exactly at `tone.start_time`.
    fn schedule_tone(&self, tone: Tone);
}

/// An output with a manually driven clock that records scheduled tones.
///
/// Useful for headless runs and for exercising the scheduler without a
/// sound card.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    clock: Mutex<f64>,
    tones: Mutex<Vec<Tone>>,
}

impl RecordingOutput {
    pub fn starting_at(time: f64) -> Self {
        Self { clock: Mutex::new(time), tones: Mutex::new(Vec::new()) }
    }

    pub fn set_time(&self, time: f64) {
        *lock(&self.clock) = time;
    }

    pub fn advance(&self, secs: f64) {
        *lock(&self.clock) += secs;
    }

    /// Every tone scheduled so far, in scheduling order.
    pub fn scheduled(&self) -> Vec<Tone> {
        lock(&self.tones).clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn current_time(&self) -> f64 {
        *lock(&self.clock)
    }

    fn schedule_tone(&self, tone: Tone) {
        lock(&self.tones).push(tone);
    }
}

// A poisoned lock only means another test thread panicked mid-update; the
// plain data inside is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frames rendered so far, shared between the device callback and readers.
#[derive(Debug)]
struct OutputClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl OutputClock {
    fn seconds(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }
}

/// The default output device, synthesising scheduled clicks.
#[derive(Debug)]
pub struct ToneOutput {
    clock: Arc<OutputClock>,
    tones: Sender<Tone>,
    /// End time of the latest scheduled tone, as `f64` bits. Non-negative
    /// `f64`s order the same as their bit patterns, so `fetch_max` works.
    last_end_bits: AtomicU64,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ToneOutput {
    /// Opens the default output device, preferring `preferred_rate`.
    ///
    /// # Arguments
    /// * `preferred_rate` - Sample rate to ask for, clamped to what the
    ///   device supports
    ///
    /// # Returns
    /// * `Ok(output)` - A running stream whose clock starts at 0
    /// * `Err(EngineError::ResourceUnavailable)` - No usable device; nothing
    ///   is left running in that case
    pub fn open(preferred_rate: u32) -> EngineResult<Self> {
        let (tone_tx, tone_rx) = crossbeam_channel::unbounded::<Tone>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<Arc<OutputClock>>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let worker = thread::Builder::new()
            .name("tone-output".into())
            .spawn(move || {
                let (stream, clock) = match build_output_stream(tone_rx, preferred_rate) {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(clock));

                // Park until the owner shuts us down (or goes away).
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!("error pausing output stream: {}", e);
                }
                drop(stream);
                debug!("output stream closed");
            })
            .map_err(|e| EngineError::output_unavailable(e.into()))?;

        match ready_rx.recv() {
            Ok(Ok(clock)) => Ok(Self {
                clock,
                tones: tone_tx,
                last_end_bits: AtomicU64::new(0f64.to_bits()),
                shutdown: Some(shutdown_tx),
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                error!("could not open audio output: {:#}", e);
                Err(EngineError::output_unavailable(e))
            }
            Err(_) => {
                let _ = worker.join();
                Err(EngineError::WorkerLost("output"))
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate
    }

    /// Releases the device once every scheduled tone has finished playing,
    /// waiting at most `max_wait`.
    pub fn close(mut self, max_wait: Duration) {
        let last_end = f64::from_bits(self.last_end_bits.load(Ordering::Acquire));
        let deadline = Instant::now() + max_wait;
        while self.current_time() < last_end && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("output thread panicked");
            }
        }
    }
}

impl AudioOutput for ToneOutput {
    fn current_time(&self) -> f64 {
        self.clock.seconds()
    }

    fn schedule_tone(&self, tone: Tone) {
        let end = tone.end_time().max(0.0);
        self.last_end_bits.fetch_max(end.to_bits(), Ordering::AcqRel);
        if self.tones.send(tone).is_err() {
            warn!("output stream gone, dropping tone at {:.3}s", tone.start_time);
        }
    }
}

impl Drop for ToneOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds and starts the output stream. Runs on the output thread.
fn build_output_stream(
    tones: Receiver<Tone>,
    preferred_rate: u32,
) -> Result<(cpal::Stream, Arc<OutputClock>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;

    info!("Using audio output device: {}", device.name()?);

    let configs = device.supported_output_configs()?.collect::<Vec<_>>();
    let supported_config = find_f32_config(configs, preferred_rate)
        .ok_or_else(|| anyhow!("No suitable f32 output format found"))?;

    let rate = preferred_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(rate))
        .into();
    let channels = config.channels.max(1) as usize;

    info!("Output stream: {} Hz, {} channel(s)", rate, channels);

    let clock = Arc::new(OutputClock { frames: AtomicU64::new(0), sample_rate: rate });
    let callback_clock = Arc::clone(&clock);

    // Tones currently sounding or still in the future.
    let mut voices: Vec<Tone> = Vec::with_capacity(16);
    let mut mono: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            voices.extend(tones.try_iter());

            let frames = data.len() / channels;
            let start_frame = callback_clock.frames.load(Ordering::Acquire);
            let block_start = start_frame as f64 / rate as f64;

            mono.clear();
            mono.resize(frames, 0.0);
            render_tones(&voices, &mut mono, block_start, rate);

            for (frame, &sample) in data.chunks_mut(channels).zip(&mono) {
                frame.fill(sample.clamp(-1.0, 1.0));
            }

            let end_frame = start_frame + frames as u64;
            callback_clock.frames.store(end_frame, Ordering::Release);

            let block_end = end_frame as f64 / rate as f64;
            voices.retain(|t| t.end_time() > block_end);
        },
        |err| error!("An error occurred on the output stream: {}", err),
        None,
    )?;

    stream.play()?;
    Ok((stream, clock))
}

/// Picks the f32 configuration whose rate range is closest to `target_rate`,
/// preferring fewer channels.
pub(crate) fn find_f32_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let rate_miss = if (min..=max).contains(&target_rate) {
                0
            } else {
                (min as i64 - target_rate as i64).abs().min((max as i64 - target_rate as i64).abs())
            };
            (rate_miss, c.channels())
        })
}
