//! # Metronome Scheduling
//!
//! Lookahead beat scheduling against the output device's audio clock.
//!
//! The maintenance tick that drives [`BeatScheduler::step`] is coarse and may
//! run late; it only decides *which* beats to commit. *When* a beat sounds is
//! always computed on the audio clock and handed to the device ahead of time,
//! so tick jitter never reaches the audible timing as long as the lookahead
//! window is longer than the worst tick delay.

use crate::config::MetronomeConfig;
use crate::envelope::{Tone, ToneEnvelope};
use crate::error::TempoError;
use crate::output::AudioOutput;
use std::time::Duration;
use tracing::{debug, warn};

/// Slowest tempo accepted at the configuration boundary.
pub const MIN_BPM: u32 = 40;
/// Fastest tempo accepted at the configuration boundary.
pub const MAX_BPM: u32 = 218;
pub const BEATS_PER_BAR: u8 = 4;

/// A validated tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tempo(u32);

impl Tempo {
    pub fn new(bpm: u32) -> Result<Self, TempoError> {
        if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(TempoError { bpm, min: MIN_BPM, max: MAX_BPM })
        }
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    pub fn seconds_per_beat(self) -> f64 {
        60.0 / self.0 as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120)
    }
}

impl TryFrom<u32> for Tempo {
    type Error = TempoError;

    fn try_from(bpm: u32) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

/// One committed beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Position in the bar, `0..BEATS_PER_BAR`
    pub beat_index: u8,
    /// Onset on the output clock, in seconds
    pub scheduled_time: f64,
    pub is_downbeat: bool,
}

/// Scheduler bookkeeping. Reset on every start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SchedulerState {
    pub running: bool,
    /// Output-clock time of the next beat to commit
    pub next_event_time: f64,
    pub current_beat_index: u8,
}

/// Converts a tempo into a stream of beats committed ahead of time.
#[derive(Debug, Clone)]
pub struct BeatScheduler {
    state: SchedulerState,
    bpm: f64,
    lookahead: f64,
    downbeat_hz: f32,
    beat_hz: f32,
    envelope: ToneEnvelope,
}

impl BeatScheduler {
    pub fn new(config: &MetronomeConfig) -> Self {
        Self {
            state: SchedulerState::default(),
            bpm: config.default_bpm as f64,
            lookahead: config.lookahead_secs(),
            downbeat_hz: config.downbeat_hz,
            beat_hz: config.beat_hz,
            envelope: config.envelope,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Starts counting from a downbeat at the output's current time.
    ///
    /// Returns `false` and changes nothing if already running.
    pub fn start<O: AudioOutput + ?Sized>(&mut self, bpm: f64, output: &O) -> bool {
        if self.state.running {
            return false;
        }
        self.set_bpm(bpm);
        self.state = SchedulerState {
            running: true,
            next_event_time: output.current_time(),
            current_beat_index: 0,
        };
        debug!(bpm = self.bpm, at = self.state.next_event_time, "scheduler started");
        true
    }

    /// Stops committing beats. Beats already handed to the output still
    /// sound. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        if !self.state.running {
            return false;
        }
        self.state = SchedulerState::default();
        debug!("scheduler stopped");
        true
    }

    /// Changes the beat interval. The beat already computed keeps its time;
    /// the new interval applies from the one after it.
    ///
    /// Any positive, finite bpm is accepted; range limits belong to [`Tempo`].
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() && bpm > 0.0 {
            self.bpm = bpm;
        } else {
            warn!(bpm, "ignoring non-positive tempo");
        }
    }

    /// Commits every beat that falls inside the lookahead window.
    ///
    /// Each beat is scheduled on `output` as a click at its exact time and
    /// returned so the caller can raise a notification for it.
    ///
    /// # Arguments
    /// * `output` - Audio clock to read and device to schedule clicks on
    ///
    /// # Returns
    /// * Beats committed by this call in time order, empty when stopped or
    ///   when the next beat is still beyond the lookahead
    pub fn step<O: AudioOutput + ?Sized>(&mut self, output: &O) -> Vec<BeatEvent> {
        let mut events = Vec::new();
        if !self.state.running {
            return events;
        }

        let horizon = output.current_time() + self.lookahead;
        while self.state.next_event_time < horizon {
            let event = BeatEvent {
                beat_index: self.state.current_beat_index,
                scheduled_time: self.state.next_event_time,
                is_downbeat: self.state.current_beat_index == 0,
            };
            output.schedule_tone(self.tone_for(&event));
            events.push(event);

            self.state.next_event_time += self.seconds_per_beat();
            self.state.current_beat_index = (self.state.current_beat_index + 1) % BEATS_PER_BAR;
        }
        events
    }

    /// The click for a beat: accented pitch on the downbeat.
    pub fn tone_for(&self, event: &BeatEvent) -> Tone {
        Tone {
            frequency_hz: if event.is_downbeat { self.downbeat_hz } else { self.beat_hz },
            start_time: event.scheduled_time,
            envelope: self.envelope,
        }
    }
}

/// Wall-clock delay before the visual notification for `event`.
///
/// A beat committed late (tick jitter) would give a negative delay; it is
/// delivered immediately instead.
pub fn notification_delay(event: &BeatEvent, now: f64) -> Duration {
    let delay = event.scheduled_time - now;
    if delay.is_finite() && delay > 0.0 {
        Duration::from_secs_f64(delay)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingOutput;
    use approx::assert_abs_diff_eq;

    fn scheduler() -> BeatScheduler {
        BeatScheduler::new(&MetronomeConfig::default())
    }

    /// Advances the clock in 25 ms ticks, stepping after each one.
    fn run_ticks(
        scheduler: &mut BeatScheduler,
        output: &RecordingOutput,
        ticks: usize,
    ) -> Vec<BeatEvent> {
        let mut events = scheduler.step(output);
        for _ in 0..ticks {
            output.advance(0.025);
            events.extend(scheduler.step(output));
        }
        events
    }

    #[test]
    fn tempo_bounds_are_inclusive() {
        assert!(Tempo::new(39).is_err());
        assert!(Tempo::new(219).is_err());
        assert_eq!(Tempo::new(40).unwrap().bpm(), 40);
        assert_eq!(Tempo::new(218).unwrap().bpm(), 218);
        assert_eq!(
            Tempo::try_from(0),
            Err(TempoError { bpm: 0, min: MIN_BPM, max: MAX_BPM })
        );
    }

    #[test]
    fn start_resets_to_downbeat_at_clock_now() {
        let output = RecordingOutput::starting_at(12.5);
        let mut s = scheduler();
        assert!(s.start(120.0, &output));
        assert_eq!(
            s.state(),
            SchedulerState { running: true, next_event_time: 12.5, current_beat_index: 0 }
        );
    }

    #[test]
    fn beats_at_120_bpm_are_half_a_second_apart() {
        let output = RecordingOutput::starting_at(3.0);
        let mut s = scheduler();
        s.start(120.0, &output);
        let events = run_ticks(&mut s, &output, 200); // 5 seconds

        assert!(events.len() >= 10);
        for pair in events.windows(2) {
            let gap = pair[1].scheduled_time - pair[0].scheduled_time;
            assert_abs_diff_eq!(gap, 0.5, epsilon = 1e-9);
        }
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.beat_index as usize, i % 4);
            assert_eq!(event.is_downbeat, i % 4 == 0);
        }
        assert_abs_diff_eq!(events[0].scheduled_time, 3.0);
    }

    #[test]
    fn only_beats_inside_lookahead_are_committed() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        s.start(120.0, &output);

        assert_eq!(s.step(&output).len(), 1);
        // Still inside the same window: nothing new.
        assert!(s.step(&output).is_empty());

        output.set_time(0.39);
        assert!(s.step(&output).is_empty());
        output.set_time(0.41);
        let events = s.step(&output);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].beat_index, 1);
        assert_abs_diff_eq!(events[0].scheduled_time, 0.5);
    }

    #[test]
    fn late_tick_catches_up_without_drift() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        s.start(120.0, &output);
        s.step(&output);

        // The tick was delayed by more than a whole beat.
        output.set_time(1.7);
        let events = s.step(&output);
        let times: Vec<f64> = events.iter().map(|e| e.scheduled_time).collect();
        assert_eq!(times, vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn downbeat_and_regular_clicks_use_distinct_pitches() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        s.start(120.0, &output);
        run_ticks(&mut s, &output, 80);

        let tones = output.scheduled();
        assert!(tones.len() >= 5);
        assert_eq!(tones[0].frequency_hz, 1000.0);
        assert!(tones[1..4].iter().all(|t| t.frequency_hz == 800.0));
        assert_eq!(tones[4].frequency_hz, 1000.0);
        assert!(tones.iter().all(|t| t.envelope.duration() == 0.05));
    }

    #[test]
    fn set_bpm_applies_from_the_next_computed_beat() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        s.start(120.0, &output);
        let first = s.step(&output);
        assert_eq!(first.len(), 1);

        // Beat 1 was already computed at 0.5 s; the change starts after it.
        s.set_bpm(60.0);
        let events = run_ticks(&mut s, &output, 160);
        assert_abs_diff_eq!(events[0].scheduled_time, 0.5);
        for pair in events.windows(2) {
            let gap = pair[1].scheduled_time - pair[0].scheduled_time;
            assert_abs_diff_eq!(gap, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn every_supported_tempo_yields_its_interval() {
        for bpm in MIN_BPM..=MAX_BPM {
            let tempo = Tempo::new(bpm).unwrap();
            let output = RecordingOutput::starting_at(0.0);
            let mut s = scheduler();
            s.start(120.0, &output);
            s.step(&output);
            s.set_bpm(tempo.bpm() as f64);

            output.set_time(4.0);
            let events = s.step(&output);
            assert!(events.len() >= 2, "{bpm} bpm produced too few beats");
            for pair in events.windows(2) {
                assert_abs_diff_eq!(
                    pair[1].scheduled_time - pair[0].scheduled_time,
                    tempo.seconds_per_beat(),
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        s.start(120.0, &output);
        s.step(&output);
        let before = s.state();

        output.set_time(10.0);
        assert!(!s.start(90.0, &output));
        assert_eq!(s.state(), before);
        assert_eq!(s.bpm(), 120.0);
    }

    #[test]
    fn stop_is_idempotent_and_resets_state() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        assert!(!s.stop());

        s.start(120.0, &output);
        run_ticks(&mut s, &output, 30);
        assert!(s.stop());
        assert!(!s.stop());
        assert_eq!(s.state(), SchedulerState::default());
        assert!(!s.is_running());
        assert!(s.step(&output).is_empty());
    }

    #[test]
    fn restart_begins_a_new_bar() {
        let output = RecordingOutput::starting_at(0.0);
        let mut s = scheduler();
        s.start(120.0, &output);
        run_ticks(&mut s, &output, 30);
        s.stop();

        output.set_time(20.0);
        s.start(120.0, &output);
        let events = s.step(&output);
        assert_eq!(events[0].beat_index, 0);
        assert!(events[0].is_downbeat);
        assert_abs_diff_eq!(events[0].scheduled_time, 20.0);
    }

    #[test]
    fn invalid_bpm_is_ignored() {
        let mut s = scheduler();
        s.set_bpm(0.0);
        s.set_bpm(-5.0);
        s.set_bpm(f64::NAN);
        assert_eq!(s.bpm(), 120.0);
        s.set_bpm(300.0);
        assert_eq!(s.bpm(), 300.0);
    }

    #[test]
    fn notification_delay_clamps_to_zero() {
        let event = BeatEvent { beat_index: 2, scheduled_time: 5.0, is_downbeat: false };
        assert_eq!(notification_delay(&event, 5.5), Duration::ZERO);
        assert_eq!(notification_delay(&event, 5.0), Duration::ZERO);
        let delay = notification_delay(&event, 4.92);
        assert!((delay.as_secs_f64() - 0.08).abs() < 1e-9);
    }
}
