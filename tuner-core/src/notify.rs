//! Notification collaborator: where beat highlights and pitch readings go.
//!
//! Delivery is best effort. Beat notifications are timed on the wall clock
//! and may arrive up to one maintenance tick late, so nothing timing
//! sensitive should hang off them.

use crate::tuning::NoteMatch;
use crossbeam_channel::Sender;

pub trait Notifier: Send + Sync {
    /// Beat `beat_index` (0 is the downbeat) is sounding now.
    fn on_beat(&self, beat_index: u8);

    /// A pitch was detected. `note` carries the name and cents deviation.
    fn on_pitch(&self, frequency_hz: f32, note: &NoteMatch);
}

/// What a [`ChannelNotifier`] forwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Beat { beat_index: u8 },
    Pitch { frequency_hz: f32, note: NoteMatch },
}

/// Forwards notifications to a channel, e.g. to a UI thread.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<Notification>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn on_beat(&self, beat_index: u8) {
        // A closed channel just means nobody is listening any more.
        let _ = self.sender.send(Notification::Beat { beat_index });
    }

    fn on_pitch(&self, frequency_hz: f32, note: &NoteMatch) {
        let _ = self.sender.send(Notification::Pitch { frequency_hz, note: *note });
    }
}
