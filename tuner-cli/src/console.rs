//! Console front end: command parsing and notification display.

use crossbeam_channel::Receiver;
use std::io::Write;
use std::thread::{self, JoinHandle};
use tuner_core::tuning::{self, NoteMatch};
use tuner_core::{Notification, Tempo};

/// A line typed in interactive mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tune,
    Metronome(Option<Tempo>),
    SetTempo(Tempo),
    Stop,
    Strings,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  tune           listen and show the detected note
  metro [bpm]    start the metronome (40-218 bpm)
  tempo <bpm>    change the metronome tempo
  stop           stop the tuner or metronome
  strings        show standard guitar tuning
  quit           exit";

/// Parses one interactive command. Tempo requests are range-checked here,
/// before they can reach the metronome.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Err("empty command".to_string());
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{word}'"));
    }

    match (word.to_ascii_lowercase().as_str(), arg) {
        ("tune" | "tuner", None) => Ok(Command::Tune),
        ("metro" | "metronome", None) => Ok(Command::Metronome(None)),
        ("metro" | "metronome", Some(bpm)) => parse_tempo(bpm).map(|t| Command::Metronome(Some(t))),
        ("tempo" | "bpm", Some(bpm)) => parse_tempo(bpm).map(Command::SetTempo),
        ("tempo" | "bpm", None) => Err("usage: tempo <bpm>".to_string()),
        ("stop", None) => Ok(Command::Stop),
        ("strings", None) => Ok(Command::Strings),
        ("help" | "?", None) => Ok(Command::Help),
        ("quit" | "exit" | "q", None) => Ok(Command::Quit),
        (other, _) => Err(format!("unknown command '{other}', try 'help'")),
    }
}

/// Parses and validates a tempo; also used as the clap value parser.
pub fn parse_tempo(text: &str) -> Result<Tempo, String> {
    let bpm: u32 = text
        .trim()
        .parse()
        .map_err(|_| format!("'{text}' is not a whole number of bpm"))?;
    Tempo::new(bpm).map_err(|e| e.to_string())
}

/// One display line for a pitch reading.
pub fn format_pitch(frequency_hz: f32, note: &NoteMatch, in_tune_cents: f32) -> String {
    let status = if note.is_within(in_tune_cents) {
        "in tune".to_string()
    } else if note.cents_deviation > 0.0 {
        "sharp".to_string()
    } else {
        "flat".to_string()
    };
    let string_hint = tuning::nearest_string(frequency_hz)
        .filter(|(_, cents)| cents.abs() < 100.0)
        .map(|(s, _)| format!("  (string {} {})", s.number, s.label))
        .unwrap_or_default();

    format!(
        "{:<4} {:>8.2} Hz  {:>+6.1} cents  {}{}",
        note.label(),
        frequency_hz,
        note.cents_deviation,
        status,
        string_hint
    )
}

/// Beat marker: the downbeat is accented.
pub fn format_beat(beat_index: u8) -> String {
    if beat_index == 0 {
        format!("[{}]", beat_index + 1)
    } else {
        format!(" {} ", beat_index + 1)
    }
}

pub fn format_strings() -> String {
    tuning::standard_tuning()
        .iter()
        .rev()
        .map(|s| format!("string {}: {:<3} {:>7.2} Hz", s.number, s.label, s.frequency))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prints notifications until every sender is gone.
pub fn spawn_printer(notifications: Receiver<Notification>, in_tune_cents: f32) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdout = std::io::stdout();
        for notification in notifications.iter() {
            let mut out = stdout.lock();
            let _ = match notification {
                Notification::Pitch { frequency_hz, note } => {
                    writeln!(out, "{}", format_pitch(frequency_hz, &note, in_tune_cents))
                }
                Notification::Beat { beat_index } => writeln!(out, "{}", format_beat(beat_index)),
            };
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("tune"), Ok(Command::Tune));
        assert_eq!(parse_command("  STOP "), Ok(Command::Stop));
        assert_eq!(parse_command("metro"), Ok(Command::Metronome(None)));
        assert_eq!(
            parse_command("metro 90"),
            Ok(Command::Metronome(Some(Tempo::new(90).unwrap())))
        );
        assert_eq!(parse_command("tempo 140"), Ok(Command::SetTempo(Tempo::new(140).unwrap())));
        assert_eq!(parse_command("q"), Ok(Command::Quit));
        assert!(parse_command("").is_err());
        assert!(parse_command("tempo").is_err());
        assert!(parse_command("tune now").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn tempo_boundaries_are_enforced_at_the_prompt() {
        assert!(parse_tempo("39").is_err());
        assert!(parse_tempo("219").is_err());
        assert_eq!(parse_tempo("40").unwrap().bpm(), 40);
        assert_eq!(parse_tempo("218").unwrap().bpm(), 218);
        assert!(parse_tempo("12.5").is_err());
        assert!(parse_tempo("-3").is_err());
        assert!(parse_command("metro 300").is_err());
    }

    #[test]
    fn pitch_line_shows_note_cents_and_string() {
        let note = tuning::find_nearest_note(110.0).unwrap();
        let line = format_pitch(110.0, &note, 5.0);
        assert!(line.starts_with("A2"));
        assert!(line.contains("in tune"));
        assert!(line.contains("string 5 A2"));

        let note = tuning::find_nearest_note(445.0).unwrap();
        let line = format_pitch(445.0, &note, 5.0);
        assert!(line.contains("+19.6"));
        assert!(line.contains("sharp"));
    }

    #[test]
    fn downbeat_is_marked() {
        assert_eq!(format_beat(0), "[1]");
        assert_eq!(format_beat(3), " 4 ");
    }

    #[test]
    fn strings_listed_high_to_low() {
        let listing = format_strings();
        let first = listing.lines().next().unwrap();
        assert!(first.starts_with("string 1: E4"));
        assert_eq!(listing.lines().count(), 6);
    }
}
