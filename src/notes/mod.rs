pub mod builder;

use serde::Serialize;

pub use builder::{build_notes, consolidate, map_velocity, quantize, NoteBuilder};

/// Lowest note kept; anything lower is treated as detector noise.
pub const LOWEST_NOTE: u8 = 36;
/// Highest note kept.
pub const HIGHEST_NOTE: u8 = 96;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// A transcribed note. Times are in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NoteEvent {
    pub onset_time: f64,
    pub pitch: u8,
    pub duration: f64,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn end_time(&self) -> f64 {
        self.onset_time + self.duration
    }
}

/// Equal-tempered note number (A4 = 440 Hz = 69), or `None` outside 36..=96.
pub fn freq_to_note(freq: f32) -> Option<u8> {
    if !(freq.is_finite() && freq > 0.0) {
        return None;
    }
    let note = (69.0 + 12.0 * (freq / 440.0).log2()).round();
    if note < LOWEST_NOTE as f32 || note > HIGHEST_NOTE as f32 {
        return None;
    }
    Some(note as u8)
}

/// Scientific pitch name, e.g. `A4`, `C#3`.
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}
