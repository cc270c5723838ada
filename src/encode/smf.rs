use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::config::MidiConfig;
use crate::error::{invalid, Result, TranscribeError};
use crate::notes::NoteEvent;

/// Largest value a 4-byte variable-length quantity can hold.
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const END_OF_TRACK: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

/// Appends `value` as a MIDI variable-length quantity: 7 bits per byte,
/// most significant group first, continuation bit on all but the last byte.
pub fn write_vlq(buf: &mut Vec<u8>, value: u32) -> Result<()> {
    if value > MAX_VLQ {
        return Err(TranscribeError::EncodingOverflow { ticks: value as u64 });
    }

    let mut bytes = [0u8; 4];
    let mut i = 3;
    let mut rest = value;
    bytes[i] = (rest & 0x7F) as u8;
    rest >>= 7;
    while rest > 0 {
        i -= 1;
        bytes[i] = ((rest & 0x7F) | 0x80) as u8;
        rest >>= 7;
    }
    buf.extend_from_slice(&bytes[i..]);
    Ok(())
}

/// Serializes notes (any order) into a single-track Type-0 Standard MIDI File.
///
/// Times map to ticks as `round(seconds * ticks_per_quarter)`, so one second of
/// audio is one quarter note. No set-tempo meta event is written; players fall
/// back to 120 BPM, where a quarter lasts half a second, and the file plays at
/// twice real time. The detected tempo is reported alongside, not embedded.
pub fn encode_smf(notes: &[NoteEvent], config: &MidiConfig) -> Result<Vec<u8>> {
    let tpq = config.ticks_per_quarter;
    if tpq == 0 || tpq > 0x7FFF {
        return Err(invalid(format!("ticks per quarter must be in 1..=32767, got {}", tpq)));
    }
    if config.release_velocity > 0x7F {
        return Err(invalid(format!("release velocity {} exceeds 127", config.release_velocity)));
    }

    let track = TrackWriter::new(tpq, config.release_velocity).write(notes)?;

    let mut out = Vec::with_capacity(22 + track.len());
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // format 0
    out.extend_from_slice(&1u16.to_be_bytes()); // 1 track
    out.extend_from_slice(&tpq.to_be_bytes());

    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(track.len() as u32).to_be_bytes());
    out.extend_from_slice(&track);

    Ok(out)
}

struct TrackWriter {
    ticks_per_quarter: f64,
    release_velocity: u8,
    bytes: Vec<u8>,
    last_tick: u64,
    /// Pending note-offs as (tick, insertion order, pitch)
    pending_offs: BinaryHeap<Reverse<(u64, usize, u8)>>,
}

impl TrackWriter {
    fn new(ticks_per_quarter: u16, release_velocity: u8) -> Self {
        Self {
            ticks_per_quarter: ticks_per_quarter as f64,
            release_velocity,
            bytes: Vec::new(),
            last_tick: 0,
            pending_offs: BinaryHeap::new(),
        }
    }

    fn write(mut self, notes: &[NoteEvent]) -> Result<Vec<u8>> {
        for note in notes {
            validate(note)?;
        }

        let mut sorted: Vec<&NoteEvent> = notes.iter().collect();
        sorted.sort_by(|a, b| a.onset_time.total_cmp(&b.onset_time));

        for (seq, note) in sorted.into_iter().enumerate() {
            let on_tick = self.ticks(note.onset_time);
            let off_tick = self.ticks(note.end_time()).max(on_tick);

            // note-offs due at or before this onset go out first
            self.flush_offs(Some(on_tick))?;
            self.event(on_tick, [NOTE_ON, note.pitch, note.velocity])?;
            self.pending_offs.push(Reverse((off_tick, seq, note.pitch)));
        }
        self.flush_offs(None)?;

        self.bytes.extend_from_slice(&END_OF_TRACK);
        Ok(self.bytes)
    }

    fn flush_offs(&mut self, until: Option<u64>) -> Result<()> {
        while let Some(&Reverse((tick, _, pitch))) = self.pending_offs.peek() {
            if until.is_some_and(|limit| tick > limit) {
                break;
            }
            self.pending_offs.pop();
            self.event(tick, [NOTE_OFF, pitch, self.release_velocity])?;
        }
        Ok(())
    }

    fn event(&mut self, tick: u64, message: [u8; 3]) -> Result<()> {
        let delta = tick - self.last_tick;
        let delta = u32::try_from(delta)
            .ok()
            .filter(|&d| d <= MAX_VLQ)
            .ok_or(TranscribeError::EncodingOverflow { ticks: delta })?;
        write_vlq(&mut self.bytes, delta)?;
        self.bytes.extend_from_slice(&message);
        self.last_tick = tick;
        Ok(())
    }

    fn ticks(&self, seconds: f64) -> u64 {
        (seconds * self.ticks_per_quarter).round().max(0.0) as u64
    }
}

fn validate(note: &NoteEvent) -> Result<()> {
    if !(note.onset_time.is_finite() && note.end_time().is_finite()) {
        return Err(invalid(format!("note at {} has non-finite timing", note.onset_time)));
    }
    if note.onset_time < 0.0 || note.duration < 0.0 {
        return Err(invalid(format!(
            "note at {} has negative onset or duration",
            note.onset_time
        )));
    }
    if note.pitch > 0x7F || note.velocity > 0x7F {
        return Err(invalid(format!(
            "note data out of range: pitch {} velocity {}",
            note.pitch, note.velocity
        )));
    }
    Ok(())
}
