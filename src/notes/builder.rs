use super::{freq_to_note, NoteEvent};
use crate::audio::features::PitchFrame;
use crate::config::NoteConfig;

/// Running note being extended frame by frame.
#[derive(Clone, Debug)]
struct Accumulator {
    onset_time: f64,
    end_time: f64,
    velocity: u8,
    /// Frame count per note number, in first-seen order
    votes: Vec<(u8, usize)>,
}

impl Accumulator {
    fn start(pitch: u8, time: f64, frame_duration: f64, velocity: u8) -> Self {
        Self {
            onset_time: time,
            end_time: time + frame_duration,
            velocity,
            votes: vec![(pitch, 1)],
        }
    }

    /// Most frequent note number; the earliest seen wins ties.
    fn pitch(&self) -> u8 {
        let mut best = self.votes[0];
        for &vote in &self.votes[1..] {
            if vote.1 > best.1 {
                best = vote;
            }
        }
        best.0
    }

    fn continues(&self, pitch: u8, time: f64, config: &NoteConfig) -> bool {
        pitch.abs_diff(self.pitch()) <= config.pitch_tolerance
            && time <= self.end_time + config.gap_tolerance
    }

    fn extend(&mut self, pitch: u8, end_time: f64, velocity: u8) {
        self.end_time = self.end_time.max(end_time);
        self.velocity = self.velocity.max(velocity);
        match self.votes.iter_mut().find(|(p, _)| *p == pitch) {
            Some(vote) => vote.1 += 1,
            None => self.votes.push((pitch, 1)),
        }
    }

    fn into_note(self) -> NoteEvent {
        NoteEvent {
            onset_time: self.onset_time,
            pitch: self.pitch(),
            duration: self.end_time - self.onset_time,
            velocity: self.velocity,
        }
    }
}

/// Turns a time-ordered stream of pitch frames into note events.
pub struct NoteBuilder<'a> {
    config: &'a NoteConfig,
    frame_duration: f64,
    current: Option<Accumulator>,
    notes: Vec<NoteEvent>,
}

impl<'a> NoteBuilder<'a> {
    /// `frame_duration` is the time one frame accounts for (the hop).
    pub fn new(config: &'a NoteConfig, frame_duration: f64) -> Self {
        Self {
            config,
            frame_duration,
            current: None,
            notes: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: &PitchFrame) {
        let Some(pitch) = frame.frequency.and_then(freq_to_note) else {
            return;
        };
        let velocity = map_velocity(frame.amplitude, self.config);

        if let Some(acc) = self.current.as_mut() {
            if acc.continues(pitch, frame.time, self.config) {
                acc.extend(pitch, frame.time + self.frame_duration, velocity);
                return;
            }
        }

        self.flush();
        self.current = Some(Accumulator::start(pitch, frame.time, self.frame_duration, velocity));
    }

    fn flush(&mut self) {
        if let Some(acc) = self.current.take() {
            let note = acc.into_note();
            if note.duration >= self.config.min_duration {
                self.notes.push(note);
            } else {
                log::trace!("Dropping {:.3}s blip at {:.3}s", note.duration, note.onset_time);
            }
        }
    }

    /// Finalizes the pending note and runs the consolidation pass if enabled.
    pub fn finish(mut self) -> Vec<NoteEvent> {
        self.flush();
        let notes = std::mem::take(&mut self.notes);
        if self.config.consolidate {
            consolidate(notes, self.config)
        } else {
            notes
        }
    }
}

/// Frame pass, consolidation, then optional beat-grid quantization.
pub fn build_notes(
    frames: &[PitchFrame],
    frame_duration: f64,
    tempo_bpm: f32,
    config: &NoteConfig,
) -> Vec<NoteEvent> {
    let mut builder = NoteBuilder::new(config, frame_duration);
    for frame in frames {
        builder.push(frame);
    }
    let mut notes = builder.finish();

    if config.quantize_subdivisions > 0 {
        notes = quantize(notes, tempo_bpm, config.quantize_subdivisions);
    }

    notes.sort_by(|a, b| a.onset_time.total_cmp(&b.onset_time));
    notes
}

/// Saturating affine map from RMS amplitude to velocity in 20..=127.
pub fn map_velocity(amplitude: f32, config: &NoteConfig) -> u8 {
    let amplitude = if amplitude.is_finite() { amplitude.max(0.0) } else { 0.0 };
    (amplitude * config.velocity_scale + config.velocity_offset)
        .floor()
        .clamp(20.0, 127.0) as u8
}

/// Merges neighbouring notes of equal or adjacent pitch separated by less
/// than the gap tolerance, until nothing merges.
pub fn consolidate(mut notes: Vec<NoteEvent>, config: &NoteConfig) -> Vec<NoteEvent> {
    notes.sort_by(|a, b| a.onset_time.total_cmp(&b.onset_time));

    loop {
        let before = notes.len();
        let mut i = 0;
        while i + 1 < notes.len() {
            let cur = notes[i];
            let next = notes[i + 1];
            let close = next.onset_time - cur.end_time() <= config.gap_tolerance;
            if close && cur.pitch.abs_diff(next.pitch) <= config.pitch_tolerance {
                let end = cur.end_time().max(next.end_time());
                notes[i] = NoteEvent {
                    onset_time: cur.onset_time,
                    pitch: if next.duration > cur.duration { next.pitch } else { cur.pitch },
                    duration: end - cur.onset_time,
                    velocity: cur.velocity.max(next.velocity),
                };
                notes.remove(i + 1);
                // re-check the merged note against its new neighbour
            } else {
                i += 1;
            }
        }
        if notes.len() == before {
            break;
        }
    }

    notes
}

/// Snaps onsets and ends to a `subdivisions`-per-beat grid at `tempo_bpm`.
/// A note never shrinks below one grid step.
pub fn quantize(notes: Vec<NoteEvent>, tempo_bpm: f32, subdivisions: u32) -> Vec<NoteEvent> {
    if subdivisions == 0 || !(tempo_bpm > 0.0) {
        return notes;
    }
    let step = 60.0 / (tempo_bpm as f64 * subdivisions as f64);
    let snap = |t: f64| (t / step).round() * step;

    notes
        .into_iter()
        .map(|note| {
            let onset = snap(note.onset_time).max(0.0);
            let mut end = snap(note.end_time());
            if end <= onset {
                end = onset + step;
            }
            NoteEvent {
                onset_time: onset,
                duration: end - onset,
                ..note
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOP: f64 = 0.01;

    fn note_to_freq(note: u8) -> f32 {
        440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
    }

    fn frame(time: f64, note: Option<u8>, amplitude: f32) -> PitchFrame {
        PitchFrame {
            time,
            frequency: note.map(note_to_freq),
            amplitude,
        }
    }

    /// `count` contiguous frames of `note` starting at `start`.
    fn run(start: f64, count: usize, note: u8, amplitude: f32) -> Vec<PitchFrame> {
        (0..count)
            .map(|i| frame(start + i as f64 * HOP, Some(note), amplitude))
            .collect()
    }

    fn note(onset: f64, pitch: u8, duration: f64) -> NoteEvent {
        NoteEvent {
            onset_time: onset,
            pitch,
            duration,
            velocity: 80,
        }
    }

    #[test]
    fn contiguous_frames_form_one_note() {
        let frames = run(0.5, 50, 69, 0.2);
        let notes = build_notes(&frames, HOP, 120.0, &NoteConfig::default());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 69);
        assert!((notes[0].onset_time - 0.5).abs() < 1e-9);
        assert!((notes[0].duration - 0.5).abs() < 1e-9);
    }

    #[test]
    fn long_gap_splits_notes() {
        let mut frames = run(0.0, 20, 60, 0.2);
        frames.extend(run(0.5, 20, 60, 0.2));
        let notes = build_notes(&frames, HOP, 120.0, &NoteConfig::default());
        assert_eq!(notes.len(), 2);
        assert!(notes[0].onset_time < notes[1].onset_time);
    }

    #[test]
    fn pitch_jump_splits_notes() {
        let mut frames = run(0.0, 20, 60, 0.2);
        frames.extend(run(0.2, 20, 64, 0.2));
        let notes = build_notes(&frames, HOP, 120.0, &NoteConfig::default());
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64]);
    }

    #[test]
    fn short_blips_are_dropped() {
        let frames = run(1.0, 3, 72, 0.3);
        assert!(build_notes(&frames, HOP, 120.0, &NoteConfig::default()).is_empty());
    }

    #[test]
    fn unpitched_and_out_of_band_frames_are_ignored() {
        let mut frames = vec![frame(0.0, None, 0.5), frame(0.01, Some(20), 0.5)];
        frames.extend(run(0.02, 1, 110, 0.5));
        assert!(build_notes(&frames, HOP, 120.0, &NoteConfig::default()).is_empty());
    }

    #[test]
    fn legato_semitone_steps_stay_separate() {
        let mut frames = Vec::new();
        for (k, pitch) in (60u8..=63).enumerate() {
            frames.extend(run(k as f64 * 0.4, 40, pitch, 0.2));
        }
        let notes = build_notes(&frames, HOP, 120.0, &NoteConfig::default());
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 61, 62, 63]);
    }

    #[test]
    fn edge_frame_does_not_decide_pitch() {
        let config = NoteConfig {
            pitch_tolerance: 1,
            ..NoteConfig::default()
        };
        let mut frames = run(0.0, 1, 70, 0.05);
        frames.extend(run(0.01, 30, 69, 0.2));
        let notes = build_notes(&frames, HOP, 120.0, &config);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 69);
        assert!(notes[0].onset_time.abs() < 1e-9);
    }

    #[test]
    fn velocity_is_loudest_frame() {
        let config = NoteConfig::default();
        let mut frames = run(0.0, 10, 60, 0.05);
        frames.extend(run(0.1, 10, 60, 0.2));
        let notes = build_notes(&frames, HOP, 120.0, &config);
        assert_eq!(notes[0].velocity, map_velocity(0.2, &config));
    }

    #[test]
    fn velocity_mapping_saturates() {
        let config = NoteConfig::default();
        assert_eq!(map_velocity(0.0, &config), 20);
        assert_eq!(map_velocity(5.0, &config), 127);
        assert_eq!(map_velocity(f32::NAN, &config), 20);
        let mut last = 0;
        for i in 0..100 {
            let v = map_velocity(i as f32 * 0.005, &config);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn consolidation_bridges_short_dips() {
        let config = NoteConfig::default();
        let notes = vec![note(0.0, 60, 0.3), note(0.34, 60, 0.3), note(1.0, 60, 0.2)];
        let merged = consolidate(notes, &config);
        assert_eq!(merged.len(), 2);
        assert!((merged[0].duration - 0.64).abs() < 1e-9);
    }

    #[test]
    fn consolidation_merges_chains_to_a_fixpoint() {
        let config = NoteConfig::default();
        let notes = vec![
            note(0.62, 62, 0.1),
            note(0.0, 62, 0.3),
            note(0.32, 62, 0.28),
        ];
        let merged = consolidate(notes, &config);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].end_time() - 0.72).abs() < 1e-9);
    }

    #[test]
    fn disabled_consolidation_keeps_split() {
        let config = NoteConfig {
            consolidate: false,
            gap_tolerance: 0.02,
            ..NoteConfig::default()
        };
        let mut frames = run(0.0, 20, 60, 0.2);
        frames.extend(run(0.25, 20, 60, 0.2));
        assert_eq!(build_notes(&frames, HOP, 120.0, &config).len(), 2);
    }

    #[test]
    fn unpitched_frames_inside_gap_tolerance_bridge_without_consolidation() {
        let config = NoteConfig {
            consolidate: false,
            ..NoteConfig::default()
        };
        let mut frames = run(0.0, 20, 60, 0.2);
        frames.extend((20..23).map(|i| frame(i as f64 * HOP, None, 0.2)));
        frames.extend(run(0.23, 20, 60, 0.2));
        let notes = build_notes(&frames, HOP, 120.0, &config);
        assert_eq!(notes.len(), 1);
        assert!((notes[0].duration - 0.43).abs() < 1e-9);
    }

    #[test]
    fn quantize_snaps_to_grid() {
        // 120 BPM, 4 per beat: 0.125 s grid
        let notes = vec![note(0.51, 60, 0.23), note(1.0, 62, 0.01)];
        let snapped = quantize(notes, 120.0, 4);
        assert!((snapped[0].onset_time - 0.5).abs() < 1e-9);
        assert!((snapped[0].duration - 0.25).abs() < 1e-9);
        assert!((snapped[1].duration - 0.125).abs() < 1e-9);
    }

    #[test]
    fn output_is_sorted_and_in_range() {
        let mut frames = Vec::new();
        for (k, &pitch) in [60u8, 67, 64, 72, 48].iter().enumerate() {
            frames.extend(run(k as f64 * 0.3, 15, pitch, 0.1 + k as f32 * 0.1));
        }
        let notes = build_notes(&frames, HOP, 120.0, &NoteConfig::default());
        assert_eq!(notes.len(), 5);
        for pair in notes.windows(2) {
            assert!(pair[0].onset_time <= pair[1].onset_time);
        }
        for n in &notes {
            assert!((36..=96).contains(&n.pitch));
            assert!(n.velocity <= 127);
            assert!(n.duration > 0.0);
        }
    }
}
