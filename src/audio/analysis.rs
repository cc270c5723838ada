use rayon::prelude::*;

use super::decode::AudioData;
use super::features::{PitchFrame, TempoAnalysis};
use super::frames::{Frame, FrameExtractor};
use super::pitch::{rms, YinDetector};
use super::tempo::analyze_tempo;
use crate::config::{AnalysisConfig, Config};
use crate::error::Result;
use crate::notes::{build_notes, NoteEvent};

/// Frames analyzed between progress callbacks. Callbacks only ever fire
/// between whole frames.
const PROGRESS_CHUNK: usize = 256;

#[derive(Clone, Debug)]
pub struct Transcription {
    pub sample_rate: u32,
    pub duration: f64,
    pub frame_count: usize,
    pub notes: Vec<NoteEvent>,
    pub tempo: TempoAnalysis,
}

/// Frames the samples, pitches each frame with YIN and segments the result into
/// notes, while a spectral-flux pass estimates the tempo.
pub fn transcribe(audio: &AudioData, config: &Config) -> Result<Transcription> {
    transcribe_with_progress(audio, config, |_, _| {})
}

/// Pitch pass and onset pass run concurrently; notes are built once both finish.
/// `progress(done, total)` reports pitch frames completed.
pub fn transcribe_with_progress<F>(audio: &AudioData, config: &Config, mut progress: F) -> Result<Transcription>
where
    F: FnMut(usize, usize) + Send,
{
    config.validate()?;
    let samples = &audio.samples;
    let sr = audio.sample_rate;
    let extractor = FrameExtractor::new(
        samples,
        sr,
        config.analysis.window_size,
        config.analysis.hop_size,
    )?;
    let duration = audio.duration();

    log::info!(
        "Pass 1: pitch tracking ({} frames) and onset detection...",
        extractor.len()
    );
    let (frames, tempo) = rayon::join(
        || pitch_track(&extractor, &config.analysis, &mut progress),
        || analyze_tempo(samples, sr, &config.tempo),
    );

    let voiced = frames.iter().filter(|f| f.frequency.is_some()).count();
    log::info!("Pass 2: note building ({} voiced frames)...", voiced);
    let notes = build_notes(&frames, extractor.hop_duration(), tempo.tempo_bpm, &config.notes);

    log::info!(
        "Transcribed {} notes over {:.1}s at {:.1} BPM",
        notes.len(),
        duration,
        tempo.tempo_bpm
    );
    for note in &notes {
        log::debug!(
            "  {:.3}s +{:.3}s note={} vel={}",
            note.onset_time,
            note.duration,
            note.pitch,
            note.velocity
        );
    }

    Ok(Transcription {
        sample_rate: sr,
        duration,
        frame_count: frames.len(),
        notes,
        tempo,
    })
}

/// Per-frame pitch and amplitude, in frame order.
pub fn pitch_track<F>(extractor: &FrameExtractor, config: &AnalysisConfig, progress: &mut F) -> Vec<PitchFrame>
where
    F: FnMut(usize, usize),
{
    let detector = YinDetector::from_config(extractor.sample_rate(), config);
    let total = extractor.len();
    let mut frames = Vec::with_capacity(total);

    let mut done = 0;
    while done < total {
        let end = (done + PROGRESS_CHUNK).min(total);
        let chunk: Vec<PitchFrame> = (done..end)
            .into_par_iter()
            .filter_map(|i| extractor.frame(i))
            .map(|frame| analyze_frame(&frame, &detector, config.amplitude_floor))
            .collect();
        frames.extend(chunk);
        done = end;
        progress(done, total);
    }

    frames
}

fn analyze_frame(frame: &Frame, detector: &YinDetector, amplitude_floor: f32) -> PitchFrame {
    let amplitude = rms(&frame.samples);
    let frequency = if amplitude < amplitude_floor {
        None
    } else {
        detector.detect(&frame.samples)
    };

    PitchFrame {
        time: frame.time,
        frequency,
        amplitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscribeError;

    fn tone(freq: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        (0..(seconds * sample_rate as f32) as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn pitch_track_covers_every_frame_in_order() {
        let samples = tone(220.0, 0.5, 22050);
        let extractor = FrameExtractor::new(&samples, 22050, 1024, 256).unwrap();
        let mut calls = Vec::new();
        let frames = pitch_track(&extractor, &AnalysisConfig::default(), &mut |done, total| {
            calls.push((done, total))
        });

        assert_eq!(frames.len(), extractor.len());
        for pair in frames.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        assert_eq!(calls.last(), Some(&(extractor.len(), extractor.len())));
        let voiced = frames.iter().filter(|f| f.frequency.is_some()).count();
        assert!(voiced > frames.len() / 2);
    }

    #[test]
    fn progress_reports_whole_chunks() {
        let samples = vec![0.0f32; 44100 * 4];
        let extractor = FrameExtractor::new(&samples, 44100, 2048, 512).unwrap();
        let mut calls = Vec::new();
        pitch_track(&extractor, &AnalysisConfig::default(), &mut |done, _| calls.push(done));
        assert!(calls.len() > 1);
        for done in &calls[..calls.len() - 1] {
            assert_eq!(done % PROGRESS_CHUNK, 0);
        }
    }

    #[test]
    fn quiet_frames_are_unpitched() {
        let samples: Vec<f32> = tone(440.0, 0.5, 44100).iter().map(|s| s * 0.001).collect();
        let audio = AudioData::new(samples, 44100);
        let result = transcribe(&audio, &Config::default()).unwrap();
        assert!(result.notes.is_empty());
    }

    #[test]
    fn short_buffer_is_invalid() {
        let audio = AudioData::new(vec![0.0; 100], 44100);
        let err = transcribe(&audio, &Config::default()).unwrap_err();
        assert!(matches!(err, TranscribeError::InvalidInput(_)));
    }
}
