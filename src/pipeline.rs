use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crate::audio::analysis::{transcribe_with_progress, Transcription};
use crate::audio::decode::AudioData;
use crate::config::Config;
use crate::encode::smf::encode_smf;
use crate::error::{Result, TranscribeError};

/// Notes, tempo and the encoded `.mid` bytes of one conversion.
#[derive(Clone, Debug)]
pub struct Conversion {
    pub transcription: Transcription,
    pub midi: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

/// Transcribes and encodes in the foreground. See [`ConversionJob`] for the
/// background variant.
pub fn convert(audio: &AudioData, config: &Config) -> Result<Conversion> {
    convert_with_progress(audio, config, |_, _| {})
}

pub fn convert_with_progress<F>(audio: &AudioData, config: &Config, progress: F) -> Result<Conversion>
where
    F: FnMut(usize, usize) + Send,
{
    let transcription = transcribe_with_progress(audio, config, progress)?;
    let midi = encode_smf(&transcription.notes, &config.midi)?;
    log::info!("Encoded {} notes into {} bytes", transcription.notes.len(), midi.len());
    Ok(Conversion { transcription, midi })
}

/// A conversion running on its own thread. It owns its buffers; dropping the
/// job abandons the result.
pub struct ConversionJob {
    handle: JoinHandle<Result<Conversion>>,
    progress: Receiver<Progress>,
}

impl ConversionJob {
    pub fn spawn(audio: AudioData, config: Config) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("tonescribe-worker".into())
            .spawn(move || {
                convert_with_progress(&audio, &config, move |done, total| {
                    // receiver may be gone; the conversion carries on regardless
                    let _ = tx.send(Progress { done, total });
                })
            })
            .map_err(|err| {
                log::error!("Failed to spawn conversion worker: {}", err);
                TranscribeError::WorkerLost
            })?;

        Ok(Self {
            handle,
            progress: rx,
        })
    }

    /// Progress updates; the channel closes when the worker is done.
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    pub fn wait(self) -> Result<Conversion> {
        self.handle.join().map_err(|_| TranscribeError::WorkerLost)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(seconds: f32) -> AudioData {
        AudioData::new(vec![0.0; (44100.0 * seconds) as usize], 44100)
    }

    #[test]
    fn silent_conversion_is_empty_but_valid() {
        let conversion = convert(&silence(1.0), &Config::default()).unwrap();
        assert!(conversion.transcription.notes.is_empty());
        assert_eq!(conversion.transcription.tempo.tempo_bpm, 120.0);
        assert_eq!(conversion.midi.len(), 26);
    }

    #[test]
    fn job_reports_progress_and_result() {
        let job = ConversionJob::spawn(silence(2.0), Config::default()).unwrap();
        let updates: Vec<Progress> = job.progress().iter().collect();
        let conversion = job.wait().unwrap();

        let last = updates.last().unwrap();
        assert_eq!(last.done, last.total);
        assert_eq!(last.total, conversion.transcription.frame_count);
        for pair in updates.windows(2) {
            assert!(pair[0].done < pair[1].done);
        }
    }

    #[test]
    fn job_surfaces_invalid_input() {
        let job = ConversionJob::spawn(AudioData::new(Vec::new(), 44100), Config::default()).unwrap();
        assert!(matches!(job.wait(), Err(TranscribeError::InvalidInput(_))));
    }

    #[test]
    fn abandoned_job_does_not_block() {
        let job = ConversionJob::spawn(silence(0.5), Config::default()).unwrap();
        drop(job);
    }
}
