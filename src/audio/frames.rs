use crate::error::{invalid, Result};

/// One Hamming-tapered analysis window.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Start time in seconds (`start_index / sample_rate`).
    pub time: f64,
    pub samples: Vec<f32>,
}

/// Slices a sample buffer into overlapping windows at `0, H, 2H, ...`
/// while `start + W <= len`. Frames are produced on demand and never retained.
#[derive(Clone, Debug)]
pub struct FrameExtractor<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    window_size: usize,
    hop_size: usize,
    taper: Vec<f32>,
}

impl<'a> FrameExtractor<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, window_size: usize, hop_size: usize) -> Result<Self> {
        if samples.is_empty() {
            return Err(invalid("sample buffer is empty"));
        }
        if sample_rate == 0 {
            return Err(invalid("sample rate must be positive"));
        }
        if window_size == 0 || hop_size == 0 {
            return Err(invalid("window and hop sizes must be positive"));
        }
        if hop_size > window_size {
            return Err(invalid(format!(
                "hop size {} exceeds window size {}",
                hop_size, window_size
            )));
        }
        if window_size > samples.len() {
            return Err(invalid(format!(
                "window size {} exceeds buffer length {}",
                window_size,
                samples.len()
            )));
        }

        Ok(Self {
            samples,
            sample_rate,
            window_size,
            hop_size,
            taper: hamming_window(window_size),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Seconds between consecutive frame starts.
    pub fn hop_duration(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Number of whole frames in the buffer.
    pub fn len(&self) -> usize {
        (self.samples.len() - self.window_size) / self.hop_size + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds frame `index`, or `None` past the end.
    pub fn frame(&self, index: usize) -> Option<Frame> {
        let start = index.checked_mul(self.hop_size)?;
        let end = start.checked_add(self.window_size)?;
        if end > self.samples.len() {
            return None;
        }

        let samples = self.samples[start..end]
            .iter()
            .zip(&self.taper)
            .map(|(s, w)| s * w)
            .collect();

        Some(Frame {
            time: start as f64 / self.sample_rate as f64,
            samples,
        })
    }

    /// A fresh pass over the frames; call again to restart.
    pub fn iter(&self) -> Frames<'_, 'a> {
        Frames { extractor: self, next: 0 }
    }
}

pub struct Frames<'e, 'a> {
    extractor: &'e FrameExtractor<'a>,
    next: usize,
}

impl Iterator for Frames<'_, '_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let frame = self.extractor.frame(self.next)?;
        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.extractor.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_, '_> {}

pub fn hamming_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|j| {
            0.54 - 0.46 * (2.0 * std::f32::consts::PI * j as f32 / (size - 1) as f32).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscribeError;

    #[test]
    fn frame_count_and_times() {
        let samples = vec![1.0f32; 1000];
        let ex = FrameExtractor::new(&samples, 100, 200, 100).unwrap();
        // starts 0, 100, ..., 800
        assert_eq!(ex.len(), 9);
        let times: Vec<f64> = ex.iter().map(|f| f.time).collect();
        assert_eq!(times.len(), 9);
        assert_eq!(times[0], 0.0);
        assert!((times[8] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn iteration_restarts() {
        let samples = vec![0.5f32; 64];
        let ex = FrameExtractor::new(&samples, 8000, 16, 8).unwrap();
        assert_eq!(ex.iter().count(), ex.iter().count());
        assert_eq!(ex.iter().len(), 7);
    }

    #[test]
    fn taper_is_applied() {
        let samples = vec![1.0f32; 32];
        let ex = FrameExtractor::new(&samples, 8000, 32, 32).unwrap();
        let frame = ex.frame(0).unwrap();
        assert!((frame.samples[0] - 0.08).abs() < 1e-6);
        assert!((frame.samples[31] - 0.08).abs() < 1e-6);
        assert!(frame.samples[16] > 0.99);
        assert!(ex.frame(1).is_none());
    }

    #[test]
    fn rejects_bad_configuration() {
        let samples = vec![0.0f32; 100];
        let cases = [
            FrameExtractor::new(&[], 44100, 16, 8).err(),
            FrameExtractor::new(&samples, 0, 16, 8).err(),
            FrameExtractor::new(&samples, 44100, 16, 32).err(),
            FrameExtractor::new(&samples, 44100, 128, 64).err(),
            FrameExtractor::new(&samples, 44100, 0, 0).err(),
        ];
        for err in cases {
            assert!(matches!(err, Some(TranscribeError::InvalidInput(_))));
        }
    }

    #[test]
    fn window_equal_to_buffer_yields_one_frame() {
        let samples = vec![0.1f32; 256];
        let ex = FrameExtractor::new(&samples, 44100, 256, 64).unwrap();
        assert_eq!(ex.len(), 1);
    }
}
