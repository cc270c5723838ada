use crate::config::AnalysisConfig;

/// YIN fundamental-frequency estimator for single tapered frames, bound to one
/// sample rate and frequency range.
#[derive(Clone, Debug)]
pub struct YinDetector {
    sample_rate: f32,
    min_freq: f32,
    max_freq: f32,
    threshold: f32,
}

impl YinDetector {
    pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            min_freq,
            max_freq,
            threshold: 0.1,
        }
    }

    pub fn from_config(sample_rate: u32, config: &AnalysisConfig) -> Self {
        Self::new(sample_rate, config.min_freq, config.max_freq).with_threshold(config.yin_threshold)
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Returns the fundamental in Hz, or `None` for silence, noise, or a
    /// degenerate range.
    pub fn detect(&self, frame: &[f32]) -> Option<f32> {
        if !(self.min_freq > 0.0 && self.max_freq > self.min_freq) {
            return None;
        }

        let half = frame.len() / 2;
        let tau_min = ((self.sample_rate / self.max_freq).floor() as usize).max(1);
        // leave room for tau + 1 in the interpolation step
        let tau_max = ((self.sample_rate / self.min_freq).floor() as usize).min(half.saturating_sub(2));
        if tau_min + 1 > tau_max {
            return None;
        }

        let diff = difference(frame, half, tau_max + 1);
        let cmnd = cumulative_mean_normalized(&diff);

        let mut tau = (tau_min..=tau_max).find(|&t| cmnd[t] < self.threshold)?;
        // walk down to the bottom of the dip
        while tau < tau_max && cmnd[tau + 1] < cmnd[tau] {
            tau += 1;
        }

        let period = parabolic_interpolation(&cmnd, tau);
        if period <= 0.0 {
            return None;
        }
        Some(self.sample_rate / period)
    }
}

/// `d(tau) = sum_i (x[i] - x[i + tau])^2` over an integration window of `width`.
fn difference(frame: &[f32], width: usize, lags: usize) -> Vec<f32> {
    let mut diff = vec![0.0f32; lags + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = frame[..width]
            .iter()
            .zip(&frame[tau..tau + width])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
    }
    diff
}

fn cumulative_mean_normalized(diff: &[f32]) -> Vec<f32> {
    let mut cmnd = vec![1.0f32; diff.len()];
    let mut running_sum = 0.0f32;
    for tau in 1..diff.len() {
        running_sum += diff[tau];
        cmnd[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }
    cmnd
}

fn parabolic_interpolation(cmnd: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f32;
    }

    let s0 = cmnd[tau - 1];
    let s1 = cmnd[tau];
    let s2 = cmnd[tau + 1];
    let curvature = 2.0 * (2.0 * s1 - s0 - s2);
    if curvature.abs() < f32::EPSILON {
        return tau as f32;
    }

    let shift = ((s2 - s0) / curvature).clamp(-1.0, 1.0);
    tau as f32 + shift
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}
