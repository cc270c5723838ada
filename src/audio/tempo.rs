use rustfft::{num_complex::Complex, FftPlanner};

use super::features::TempoAnalysis;
use super::frames::FrameExtractor;
use crate::config::TempoConfig;

/// Spectral-flux onset detection followed by inter-onset interval clustering.
/// Always yields a tempo inside `[min_bpm, max_bpm]`.
pub fn analyze_tempo(samples: &[f32], sample_rate: u32, config: &TempoConfig) -> TempoAnalysis {
    let onset_times = detect_onsets(samples, sample_rate, config);
    let tempo_bpm = estimate_tempo(&onset_times, config);

    log::info!("Onsets: {}, tempo={:.1} BPM", onset_times.len(), tempo_bpm);

    TempoAnalysis { onset_times, tempo_bpm }
}

pub fn detect_onsets(samples: &[f32], sample_rate: u32, config: &TempoConfig) -> Vec<f32> {
    let flux_values = spectral_flux(samples, sample_rate, config);
    pick_onsets(&flux_values, config)
}

/// `(time, flux)` per coarse frame. Buffers shorter than one window have no flux.
fn spectral_flux(samples: &[f32], sample_rate: u32, config: &TempoConfig) -> Vec<(f32, f32)> {
    let extractor = match FrameExtractor::new(samples, sample_rate, config.window_size, config.hop_size) {
        Ok(ex) => ex,
        Err(err) => {
            log::debug!("Skipping onset pass: {}", err);
            return Vec::new();
        }
    };

    let fft_size = extractor.window_size();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let mut prev_magnitudes: Option<Vec<f32>> = None;
    let mut flux_values = Vec::with_capacity(extractor.len());

    for frame in extractor.iter() {
        let mut buffer: Vec<Complex<f32>> = frame
            .samples
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .collect();
        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..fft_size / 2].iter().map(|c| c.norm()).collect();

        // the first frame has nothing to rise from
        let flux = match &prev_magnitudes {
            Some(prev) => magnitudes
                .iter()
                .zip(prev)
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum(),
            None => 0.0,
        };

        flux_values.push((frame.time as f32, flux));
        prev_magnitudes = Some(magnitudes);
    }

    flux_values
}

/// Local flux maxima above `flux_ratio * max(flux)`, at least `min_onset_gap` apart.
fn pick_onsets(flux_values: &[(f32, f32)], config: &TempoConfig) -> Vec<f32> {
    let peak_flux = flux_values.iter().map(|&(_, f)| f).fold(0.0f32, f32::max);
    if peak_flux <= 1e-6 {
        return Vec::new();
    }
    let threshold = peak_flux * config.flux_ratio;

    let mut onsets: Vec<f32> = Vec::new();
    for i in 0..flux_values.len() {
        let (time, flux) = flux_values[i];
        if flux < threshold {
            continue;
        }

        let is_peak = (i == 0 || flux >= flux_values[i - 1].1)
            && (i == flux_values.len() - 1 || flux >= flux_values[i + 1].1);
        let far_enough = onsets
            .last()
            .map_or(true, |&last| time - last >= config.min_onset_gap);

        if is_peak && far_enough {
            onsets.push(time);
        }
    }

    onsets
}

/// Tempo from the densest cluster of plausible inter-onset intervals.
pub fn estimate_tempo(onset_times: &[f32], config: &TempoConfig) -> f32 {
    if onset_times.len() < 3 {
        return config.default_bpm;
    }

    let intervals: Vec<f32> = onset_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| i >= config.min_interval && i <= config.max_interval)
        .collect();

    let Some(interval) = dominant_interval(&intervals, config.cluster_tolerance) else {
        return config.default_bpm;
    };

    (60.0 / interval).max(config.min_bpm).min(config.max_bpm)
}

struct IntervalCluster {
    sum: f32,
    count: usize,
}

impl IntervalCluster {
    fn mean(&self) -> f32 {
        self.sum / self.count as f32
    }
}

/// Greedy clustering: each interval joins the first cluster whose mean is
/// within `tolerance`. Returns the mean of the most populated cluster, the
/// earliest-formed one on ties.
fn dominant_interval(intervals: &[f32], tolerance: f32) -> Option<f32> {
    let mut clusters: Vec<IntervalCluster> = Vec::new();

    for &interval in intervals {
        match clusters
            .iter_mut()
            .find(|c| (c.mean() - interval).abs() <= tolerance)
        {
            Some(cluster) => {
                cluster.sum += interval;
                cluster.count += 1;
            }
            None => clusters.push(IntervalCluster { sum: interval, count: 1 }),
        }
    }

    let mut best: Option<&IntervalCluster> = None;
    for cluster in &clusters {
        if best.map_or(true, |b| cluster.count > b.count) {
            best = Some(cluster);
        }
    }
    best.map(IntervalCluster::mean)
}
