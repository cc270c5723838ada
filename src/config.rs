use serde::Deserialize;
use std::path::Path;

use crate::error::{invalid, Result};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub tempo: TempoConfig,
    #[serde(default)]
    pub notes: NoteConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

/// Pitch-frame grid and YIN parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_window")]
    pub window_size: usize,
    #[serde(default = "default_hop")]
    pub hop_size: usize,
    #[serde(default = "default_min_freq")]
    pub min_freq: f32,
    #[serde(default = "default_max_freq")]
    pub max_freq: f32,
    #[serde(default = "default_yin_threshold")]
    pub yin_threshold: f32,
    /// Frames with RMS below this are silent whatever YIN says.
    #[serde(default = "default_amplitude_floor")]
    pub amplitude_floor: f32,
}

/// Onset grid and tempo clustering parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct TempoConfig {
    #[serde(default = "default_window")]
    pub window_size: usize,
    #[serde(default = "default_hop")]
    pub hop_size: usize,
    /// Onset peaks must exceed this fraction of the strongest flux value.
    #[serde(default = "default_flux_ratio")]
    pub flux_ratio: f32,
    #[serde(default = "default_min_onset_gap")]
    pub min_onset_gap: f32,
    #[serde(default = "default_min_interval")]
    pub min_interval: f32,
    #[serde(default = "default_max_interval")]
    pub max_interval: f32,
    #[serde(default = "default_cluster_tolerance")]
    pub cluster_tolerance: f32,
    #[serde(default = "default_min_bpm")]
    pub min_bpm: f32,
    #[serde(default = "default_max_bpm")]
    pub max_bpm: f32,
    #[serde(default = "default_bpm")]
    pub default_bpm: f32,
}

/// Note segmentation knobs.
#[derive(Clone, Debug, Deserialize)]
pub struct NoteConfig {
    /// Semitones a frame may deviate from the running note and still extend it.
    #[serde(default = "default_pitch_tolerance")]
    pub pitch_tolerance: u8,
    /// Seconds of silence allowed inside one note.
    #[serde(default = "default_gap_tolerance")]
    pub gap_tolerance: f64,
    #[serde(default = "default_min_duration")]
    pub min_duration: f64,
    #[serde(default = "default_velocity_scale")]
    pub velocity_scale: f32,
    #[serde(default = "default_velocity_offset")]
    pub velocity_offset: f32,
    #[serde(default = "default_consolidate")]
    pub consolidate: bool,
    /// Grid steps per beat for onset quantization; 0 disables it.
    #[serde(default)]
    pub quantize_subdivisions: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MidiConfig {
    #[serde(default = "default_ticks_per_quarter")]
    pub ticks_per_quarter: u16,
    #[serde(default = "default_release_velocity")]
    pub release_velocity: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: default_window(),
            hop_size: default_hop(),
            min_freq: default_min_freq(),
            max_freq: default_max_freq(),
            yin_threshold: default_yin_threshold(),
            amplitude_floor: default_amplitude_floor(),
        }
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            window_size: default_window(),
            hop_size: default_hop(),
            flux_ratio: default_flux_ratio(),
            min_onset_gap: default_min_onset_gap(),
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
            cluster_tolerance: default_cluster_tolerance(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            default_bpm: default_bpm(),
        }
    }
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            pitch_tolerance: default_pitch_tolerance(),
            gap_tolerance: default_gap_tolerance(),
            min_duration: default_min_duration(),
            velocity_scale: default_velocity_scale(),
            velocity_offset: default_velocity_offset(),
            consolidate: default_consolidate(),
            quantize_subdivisions: 0,
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: default_ticks_per_quarter(),
            release_velocity: default_release_velocity(),
        }
    }
}

fn default_window() -> usize { 2048 }
fn default_hop() -> usize { 512 }
fn default_min_freq() -> f32 { 80.0 }
fn default_max_freq() -> f32 { 2000.0 }
fn default_yin_threshold() -> f32 { 0.1 }
fn default_amplitude_floor() -> f32 { 0.01 }
fn default_flux_ratio() -> f32 { 0.3 }
fn default_min_onset_gap() -> f32 { 0.1 }
fn default_min_interval() -> f32 { 0.2 }
fn default_max_interval() -> f32 { 3.0 }
fn default_cluster_tolerance() -> f32 { 0.1 }
fn default_min_bpm() -> f32 { 60.0 }
fn default_max_bpm() -> f32 { 180.0 }
fn default_bpm() -> f32 { 120.0 }
fn default_pitch_tolerance() -> u8 { 0 }
fn default_gap_tolerance() -> f64 { 0.06 }
fn default_min_duration() -> f64 { 0.08 }
fn default_velocity_scale() -> f32 { 300.0 }
fn default_velocity_offset() -> f32 { 20.0 }
fn default_consolidate() -> bool { true }
fn default_ticks_per_quarter() -> u16 { 480 }
fn default_release_velocity() -> u8 { 64 }

impl Config {
    /// Rejects settings the analysis passes cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.tempo.validate()?;
        self.notes.validate()
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<()> {
        if !(self.min_freq.is_finite() && self.min_freq > 0.0) {
            return Err(invalid(format!("analysis.min_freq must be positive, got {}", self.min_freq)));
        }
        if !(self.max_freq.is_finite() && self.max_freq > self.min_freq) {
            return Err(invalid(format!(
                "analysis.max_freq ({}) must exceed min_freq ({})",
                self.max_freq, self.min_freq
            )));
        }
        non_negative("analysis.yin_threshold", self.yin_threshold as f64)?;
        non_negative("analysis.amplitude_floor", self.amplitude_floor as f64)
    }
}

impl TempoConfig {
    fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(invalid(format!(
                "tempo window {} / hop {} is not a usable frame grid",
                self.window_size, self.hop_size
            )));
        }
        if !(self.min_bpm.is_finite() && self.min_bpm > 0.0) {
            return Err(invalid(format!("tempo.min_bpm must be positive, got {}", self.min_bpm)));
        }
        if !(self.max_bpm.is_finite() && self.max_bpm >= self.min_bpm) {
            return Err(invalid(format!(
                "tempo.max_bpm ({}) is below min_bpm ({})",
                self.max_bpm, self.min_bpm
            )));
        }
        if !(self.default_bpm.is_finite() && self.default_bpm > 0.0) {
            return Err(invalid(format!("tempo.default_bpm must be positive, got {}", self.default_bpm)));
        }
        non_negative("tempo.flux_ratio", self.flux_ratio as f64)?;
        non_negative("tempo.min_onset_gap", self.min_onset_gap as f64)?;
        non_negative("tempo.cluster_tolerance", self.cluster_tolerance as f64)?;
        non_negative("tempo.min_interval", self.min_interval as f64)?;
        if !(self.max_interval.is_finite() && self.max_interval >= self.min_interval) {
            return Err(invalid(format!(
                "tempo.max_interval ({}) is below min_interval ({})",
                self.max_interval, self.min_interval
            )));
        }
        Ok(())
    }
}

impl NoteConfig {
    fn validate(&self) -> Result<()> {
        non_negative("notes.gap_tolerance", self.gap_tolerance)?;
        non_negative("notes.min_duration", self.min_duration)?;
        non_negative("notes.velocity_scale", self.velocity_scale as f64)?;
        if !self.velocity_offset.is_finite() {
            return Err(invalid("notes.velocity_offset must be finite"));
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be a non-negative number, got {value}")))
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::debug!("Config parse error in {}: {}", path.display(), err);
            None
        }
    }
}
