use serde::Serialize;

/// Per-frame pitch pass output, in frame order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PitchFrame {
    /// Frame start in seconds
    pub time: f64,
    /// Fundamental in Hz; `None` for unpitched or below-floor frames
    pub frequency: Option<f32>,
    /// RMS of the tapered frame (loudness proxy)
    pub amplitude: f32,
}

/// Whole-buffer onset pass output.
#[derive(Clone, Debug, Serialize)]
pub struct TempoAnalysis {
    pub onset_times: Vec<f32>,
    pub tempo_bpm: f32,
}
