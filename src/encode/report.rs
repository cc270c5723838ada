use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::notes::{note_name, NoteEvent};
use crate::pipeline::Conversion;

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub sample_rate: u32,
    pub duration: f64,
    pub tempo_bpm: f32,
    pub onset_count: usize,
    pub midi_bytes: usize,
    pub notes: Vec<ReportNote<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ReportNote<'a> {
    pub name: String,
    #[serde(flatten)]
    pub note: &'a NoteEvent,
}

impl<'a> Report<'a> {
    pub fn new(conversion: &'a Conversion) -> Self {
        let analysis = &conversion.transcription;
        Self {
            sample_rate: analysis.sample_rate,
            duration: analysis.duration,
            tempo_bpm: analysis.tempo.tempo_bpm,
            onset_count: analysis.tempo.onset_times.len(),
            midi_bytes: conversion.midi.len(),
            notes: analysis
                .notes
                .iter()
                .map(|note| ReportNote {
                    name: note_name(note.pitch),
                    note,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }
}

pub fn write_report(conversion: &Conversion, path: &Path) -> Result<()> {
    let json = Report::new(conversion).to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::Transcription;
    use crate::audio::features::TempoAnalysis;

    #[test]
    fn report_lists_named_notes() {
        let conversion = Conversion {
            transcription: Transcription {
                sample_rate: 44100,
                duration: 2.0,
                frame_count: 10,
                notes: vec![NoteEvent {
                    onset_time: 0.5,
                    pitch: 69,
                    duration: 1.0,
                    velocity: 90,
                }],
                tempo: TempoAnalysis {
                    onset_times: vec![0.5],
                    tempo_bpm: 120.0,
                },
            },
            midi: vec![0; 34],
        };

        let json = Report::new(&conversion).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tempo_bpm"], 120.0);
        assert_eq!(value["midi_bytes"], 34);
        assert_eq!(value["notes"][0]["name"], "A4");
        assert_eq!(value["notes"][0]["pitch"], 69);
        assert_eq!(value["notes"][0]["velocity"], 90);
    }
}
