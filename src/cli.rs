use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tonescribe", about = "Transcribe a monophonic recording into a MIDI file")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output MIDI file
    #[arg(short, long, default_value = "output.mid")]
    pub output: PathBuf,

    /// Config file (defaults to tonescribe.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pitch analysis window in samples
    #[arg(long, default_value_t = 2048)]
    pub window: usize,

    /// Hop between pitch frames in samples
    #[arg(long, default_value_t = 512)]
    pub hop: usize,

    /// Lowest detectable fundamental (Hz)
    #[arg(long, default_value_t = 80.0)]
    pub min_freq: f32,

    /// Highest detectable fundamental (Hz)
    #[arg(long, default_value_t = 2000.0)]
    pub max_freq: f32,

    /// YIN threshold (lower = stricter)
    #[arg(long, default_value_t = 0.1)]
    pub threshold: f32,

    /// MIDI time resolution
    #[arg(long, default_value_t = 480)]
    pub ticks_per_quarter: u16,

    /// Snap notes to N steps per beat of the detected tempo (0 = off)
    #[arg(long, default_value_t = 0)]
    pub quantize: u32,

    /// Average all channels instead of taking the first
    #[arg(long)]
    pub downmix: bool,

    /// Skip the note consolidation pass
    #[arg(long)]
    pub no_consolidate: bool,

    /// Write a JSON summary of the transcription
    #[arg(long)]
    pub report: Option<PathBuf>,
}
