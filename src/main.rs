mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use cli::Cli;
use tonescribe::config::{self, Config};
use tonescribe::encode::report::write_report;
use tonescribe::notes::note_name;
use tonescribe::{decode_audio, ChannelMode, ConversionJob};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    let config = resolve_config(&cli);

    log::info!("tonescribe - monophonic audio to MIDI");
    log::info!("Input: {}", cli.input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!(
        "Window: {} / hop {}, range {:.0}-{:.0} Hz",
        config.analysis.window_size,
        config.analysis.hop_size,
        config.analysis.min_freq,
        config.analysis.max_freq
    );

    // 1. Decode audio
    log::info!("Decoding audio...");
    let mode = if cli.downmix { ChannelMode::Downmix } else { ChannelMode::First };
    let audio = decode_audio(&cli.input, mode)?;

    // 2. Analyze and encode on a worker
    let job = ConversionJob::spawn(audio, config)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .unwrap()
            .progress_chars("=>-"),
    );
    for update in job.progress().iter() {
        pb.set_length(update.total as u64);
        pb.set_position(update.done as u64);
    }
    pb.finish_with_message("Analysis complete");

    let conversion = job.wait()?;
    let transcription = &conversion.transcription;

    // 3. Write outputs
    std::fs::write(&cli.output, &conversion.midi)
        .with_context(|| format!("Failed to write MIDI file: {}", cli.output.display()))?;

    if let Some(ref report_path) = cli.report {
        write_report(&conversion, report_path)?;
    }

    if transcription.notes.is_empty() {
        log::warn!("No pitched content detected; wrote an empty track");
    } else {
        let lowest = transcription.notes.iter().map(|n| n.pitch).min().unwrap_or_default();
        let highest = transcription.notes.iter().map(|n| n.pitch).max().unwrap_or_default();
        log::info!(
            "{} notes, range {}-{}, tempo {:.1} BPM",
            transcription.notes.len(),
            note_name(lowest),
            note_name(highest),
            transcription.tempo.tempo_bpm
        );
    }

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

/// Config file values apply only where the CLI flag is still at its default.
fn resolve_config(cli: &Cli) -> Config {
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("tonescribe.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("tonescribe").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("tonescribe").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut cfg = Config::default();
    if let Some(ref path) = config_path {
        if let Some(loaded) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    if cli.window != 2048 { cfg.analysis.window_size = cli.window; }
    if cli.hop != 512 { cfg.analysis.hop_size = cli.hop; }
    if cli.min_freq != 80.0 { cfg.analysis.min_freq = cli.min_freq; }
    if cli.max_freq != 2000.0 { cfg.analysis.max_freq = cli.max_freq; }
    if cli.threshold != 0.1 { cfg.analysis.yin_threshold = cli.threshold; }
    if cli.ticks_per_quarter != 480 { cfg.midi.ticks_per_quarter = cli.ticks_per_quarter; }
    if cli.quantize != 0 { cfg.notes.quantize_subdivisions = cli.quantize; }
    if cli.no_consolidate { cfg.notes.consolidate = false; }

    cfg
}
