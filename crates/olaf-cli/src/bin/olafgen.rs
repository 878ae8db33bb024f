//! olafgen - Reference table generator
//!
//! Usage: olafgen <input_audio_path> <output_dir>

use anyhow::{Context, Result};
use clap::Parser;
use olaf_cli::audio::decode_to_pcm16;
use olaf_core::{build_reference, jenkins_hash, OlafConfig};
use olaf_fp::{OfpFile, OfpHeader, OfpMetadata, OfpWriter};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "olafgen")]
#[command(about = "Generate an Olaf reference table (.ofp) from an audio file", long_about = None)]
struct Args {
    /// Input audio file (wav, flac or ogg)
    input_audio_path: String,

    /// Output directory for the .ofp file
    output_dir: String,

    /// Audio id to register the table under; defaults to a hash of the
    /// file stem
    #[arg(long)]
    id: Option<u32>,

    /// Configuration preset: default, esp32 or memory
    #[arg(short, long, default_value = "esp32")]
    preset: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default: no logs (clean JSON output for parsing)
    let level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = preset(&args.preset)?;
    run_olafgen(&args.input_audio_path, &args.output_dir, args.id, &config)
}

fn preset(name: &str) -> Result<OlafConfig> {
    match name {
        "default" => Ok(OlafConfig::default()),
        "esp32" => Ok(OlafConfig::esp32()),
        "memory" => Ok(OlafConfig::memory()),
        other => anyhow::bail!("Unknown preset '{}' (default, esp32, memory)", other),
    }
}

fn run_olafgen(
    input_path: &str,
    output_dir: &str,
    id: Option<u32>,
    config: &OlafConfig,
) -> Result<()> {
    let input_path = Path::new(input_path);
    let output_dir = Path::new(output_dir);

    if !input_path.exists() {
        anyhow::bail!("Input file not found: {}", input_path.display());
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let filename = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("Input path has no usable file name")?
        .to_string();
    let audio_id = id.unwrap_or_else(|| jenkins_hash(&filename));

    log::info!("Processing: {}", input_path.display());

    let start = std::time::Instant::now();
    let (pcm, duration_ms) = decode_to_pcm16(input_path, config.audio_sample_rate)?;
    log::info!(
        "Decoded audio: {:.1}s duration, {} samples @ {}Hz",
        duration_ms as f64 / 1000.0,
        pcm.len(),
        config.audio_sample_rate
    );

    let entries = build_reference(&pcm, config)?;
    let elapsed = start.elapsed();
    log::info!(
        "Extracted {} packed entries in {:.2}s",
        entries.len(),
        elapsed.as_secs_f64()
    );

    let output_path = output_dir.join(format!("{}.ofp", filename));
    let ofp_file = OfpFile {
        header: OfpHeader::new(
            audio_id,
            entries.len() as u32,
            config.audio_sample_rate,
            config.audio_block_size as u16,
            config.audio_step_size as u16,
            duration_ms,
        ),
        metadata: OfpMetadata {
            algorithm_id: "OLAF".to_string(),
            algorithm_params: serde_json::to_string(config)?,
            original_filename: filename,
        },
        entries,
    };
    OfpWriter::write(&output_path, &ofp_file)?;

    let result = serde_json::json!({
        "status": "success",
        "input_file": input_path.display().to_string(),
        "output_file": output_path.display().to_string(),
        "audio_id": audio_id,
        "num_entries": ofp_file.entries.len(),
        "processing_time_seconds": elapsed.as_secs_f64(),
    });
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
