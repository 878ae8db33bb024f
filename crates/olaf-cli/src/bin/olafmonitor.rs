//! olafmonitor - Stream a query recording against a reference database
//!
//! Loads every .ofp table in a directory, registers them with a recognizer
//! and feeds the query audio through it block by block, reporting matches
//! as they accumulate.
//!
//! Usage: olafmonitor <db_dir> <query_audio>

use anyhow::Result;
use clap::Parser;
use olaf_cli::audio::decode_to_pcm16;
use olaf_cli::output::{print_csv_event, print_csv_header, print_json_results};
use olaf_core::{MatchEvent, OlafConfig, Recognizer};
use olaf_fp::{OfpFile, OfpReader};
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "olafmonitor")]
#[command(about = "Monitor an audio stream for matches against .ofp reference tables", long_about = None)]
struct Args {
    /// Database directory containing .ofp files
    db_dir: String,

    /// Query audio file (wav, flac or ogg)
    query_audio: String,

    /// Configuration preset: default, esp32 or memory
    #[arg(short, long, default_value = "esp32")]
    preset: String,

    /// Emit one JSON document instead of CSV rows
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = match args.preset.as_str() {
        "default" => OlafConfig::default(),
        "esp32" => OlafConfig::esp32(),
        "memory" => OlafConfig::memory(),
        other => anyhow::bail!("Unknown preset '{}' (default, esp32, memory)", other),
    };

    run_monitor(&args.db_dir, &args.query_audio, &config, args.json)
}

fn run_monitor(db_dir: &str, query_audio: &str, config: &OlafConfig, json: bool) -> Result<()> {
    let db_path = Path::new(db_dir);
    let query_path = Path::new(query_audio);

    if !db_path.exists() {
        anyhow::bail!("Database directory not found: {}", db_path.display());
    }
    if !query_path.exists() {
        anyhow::bail!("Query file not found: {}", query_path.display());
    }

    let ofp_paths: Vec<PathBuf> = std::fs::read_dir(db_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("ofp"))
        .collect();

    log::info!("Found {} .ofp files, loading in parallel...", ofp_paths.len());

    let load_start = std::time::Instant::now();
    let loaded: Vec<(String, OfpFile)> = ofp_paths
        .par_iter()
        .filter_map(|path| match OfpReader::read(path) {
            Ok(ofp_file) => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                Some((name, ofp_file))
            }
            Err(e) => {
                log::warn!("Failed to load {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    log::info!(
        "Loaded {} tables in {:.2}s",
        loaded.len(),
        load_start.elapsed().as_secs_f64()
    );

    let mut names: HashMap<u32, String> = HashMap::new();

    let events: Rc<RefCell<Vec<MatchEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let mut recognizer = Recognizer::new(
        config.clone(),
        Box::new(move |event| sink.borrow_mut().push(event)),
    )?;

    for (name, ofp_file) in loaded {
        names.insert(ofp_file.header.audio_id, name);
        recognizer.register_audio(ofp_file.header.audio_id, Arc::from(ofp_file.entries));
    }

    let (pcm, duration_ms) = decode_to_pcm16(query_path, config.audio_sample_rate)?;
    log::info!(
        "Streaming query: {:.1}s of audio",
        duration_ms as f64 / 1000.0
    );

    if !json {
        print_csv_header();
    }

    let mut printed = 0;
    for block in pcm.chunks_exact(config.audio_block_size) {
        recognizer.process_audio(block);

        if !json {
            let events = events.borrow();
            for event in &events[printed..] {
                print_csv_event(event, &names);
            }
            printed = events.len();
        }
    }

    if json {
        print_json_results(
            query_path.to_str().unwrap_or_default(),
            &events.borrow(),
            &names,
        );
    }

    Ok(())
}
