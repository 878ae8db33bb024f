//! Match event output formatting

use olaf_core::MatchEvent;
use serde::Serialize;
use std::collections::HashMap;

/// JSON results document for one monitored query
#[derive(Serialize)]
pub struct MonitorOutput<'a> {
    pub query_path: String,
    pub detections: usize,
    pub results: Vec<NamedEvent<'a>>,
}

/// A match event annotated with the reference name behind the audio id
#[derive(Serialize)]
pub struct NamedEvent<'a> {
    pub reference: Option<&'a str>,
    #[serde(flatten)]
    pub event: MatchEvent,
}

/// CSV header matching the engine's canonical report shape
pub fn print_csv_header() {
    println!("match count (#), q start (s), q stop (s), ref name, ref ID, ref start (s), ref stop (s)");
}

/// One CSV row per event
pub fn print_csv_event(event: &MatchEvent, names: &HashMap<u32, String>) {
    let name = names
        .get(&event.audio_id)
        .map(String::as_str)
        .unwrap_or("");
    println!(
        "{}, {:.2}, {:.2}, {}, {}, {:.2}, {:.2}",
        event.match_count,
        event.query_start,
        event.query_stop,
        name,
        event.audio_id,
        event.reference_start,
        event.reference_stop
    );
}

/// Dump all collected events as one JSON document. Heartbeat ticks are
/// dropped; real detections keep their reference names.
pub fn print_json_results(query_path: &str, events: &[MatchEvent], names: &HashMap<u32, String>) {
    let results: Vec<NamedEvent> = events
        .iter()
        .filter(|event| event.match_count > 0)
        .map(|&event| NamedEvent {
            reference: names.get(&event.audio_id).map(String::as_str),
            event,
        })
        .collect();

    let output = MonitorOutput {
        query_path: query_path.to_string(),
        detections: results.len(),
        results,
    };

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results: {}", e),
    }
}
