//! Tests for the vote accumulator

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::*;
use crate::config::OlafConfig;
use crate::db::pack_entry;
use crate::fingerprint::Fingerprint;

fn collecting_callback() -> (Rc<RefCell<Vec<MatchEvent>>>, MatchCallback) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let callback: MatchCallback = Box::new(move |event| sink.borrow_mut().push(event));
    (events, callback)
}

fn pair_fingerprint(t1: i32, f1: i32, t2: i32, f2: i32) -> Fingerprint {
    Fingerprint {
        time_index1: t1,
        frequency_bin1: f1,
        magnitude1: 1.0,
        time_index2: t2,
        frequency_bin2: f2,
        magnitude2: 1.0,
        time_index3: t2,
        frequency_bin3: f2,
        magnitude3: 1.0,
    }
}

fn buffer_of(fingerprints: Vec<Fingerprint>) -> ExtractedFingerprints {
    let fingerprint_index = fingerprints.len();
    ExtractedFingerprints {
        fingerprints,
        fingerprint_index,
    }
}

/// A database holding the given fingerprints of a single reference item,
/// timestamped at their own t1.
fn db_of(audio_id: u32, fingerprints: &[Fingerprint]) -> Db {
    let mut packed: Vec<u64> = fingerprints
        .iter()
        .map(|fp| pack_entry(fp.calculate_hash(), fp.time_index1 as u32))
        .collect();
    packed.sort_unstable();
    let mut db = Db::new();
    db.register_audio(audio_id, Arc::from(packed));
    db
}

#[test]
fn votes_accumulate_per_alignment() {
    let config = OlafConfig::memory();
    let (_, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let reference: Vec<Fingerprint> = (0..6)
        .map(|i| pair_fingerprint(40 + i * 10, 40 + 4 * i, 45 + i * 10, 80 + 12 * i))
        .collect();
    let db = db_of(3, &reference);

    let mut query = buffer_of(reference.clone());
    matcher.match_fingerprints(&mut query, &db);

    // All six fingerprints agree on offset zero for audio 3.
    assert_eq!(matcher.vote_count(), 1);
    assert_eq!(query.fingerprint_index, 0, "buffer drains after matching");
}

#[test]
fn report_requires_minimum_count() {
    let config = OlafConfig {
        min_match_count: 4,
        min_match_time_diff: 0.0,
        ..OlafConfig::memory()
    };
    let (events, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let reference: Vec<Fingerprint> = (0..3)
        .map(|i| pair_fingerprint(40 + i * 10, 40 + 4 * i, 45 + i * 10, 80 + 12 * i))
        .collect();
    let db = db_of(3, &reference);

    let mut query = buffer_of(reference.clone());
    matcher.match_fingerprints(&mut query, &db);
    matcher.report();

    // Three votes < four required: heartbeat only.
    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].match_count, 0);
    assert_eq!(events[0].audio_id, 0);
}

#[test]
fn report_emits_matches_in_descending_count_order() {
    let config = OlafConfig {
        min_match_count: 2,
        min_match_time_diff: 0.0,
        ..OlafConfig::memory()
    };
    let (events, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let strong: Vec<Fingerprint> = (0..5)
        .map(|i| pair_fingerprint(40 + i * 10, 40 + 4 * i, 45 + i * 10, 80 + 12 * i))
        .collect();
    let weak: Vec<Fingerprint> = (0..2)
        .map(|i| pair_fingerprint(200 + i * 8, 140 + 3 * i, 210 + i * 8, 200 + 5 * i))
        .collect();

    let mut db = Db::new();
    let pack = |fps: &[Fingerprint]| -> Arc<[u64]> {
        let mut packed: Vec<u64> = fps
            .iter()
            .map(|fp| pack_entry(fp.calculate_hash(), fp.time_index1 as u32))
            .collect();
        packed.sort_unstable();
        Arc::from(packed)
    };
    db.register_audio(1, pack(&strong));
    db.register_audio(2, pack(&weak));

    let mut query = buffer_of(strong.iter().chain(weak.iter()).copied().collect());
    matcher.match_fingerprints(&mut query, &db);
    matcher.report();

    let events = events.borrow();
    assert!(events.len() >= 2);
    assert_eq!(events[0].audio_id, 1);
    assert_eq!(events[0].match_count, 5);
    assert!(events
        .windows(2)
        .all(|w| w[0].match_count >= w[1].match_count));
}

#[test]
fn minimum_reference_span_filters_results() {
    // All matching fingerprints share one t1: zero reference span.
    let config = OlafConfig {
        min_match_count: 2,
        min_match_time_diff: 1.0,
        ..OlafConfig::memory()
    };
    let (events, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let fp = pair_fingerprint(40, 40, 45, 80);
    let db = db_of(1, &[fp]);

    let mut query = buffer_of(vec![fp, fp, fp]);
    matcher.match_fingerprints(&mut query, &db);
    matcher.report();

    // The vote passes the count floor, so no heartbeat, but the span filter
    // suppresses the event.
    assert!(events.borrow().is_empty());
}

#[test]
fn reported_times_reflect_query_offset() {
    let config = OlafConfig {
        min_match_count: 2,
        min_match_time_diff: 0.0,
        ..OlafConfig::memory()
    };
    let (events, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let reference: Vec<Fingerprint> = (0..4)
        .map(|i| pair_fingerprint(40 + i * 10, 40 + 4 * i, 45 + i * 10, 80 + 12 * i))
        .collect();
    let db = db_of(9, &reference);

    // Query is the same material 100 blocks later.
    let offset = 100;
    let query_fps: Vec<Fingerprint> = reference
        .iter()
        .map(|fp| {
            let mut shifted = *fp;
            shifted.time_index1 += offset;
            shifted.time_index2 += offset;
            shifted.time_index3 += offset;
            shifted
        })
        .collect();

    let mut query = buffer_of(query_fps);
    matcher.match_fingerprints(&mut query, &db);
    matcher.report();

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    let event = events[0];
    let seconds_per_block = config.seconds_per_block();

    assert_eq!(event.audio_id, 9);
    assert_eq!(event.match_count, 4);
    assert!((event.reference_start - 40.0 * seconds_per_block).abs() < 1e-4);
    assert!((event.reference_stop - 70.0 * seconds_per_block).abs() < 1e-4);
    let delta = event.query_start - event.reference_start;
    assert!((delta - offset as f32 * seconds_per_block).abs() < 1e-3);
}

#[test]
fn old_votes_age_out() {
    let config = OlafConfig {
        keep_matches_for: 1.0,
        print_result_every: 0.0,
        ..OlafConfig::esp32()
    };
    let (_, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let early = pair_fingerprint(40, 40, 45, 80);
    let db = db_of(1, &[early]);

    let mut query = buffer_of(vec![early]);
    matcher.match_fingerprints(&mut query, &db);
    assert_eq!(matcher.vote_count(), 1);

    // A much later fingerprint that matches nothing still advances time,
    // pushing the earlier vote past keep_matches_for.
    let late = pair_fingerprint(400, 200, 410, 300);
    let mut query = buffer_of(vec![late]);
    matcher.match_fingerprints(&mut query, &db);
    assert_eq!(matcher.vote_count(), 0);
}

#[test]
fn top_k_keeps_the_largest_counts() {
    let config = OlafConfig {
        max_results: 2,
        min_match_count: 1,
        min_match_time_diff: 0.0,
        ..OlafConfig::memory()
    };
    let (events, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    // Three alignments with distinct counts: repeat each query fingerprint a
    // different number of times against a single-entry reference.
    let a = pair_fingerprint(40, 40, 45, 80);
    let b = pair_fingerprint(80, 100, 90, 140);
    let c = pair_fingerprint(120, 180, 130, 240);
    let mut db = Db::new();
    for (id, fp) in [(1u32, a), (2, b), (3, c)] {
        let packed: Vec<u64> = vec![pack_entry(fp.calculate_hash(), fp.time_index1 as u32)];
        db.register_audio(id, Arc::from(packed));
    }

    let mut query = buffer_of(vec![a, b, b, c, c, c]);
    matcher.match_fingerprints(&mut query, &db);
    matcher.report();

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].audio_id, 3);
    assert_eq!(events[0].match_count, 3);
    assert_eq!(events[1].audio_id, 2);
    assert_eq!(events[1].match_count, 2);
}

#[test]
fn search_range_tolerates_nearby_hashes() {
    let config = OlafConfig {
        search_range: 5,
        min_match_count: 1,
        min_match_time_diff: 0.0,
        ..OlafConfig::memory()
    };
    let (_, callback) = collecting_callback();
    let mut matcher = FpMatcher::new(&config, callback);

    let fp = pair_fingerprint(40, 40, 45, 80);
    // Store the hash perturbed by +3, inside the search range.
    let packed: Vec<u64> = vec![pack_entry(fp.calculate_hash() + 3, fp.time_index1 as u32)];
    let mut db = Db::new();
    db.register_audio(1, Arc::from(packed));

    let mut query = buffer_of(vec![fp]);
    matcher.match_fingerprints(&mut query, &db);
    assert_eq!(matcher.vote_count(), 1);
}
