//! Vote accumulation and match reporting
//!
//! Every fingerprint is looked up in the database with a tolerant hash
//! range. Each returned reference timestamp votes for an alignment keyed by
//! the quantized time offset and the audio id; alignments gathering enough
//! votes are reported through the callback in descending count order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::OlafConfig;
use crate::db::Db;
use crate::fingerprint::ExtractedFingerprints;

#[cfg(test)]
mod tests;

/// A reported match, passed by value to the callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Votes behind this alignment; 0 for a heartbeat tick.
    pub match_count: i32,
    /// Matched span in the query stream, seconds.
    pub query_start: f32,
    pub query_stop: f32,
    /// Identifier of the matched reference item.
    pub audio_id: u32,
    /// Matched span in the reference item, seconds.
    pub reference_start: f32,
    pub reference_stop: f32,
}

/// Callback invoked synchronously for each reported match. It must not feed
/// audio back into the recognizer.
pub type MatchCallback = Box<dyn FnMut(MatchEvent)>;

/// Accumulated evidence for one `(quantized offset, audio id)` alignment.
#[derive(Debug, Clone, Copy)]
struct MatchResult {
    reference_fingerprint_t1: i32,
    query_fingerprint_t1: i32,
    first_reference_fingerprint_t1: i32,
    last_reference_fingerprint_t1: i32,
    match_count: i32,
    match_identifier: u32,
}

/// Matches extracted fingerprints against a database.
pub struct FpMatcher {
    config: OlafConfig,
    votes: HashMap<u64, MatchResult>,
    db_results: Vec<u64>,
    callback: MatchCallback,
    last_print_at: i32,
}

impl FpMatcher {
    pub fn new(config: &OlafConfig, callback: MatchCallback) -> Self {
        Self {
            config: config.clone(),
            votes: HashMap::new(),
            db_results: Vec::with_capacity(config.max_db_collisions),
            callback,
            last_print_at: 0,
        }
    }

    /// Match and drain the fingerprint buffer, then run the reporting and
    /// aging ticks against the time of the newest fingerprint.
    pub fn match_fingerprints(&mut self, fingerprints: &mut ExtractedFingerprints, db: &Db) {
        for fingerprint in &fingerprints.fingerprints[..fingerprints.fingerprint_index] {
            let hash = fingerprint.calculate_hash();
            self.match_single_fingerprint(fingerprint.time_index1, hash, db);
        }

        if fingerprints.fingerprint_index > 0 {
            let current_query_time =
                fingerprints.fingerprints[fingerprints.fingerprint_index - 1].time_index3;

            if self.config.print_result_every != 0.0 {
                let print_every = self.config.seconds_to_blocks(self.config.print_result_every);
                if current_query_time - self.last_print_at > print_every {
                    self.report();
                    self.last_print_at = current_query_time;
                }
            }

            if self.config.keep_matches_for != 0.0 {
                self.remove_old_matches(current_query_time);
            }
        }

        fingerprints.fingerprint_index = 0;
    }

    fn match_single_fingerprint(&mut self, query_fingerprint_t1: i32, hash: u64, db: &Db) {
        let range = self.config.search_range;
        let number_of_results = db.find(
            hash.saturating_sub(range),
            hash + range,
            &mut self.db_results,
            self.config.max_db_collisions,
        );

        log::trace!(
            "fp hash {} at q t1 {}: {} db results (cap {})",
            hash,
            query_fingerprint_t1,
            number_of_results,
            self.config.max_db_collisions
        );

        if number_of_results >= self.config.max_db_collisions {
            log::warn!(
                "hash {} hit the collision cap {} (search range {})",
                hash,
                self.config.max_db_collisions,
                range
            );
        }

        for i in 0..number_of_results {
            let db_result = self.db_results[i];
            let reference_fingerprint_t1 = (db_result >> 32) as i32;
            let match_identifier = db_result as u32;
            self.tally(query_fingerprint_t1, reference_fingerprint_t1, match_identifier);
        }
    }

    fn tally(
        &mut self,
        query_fingerprint_t1: i32,
        reference_fingerprint_t1: i32,
        match_identifier: u32,
    ) {
        // Quantize the offset to absorb small drift; sign is preserved
        // through the key's high word.
        let time_diff = (query_fingerprint_t1 - reference_fingerprint_t1) >> 2;
        let key = ((time_diff as i64 as u64) << 32) | match_identifier as u64;

        self.votes
            .entry(key)
            .and_modify(|vote| {
                vote.reference_fingerprint_t1 = reference_fingerprint_t1;
                vote.query_fingerprint_t1 = query_fingerprint_t1;
                vote.match_count += 1;
                vote.first_reference_fingerprint_t1 = vote
                    .first_reference_fingerprint_t1
                    .min(reference_fingerprint_t1);
                vote.last_reference_fingerprint_t1 = vote
                    .last_reference_fingerprint_t1
                    .max(reference_fingerprint_t1);
            })
            .or_insert(MatchResult {
                reference_fingerprint_t1,
                query_fingerprint_t1,
                first_reference_fingerprint_t1: reference_fingerprint_t1,
                last_reference_fingerprint_t1: reference_fingerprint_t1,
                match_count: 1,
                match_identifier,
            });
    }

    fn remove_old_matches(&mut self, current_query_time: i32) {
        let max_age = self.config.seconds_to_blocks(self.config.keep_matches_for);
        self.votes
            .retain(|_, vote| current_query_time - vote.query_fingerprint_t1 <= max_age);
    }

    /// Select the top-K votes above the count floor and emit them through
    /// the callback, best first. An empty selection emits one zero-valued
    /// heartbeat event.
    pub fn report(&mut self) {
        let mut selected: Vec<MatchResult> = Vec::with_capacity(self.config.max_results);

        for vote in self.votes.values() {
            if vote.match_count < self.config.min_match_count {
                continue;
            }
            if selected.len() >= self.config.max_results {
                // Partial selection: keep the list count-sorted and replace
                // the tail only on a strictly larger count.
                selected.sort_by(|a, b| b.match_count.cmp(&a.match_count));
                if let Some(least) = selected.last_mut() {
                    if vote.match_count > least.match_count {
                        *least = *vote;
                    }
                }
            } else {
                selected.push(*vote);
            }
        }

        selected.sort_by(|a, b| b.match_count.cmp(&a.match_count));

        if selected.is_empty() {
            (self.callback)(MatchEvent {
                match_count: 0,
                query_start: 0.0,
                query_stop: 0.0,
                audio_id: 0,
                reference_start: 0.0,
                reference_stop: 0.0,
            });
            return;
        }

        let seconds_per_block = self.config.seconds_per_block();
        for vote in &selected {
            let time_delta = seconds_per_block
                * (vote.query_fingerprint_t1 - vote.reference_fingerprint_t1) as f32;
            let reference_start = vote.first_reference_fingerprint_t1 as f32 * seconds_per_block;
            let reference_stop = vote.last_reference_fingerprint_t1 as f32 * seconds_per_block;

            if reference_stop - reference_start >= self.config.min_match_time_diff {
                (self.callback)(MatchEvent {
                    match_count: vote.match_count,
                    query_start: reference_start + time_delta,
                    query_stop: reference_stop + time_delta,
                    audio_id: vote.match_identifier,
                    reference_start,
                    reference_stop,
                });
            }
        }
    }

    /// Number of live vote entries.
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }
}
