//! Streaming recognizer
//!
//! Owns the whole pipeline and drives it one block at a time: PCM to
//! windowed spectrum, event point extraction, fingerprint construction and
//! matching. A single thread calls [`Recognizer::process_audio`] serially;
//! the match callback runs inline on the same call stack.

use std::sync::Arc;

use anyhow::Result;

use crate::config::OlafConfig;
use crate::db::Db;
use crate::eventpoint::EventPointExtractor;
use crate::fingerprint::FingerprintExtractor;
use crate::matching::{FpMatcher, MatchCallback};
use crate::transform::BlockTransform;

pub struct Recognizer {
    config: OlafConfig,
    transform: BlockTransform,
    db: Db,
    ep_extractor: EventPointExtractor,
    fp_extractor: FingerprintExtractor,
    fp_matcher: FpMatcher,
    audio_block_index: i32,
}

impl Recognizer {
    /// Build a recognizer for the given configuration. Refuses
    /// configurations the pipeline cannot honor.
    pub fn new(config: OlafConfig, callback: MatchCallback) -> Result<Self> {
        config.validate()?;
        if config.audio_block_size != 1024 {
            // The perceptual max filter tables cover 512 spectrum bins.
            anyhow::bail!(
                "streaming recognition requires a block size of 1024, got {}",
                config.audio_block_size
            );
        }

        Ok(Self {
            transform: BlockTransform::new(config.audio_block_size),
            db: Db::new(),
            ep_extractor: EventPointExtractor::new(&config),
            fp_extractor: FingerprintExtractor::new(&config),
            fp_matcher: FpMatcher::new(&config, callback),
            audio_block_index: 0,
            config,
        })
    }

    /// Register a reference item's sorted packed fingerprint table.
    pub fn register_audio(&mut self, audio_id: u32, fingerprints: Arc<[u64]>) {
        self.db.register_audio(audio_id, fingerprints);
    }

    /// Drop a registered reference item.
    pub fn delete_audio(&mut self, audio_id: u32) {
        self.db.delete_audio(audio_id);
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn config(&self) -> &OlafConfig {
        &self.config
    }

    /// Blocks processed so far.
    pub fn audio_block_index(&self) -> i32 {
        self.audio_block_index
    }

    /// Process exactly one block of mono 16-bit PCM. Matches, when found,
    /// are reported through the callback before this returns.
    pub fn process_audio(&mut self, block: &[i16]) {
        assert_eq!(
            block.len(),
            self.config.audio_block_size,
            "process_audio expects exactly one audio block"
        );

        let fft_out = self.transform.process(block);
        self.ep_extractor.extract(fft_out, self.audio_block_index);

        if self.ep_extractor.event_points().event_point_index > self.config.event_point_threshold {
            self.fp_extractor
                .extract(self.ep_extractor.event_points_mut(), self.audio_block_index);

            if self.fp_extractor.fingerprints().fingerprint_index > 0 {
                self.fp_matcher
                    .match_fingerprints(self.fp_extractor.fingerprints_mut(), &self.db);
            }
            self.fp_extractor.fingerprints_mut().fingerprint_index = 0;
        }

        self.audio_block_index += 1;
    }
}
