//! Olaf Core - Acoustic Fingerprinting Engine
//!
//! A streaming acoustic fingerprint recognizer for resource-constrained
//! targets: spectral peak extraction over a rolling history, combinatorial
//! 48-bit fingerprint hashes, a compact sorted in-memory index and an
//! incremental vote accumulator reporting matches with time offsets.

pub mod config;
pub mod db;
pub mod eventpoint;
pub mod fingerprint;
pub mod matching;
pub mod max_filter;
pub mod recognizer;
pub mod transform;

pub use config::OlafConfig;
pub use db::{jenkins_hash, pack_entry, unpack_entry, Db};
pub use eventpoint::{EventPoint, EventPointExtractor};
pub use fingerprint::{Fingerprint, FingerprintExtractor};
pub use matching::{FpMatcher, MatchCallback, MatchEvent};
pub use recognizer::Recognizer;

use transform::BlockTransform;

/// Run the extraction pipeline offline over a full recording and collect
/// every fingerprint in emission order. Samples are consumed in consecutive
/// whole blocks; a trailing partial block is ignored.
pub fn extract_fingerprints(
    samples: &[i16],
    config: &OlafConfig,
) -> anyhow::Result<Vec<Fingerprint>> {
    config.validate()?;
    if config.audio_block_size != 1024 {
        anyhow::bail!(
            "fingerprint extraction requires a block size of 1024, got {}",
            config.audio_block_size
        );
    }

    let mut transform = BlockTransform::new(config.audio_block_size);
    let mut ep_extractor = EventPointExtractor::new(config);
    let mut fp_extractor = FingerprintExtractor::new(config);
    let mut collected = Vec::new();

    for (block_index, block) in samples.chunks_exact(config.audio_block_size).enumerate() {
        let fft_out = transform.process(block);
        ep_extractor.extract(fft_out, block_index as i32);

        if ep_extractor.event_points().event_point_index > config.event_point_threshold {
            fp_extractor.extract(ep_extractor.event_points_mut(), block_index as i32);

            let fingerprints = fp_extractor.fingerprints_mut();
            collected.extend_from_slice(
                &fingerprints.fingerprints[..fingerprints.fingerprint_index],
            );
            fingerprints.fingerprint_index = 0;
        }
    }

    Ok(collected)
}

/// Build a reference table from a full recording: extract fingerprints, pack
/// each as `(hash << 16) | (t1 & 0xFFFF)` and sort ascending. The result is
/// directly loadable with [`Db::register_audio`].
pub fn build_reference(samples: &[i16], config: &OlafConfig) -> anyhow::Result<Vec<u64>> {
    let fingerprints = extract_fingerprints(samples, config)?;

    let mut packed: Vec<u64> = fingerprints
        .iter()
        .map(|fp| pack_entry(fp.calculate_hash(), fp.time_index1 as u32))
        .collect();
    packed.sort_unstable();
    packed.dedup();
    Ok(packed)
}
