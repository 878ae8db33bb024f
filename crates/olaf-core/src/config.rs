//! Configuration parameters for the Olaf engine
//!
//! The configuration is fixed for the lifetime of a recognizer. Reference
//! tables are only interchangeable between runs that used the same settings:
//! changing e.g. the block size or the fingerprint distances invalidates
//! previously indexed fingerprints.

use serde::{Deserialize, Serialize};

/// Engine configuration. Construct via [`OlafConfig::default`],
/// [`OlafConfig::esp32`] or [`OlafConfig::memory`] and adjust fields as
/// needed before building a recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OlafConfig {
    // Audio input
    /// FFT length in samples; only 512 or 1024 are accepted.
    pub audio_block_size: usize,
    /// Sample rate in Hz.
    pub audio_sample_rate: u32,
    /// Samples advanced between blocks; the time base for all
    /// seconds-to-blocks conversions.
    pub audio_step_size: usize,

    // Event point extraction
    /// Temporal neighborhood (in blocks) a peak must dominate.
    pub filter_size_time: usize,
    pub half_filter_size_time: usize,
    /// Frequency neighborhood (in bins) a peak must dominate.
    pub filter_size_frequency: usize,
    pub half_filter_size_frequency: usize,
    /// Magnitude floor below which a bin is never a peak.
    pub min_event_point_magnitude: f32,
    /// Bins below this index are ignored entirely.
    pub min_frequency_bin: usize,
    /// Capacity of the live event point buffer.
    pub max_event_points: usize,
    /// A peak is retired once it participated in this many fingerprints.
    pub max_event_point_usages: i32,
    /// Minimum number of live event points before fingerprint extraction runs.
    pub event_point_threshold: usize,
    /// Take the square root of magnitudes before peak picking.
    pub sqrt_magnitude: bool,

    // Fingerprint construction
    /// Event points per fingerprint: 2 or 3.
    pub eps_per_fingerprint: usize,
    /// Reserved: magnitude ordering bits in the hash. Currently forced off
    /// inside the hash regardless of this setting.
    pub use_magnitude_info: bool,
    /// Allowed block distance between successive peaks of a fingerprint.
    pub min_time_distance: i32,
    pub max_time_distance: i32,
    /// Allowed absolute bin distance between successive peaks.
    pub min_freq_distance: i32,
    pub max_freq_distance: i32,
    /// Capacity of the fingerprint buffer drained by each matcher pass.
    pub max_fingerprints: usize,

    // Matching
    /// Inclusive +/- tolerance on the integer hash at query time.
    pub search_range: u64,
    /// Result cap for a single database range query.
    pub max_db_collisions: usize,
    /// Top-K size of a report.
    pub max_results: usize,
    /// Minimum vote count for a result to be reported.
    pub min_match_count: i32,
    /// Minimum reference span in seconds for a result to be reported.
    pub min_match_time_diff: f32,
    /// Age in seconds after which a vote is dropped; 0 disables aging.
    pub keep_matches_for: f32,
    /// Reporting cadence in seconds; 0 disables reports.
    pub print_result_every: f32,
}

impl Default for OlafConfig {
    /// The tuning used on traditional computers.
    fn default() -> Self {
        Self {
            audio_block_size: 1024,
            audio_sample_rate: 16_000,
            audio_step_size: 128,

            filter_size_time: 24,
            half_filter_size_time: 12,
            filter_size_frequency: 103,
            half_filter_size_frequency: 51,
            min_event_point_magnitude: 0.001,
            min_frequency_bin: 9,
            max_event_points: 60,
            max_event_point_usages: 10,
            event_point_threshold: 30,
            sqrt_magnitude: false,

            eps_per_fingerprint: 3,
            use_magnitude_info: false,
            min_time_distance: 2,
            max_time_distance: 33,
            min_freq_distance: 1,
            max_freq_distance: 128,
            max_fingerprints: 300,

            search_range: 5,
            max_db_collisions: 2000,
            max_results: 50,
            min_match_count: 6,
            min_match_time_diff: 0.0,
            keep_matches_for: 0.0,
            print_result_every: 0.0,
        }
    }
}

impl OlafConfig {
    /// The tuning used on ESP32-class microcontrollers: pairs instead of
    /// triples, small buffers, periodic reporting with vote aging.
    pub fn esp32() -> Self {
        Self {
            audio_step_size: 256,
            max_event_point_usages: 20,
            max_event_points: 50,
            eps_per_fingerprint: 2,
            max_fingerprints: 30,
            max_db_collisions: 50,
            max_results: 20,
            min_match_count: 4,
            min_match_time_diff: 1.0,
            keep_matches_for: 9.0,
            print_result_every: 1.0,
            ..Self::default()
        }
    }

    /// The esp32 tuning with reporting cadence and aging disabled, for
    /// querying an in-memory database offline.
    pub fn memory() -> Self {
        Self {
            max_results: 10,
            print_result_every: 0.0,
            keep_matches_for: 0.0,
            ..Self::esp32()
        }
    }

    /// Half the block size: the number of usable spectrum bins.
    pub fn half_block_size(&self) -> usize {
        self.audio_block_size / 2
    }

    /// Seconds covered by one block index step.
    pub fn seconds_per_block(&self) -> f32 {
        self.audio_step_size as f32 / self.audio_sample_rate as f32
    }

    /// Convert a duration in seconds to a block count.
    pub fn seconds_to_blocks(&self, seconds: f32) -> i32 {
        ((seconds * self.audio_sample_rate as f32) / self.audio_step_size as f32) as i32
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.audio_block_size != 512 && self.audio_block_size != 1024 {
            anyhow::bail!(
                "audio_block_size must be 512 or 1024, got {}",
                self.audio_block_size
            );
        }
        if self.audio_sample_rate == 0 {
            anyhow::bail!("audio_sample_rate must be > 0");
        }
        if self.audio_step_size == 0 {
            anyhow::bail!("audio_step_size must be > 0");
        }
        if self.eps_per_fingerprint != 2 && self.eps_per_fingerprint != 3 {
            anyhow::bail!(
                "eps_per_fingerprint must be 2 or 3, got {}",
                self.eps_per_fingerprint
            );
        }
        if self.max_event_points == 0 {
            anyhow::bail!("max_event_points must be > 0");
        }
        if self.max_fingerprints == 0 {
            anyhow::bail!("max_fingerprints must be > 0");
        }
        if self.max_results == 0 {
            anyhow::bail!("max_results must be > 0");
        }
        if self.min_time_distance > self.max_time_distance {
            anyhow::bail!("min_time_distance must be <= max_time_distance");
        }
        if self.min_freq_distance > self.max_freq_distance {
            anyhow::bail!("min_freq_distance must be <= max_freq_distance");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        OlafConfig::default().validate().unwrap();
        OlafConfig::esp32().validate().unwrap();
        OlafConfig::memory().validate().unwrap();
    }

    #[test]
    fn esp32_overrides() {
        let config = OlafConfig::esp32();
        assert_eq!(config.eps_per_fingerprint, 2);
        assert_eq!(config.audio_step_size, 256);
        assert_eq!(config.max_event_points, 50);
        assert_eq!(config.max_fingerprints, 30);
        assert_eq!(config.min_match_count, 4);
    }

    #[test]
    fn rejects_odd_block_size() {
        let config = OlafConfig {
            audio_block_size: 2048,
            ..OlafConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn seconds_to_blocks_uses_step_size() {
        let config = OlafConfig::esp32();
        // 16000 Hz / 256 samples per step = 62.5 blocks per second
        assert_eq!(config.seconds_to_blocks(1.0), 62);
        assert_eq!(config.seconds_to_blocks(9.0), 562);
    }
}
