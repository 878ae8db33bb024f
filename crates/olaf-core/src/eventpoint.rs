//! Event point extraction from a rolling spectral history
//!
//! Keeps the last `filter_size_time` magnitude spectra and their
//! frequency-max-filtered counterparts. Once the history is full, the center
//! row is scanned for bins that dominate both their frequency neighborhood
//! and the whole temporal window; those become event points.

use serde::{Deserialize, Serialize};

use crate::config::OlafConfig;
use crate::max_filter::max_filter;

/// Sentinel time index marking an expired event point.
pub const TOMBSTONE_TIME: i32 = 1 << 23;

/// A local maximum of the spectrogram under both filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPoint {
    /// Block index at which the peak occurred.
    pub time_index: i32,
    /// Frequency bin of the peak.
    pub frequency_bin: i32,
    /// Magnitude at the peak.
    pub magnitude: f32,
    /// Number of fingerprints this peak participated in.
    pub usages: i32,
}

impl Default for EventPoint {
    fn default() -> Self {
        Self {
            time_index: TOMBSTONE_TIME,
            frequency_bin: 0,
            magnitude: 0.0,
            usages: 0,
        }
    }
}

impl EventPoint {
    pub fn is_tombstone(&self) -> bool {
        self.time_index == TOMBSTONE_TIME
    }
}

/// The live event point buffer. Entries `[0, event_point_index)` are live,
/// ordered by ascending `time_index`; the tail holds tombstones.
#[derive(Debug)]
pub struct ExtractedEventPoints {
    pub event_points: Vec<EventPoint>,
    pub event_point_index: usize,
}

/// Event point extractor with per-stream state.
pub struct EventPointExtractor {
    config: OlafConfig,
    /// Rolling magnitude spectra, one row per block.
    mags: Vec<Vec<f32>>,
    /// Frequency-max-filtered versions of the same rows.
    maxes: Vec<Vec<f32>>,
    /// Rows ingested so far, saturating at `filter_size_time - 1`.
    filter_index: usize,
    event_points: ExtractedEventPoints,
    warning_given: bool,
}

impl EventPointExtractor {
    pub fn new(config: &OlafConfig) -> Self {
        let half_block = config.half_block_size();
        let event_points = ExtractedEventPoints {
            event_points: vec![EventPoint::default(); config.max_event_points],
            event_point_index: 0,
        };

        Self {
            config: config.clone(),
            mags: vec![vec![0.0; half_block]; config.filter_size_time],
            maxes: vec![vec![0.0; half_block]; config.filter_size_time],
            filter_index: 0,
            event_points,
            warning_given: false,
        }
    }

    /// Ingest one FFT output block (interleaved re/im pairs of length
    /// `audio_block_size`) and, once the history is full, extract peaks for
    /// the center row.
    pub fn extract(&mut self, fft_out: &[f32], audio_block_index: i32) {
        debug_assert_eq!(fft_out.len(), self.config.audio_block_size);

        let row = &mut self.mags[self.filter_index];
        for (magnitude, pair) in row.iter_mut().zip(fft_out.chunks_exact(2)) {
            *magnitude = pair[0].hypot(pair[1]);
            if self.config.sqrt_magnitude {
                *magnitude = magnitude.sqrt();
            }
        }

        max_filter(&self.mags[self.filter_index], &mut self.maxes[self.filter_index]);

        if self.filter_index == self.config.filter_size_time - 1 {
            self.extract_center_row(audio_block_index);
            self.rotate();
        } else {
            self.filter_index += 1;
        }
    }

    /// Peak test for the center row of the full history: the bin must carry
    /// its frequency-window maximum, clear the magnitude floor, and equal the
    /// maximum of the filtered column across the temporal window.
    fn extract_center_row(&mut self, audio_block_index: i32) {
        let center = self.config.half_filter_size_time;
        let half_block = self.config.half_block_size();
        let mut event_point_index = self.event_points.event_point_index;

        for j in self.config.min_frequency_bin..(half_block - 1) {
            let current_val = self.mags[center][j];
            let max_val = self.maxes[center][j];

            if current_val < self.config.min_event_point_magnitude || current_val != max_val {
                continue;
            }

            let mut max_val_time = f32::NEG_INFINITY;
            for row in &self.maxes {
                max_val_time = max_val_time.max(row[j]);
            }

            if current_val == max_val_time {
                if event_point_index == self.config.max_event_points {
                    if !self.warning_given {
                        log::warn!(
                            "event point maximum {} reached, peaks are being dropped; \
                             consider increasing max_event_points",
                            self.config.max_event_points
                        );
                        self.warning_given = true;
                    }
                } else {
                    self.event_points.event_points[event_point_index] = EventPoint {
                        time_index: audio_block_index - center as i32,
                        frequency_bin: j as i32,
                        magnitude: current_val,
                        usages: 0,
                    };
                    event_point_index += 1;
                }
            }
        }

        self.event_points.event_point_index = event_point_index;
    }

    /// Retire the oldest row and reuse its buffers at the tail. Row vectors
    /// move; nothing is copied.
    fn rotate(&mut self) {
        debug_assert_eq!(self.filter_index, self.config.filter_size_time - 1);
        self.mags.rotate_left(1);
        self.maxes.rotate_left(1);
    }

    pub fn event_points(&self) -> &ExtractedEventPoints {
        &self.event_points
    }

    pub fn event_points_mut(&mut self) -> &mut ExtractedEventPoints {
        &mut self.event_points
    }
}
