//! Fingerprint construction and hashing
//!
//! Combines event points into pairs or triples and projects each combination
//! to a 48-bit hash. The hash bit layout is the wire format of the reference
//! tables; it must not change between indexing and recognition.

use serde::{Deserialize, Serialize};

use crate::config::OlafConfig;
use crate::eventpoint::{ExtractedEventPoints, TOMBSTONE_TIME};

/// A combination of three event points, stored in time order. Pair
/// fingerprints mirror the second point into the third slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub time_index1: i32,
    pub frequency_bin1: i32,
    pub magnitude1: f32,

    pub time_index2: i32,
    pub frequency_bin2: i32,
    pub magnitude2: f32,

    pub time_index3: i32,
    pub frequency_bin3: i32,
    pub magnitude3: f32,
}

impl Fingerprint {
    /// Project the fingerprint geometry to its hash.
    ///
    /// Layout, LSB to MSB: t3-t1 (6 bits), f1>f2, f2>f3, f3>f1, three
    /// reserved magnitude-ordering bits (always zero), (t2-t1)>(t3-t2),
    /// |f1-f2|>|f2-f3|, f1>>1 (8 bits), |f2-f1|>>2 (6 bits), |f3-f2|>>2
    /// (6 bits). 34 significant bits; the value always fits in 48.
    pub fn calculate_hash(&self) -> u64 {
        let f1 = self.frequency_bin1;
        let f2 = self.frequency_bin2;
        let f3 = self.frequency_bin3;

        let t1 = self.time_index1;
        let t2 = self.time_index2;
        let t3 = self.time_index3;

        let f1_larger_than_f2: u64 = (f1 > f2) as u64;
        let f2_larger_than_f3: u64 = (f2 > f3) as u64;
        let f3_larger_than_f1: u64 = (f3 > f1) as u64;

        // Magnitude ordering is reserved: computed for layout documentation
        // but unconditionally disabled, also when use_magnitude_info is set.
        let m1_larger_than_m2: u64 = 0;
        let m2_larger_than_m3: u64 = 0;
        let m3_larger_than_m1: u64 = 0;

        let dt1t2_larger_than_t3t2: u64 = ((t2 - t1) > (t3 - t2)) as u64;
        let df1f2_larger_than_f3f2: u64 = ((f2 - f1).abs() > (f3 - f2).abs()) as u64;

        let f1_range = (f1 >> 1) as u64;
        let df2f1 = ((f2 - f1).abs() >> 2) as u64;
        let df3f2 = ((f3 - f2).abs() >> 2) as u64;
        let diff_t = (t3 - t1) as u64;

        (diff_t & 0x3F)
            | (f1_larger_than_f2 & 0x1) << 6
            | (f2_larger_than_f3 & 0x1) << 7
            | (f3_larger_than_f1 & 0x1) << 8
            | (m1_larger_than_m2 & 0x1) << 9
            | (m2_larger_than_m3 & 0x1) << 10
            | (m3_larger_than_m1 & 0x1) << 11
            | (dt1t2_larger_than_t3t2 & 0x1) << 12
            | (df1f2_larger_than_f3f2 & 0x1) << 13
            | (f1_range & 0xFF) << 14
            | (df2f1 & 0x3F) << 22
            | (df3f2 & 0x3F) << 28
    }
}

/// The fingerprint buffer. Entries `[0, fingerprint_index)` are pending and
/// are drained to zero by each matcher pass.
#[derive(Debug)]
pub struct ExtractedFingerprints {
    pub fingerprints: Vec<Fingerprint>,
    pub fingerprint_index: usize,
}

/// Combines the live event point buffer into fingerprints.
pub struct FingerprintExtractor {
    config: OlafConfig,
    fingerprints: ExtractedFingerprints,
    total_extracted: usize,
    warning_given: bool,
}

impl FingerprintExtractor {
    pub fn new(config: &OlafConfig) -> Self {
        Self {
            config: config.clone(),
            fingerprints: ExtractedFingerprints {
                fingerprints: vec![Fingerprint::default(); config.max_fingerprints],
                fingerprint_index: 0,
            },
            total_extracted: 0,
            warning_given: false,
        }
    }

    /// Total fingerprints emitted over the extractor's lifetime.
    pub fn total(&self) -> usize {
        self.total_extracted
    }

    pub fn fingerprints(&self) -> &ExtractedFingerprints {
        &self.fingerprints
    }

    pub fn fingerprints_mut(&mut self) -> &mut ExtractedFingerprints {
        &mut self.fingerprints
    }

    /// Run one combination pass over the live event points, then retire
    /// peaks that slid past the pairing horizon or ran out of usages.
    pub fn extract(&mut self, event_points: &mut ExtractedEventPoints, audio_block_index: i32) {
        if event_points.event_point_index == 0 {
            return;
        }

        match self.config.eps_per_fingerprint {
            2 => self.extract_pairs(event_points, audio_block_index),
            3 => self.extract_triples(event_points, audio_block_index),
            n => unreachable!("validated eps_per_fingerprint: {}", n),
        }

        self.prune(event_points);
        self.total_extracted += self.fingerprints.fingerprint_index;
    }

    fn extract_pairs(&mut self, event_points: &mut ExtractedEventPoints, audio_block_index: i32) {
        let live = event_points.event_point_index;

        for i in 0..live {
            let e1 = event_points.event_points[i];
            if e1.frequency_bin == 0 && e1.time_index == 0 {
                break;
            }
            if e1.usages > self.config.max_event_point_usages {
                break;
            }
            // A peak may still gather future partners; only pair it once it
            // can no longer do so.
            if e1.time_index > audio_block_index - self.config.max_time_distance {
                break;
            }

            for j in (i + 1)..live {
                let e2 = event_points.event_points[j];
                let t_diff = e2.time_index - e1.time_index;
                let f_diff = (e1.frequency_bin - e2.frequency_bin).abs();
                debug_assert!(t_diff >= 0);

                if e2.usages > self.config.max_event_point_usages {
                    break;
                }
                if t_diff > self.config.max_time_distance {
                    break;
                }

                if t_diff >= self.config.min_time_distance
                    && f_diff >= self.config.min_freq_distance
                    && f_diff <= self.config.max_freq_distance
                {
                    if self.push(Fingerprint {
                        time_index1: e1.time_index,
                        frequency_bin1: e1.frequency_bin,
                        magnitude1: e1.magnitude,
                        time_index2: e2.time_index,
                        frequency_bin2: e2.frequency_bin,
                        magnitude2: e2.magnitude,
                        time_index3: e2.time_index,
                        frequency_bin3: e2.frequency_bin,
                        magnitude3: e2.magnitude,
                    }) {
                        event_points.event_points[i].usages += 1;
                        event_points.event_points[j].usages += 1;
                    }
                }
            }
        }
    }

    fn extract_triples(&mut self, event_points: &mut ExtractedEventPoints, audio_block_index: i32) {
        let live = event_points.event_point_index;

        for i in 0..live {
            let e1 = event_points.event_points[i];
            if e1.frequency_bin == 0 && e1.time_index == 0 {
                break;
            }
            if e1.usages > self.config.max_event_point_usages {
                break;
            }
            if e1.time_index > audio_block_index - self.config.max_time_distance {
                break;
            }

            for j in (i + 1)..live {
                let e2 = event_points.event_points[j];
                let t_diff12 = e2.time_index - e1.time_index;
                let f_diff12 = (e1.frequency_bin - e2.frequency_bin).abs();
                debug_assert!(t_diff12 >= 0);

                if e2.usages > self.config.max_event_point_usages {
                    break;
                }
                if t_diff12 > self.config.max_time_distance {
                    break;
                }
                if t_diff12 < self.config.min_time_distance
                    || f_diff12 < self.config.min_freq_distance
                    || f_diff12 > self.config.max_freq_distance
                {
                    continue;
                }

                for k in (j + 1)..live {
                    let e3 = event_points.event_points[k];
                    let t_diff23 = e3.time_index - e2.time_index;
                    let f_diff23 = (e2.frequency_bin - e3.frequency_bin).abs();
                    debug_assert!(t_diff23 >= 0);

                    if e3.usages > self.config.max_event_point_usages {
                        break;
                    }
                    if t_diff23 > self.config.max_time_distance {
                        break;
                    }
                    if t_diff23 < self.config.min_time_distance
                        || f_diff23 < self.config.min_freq_distance
                        || f_diff23 > self.config.max_freq_distance
                    {
                        continue;
                    }

                    if self.push(Fingerprint {
                        time_index1: e1.time_index,
                        frequency_bin1: e1.frequency_bin,
                        magnitude1: e1.magnitude,
                        time_index2: e2.time_index,
                        frequency_bin2: e2.frequency_bin,
                        magnitude2: e2.magnitude,
                        time_index3: e3.time_index,
                        frequency_bin3: e3.frequency_bin,
                        magnitude3: e3.magnitude,
                    }) {
                        event_points.event_points[i].usages += 1;
                        event_points.event_points[j].usages += 1;
                        event_points.event_points[k].usages += 1;
                    }
                }
            }
        }
    }

    /// Append to the buffer; false when the cap is hit and the fingerprint
    /// is dropped.
    fn push(&mut self, fingerprint: Fingerprint) -> bool {
        if self.fingerprints.fingerprint_index >= self.config.max_fingerprints {
            if !self.warning_given {
                log::warn!(
                    "fingerprint maximum {} reached, fingerprints are being dropped; \
                     consider increasing max_fingerprints",
                    self.config.max_fingerprints
                );
                self.warning_given = true;
            }
            return false;
        }

        log::trace!(
            "fingerprint {}: t1={} f1={} t3={} f3={} hash={}",
            self.fingerprints.fingerprint_index,
            fingerprint.time_index1,
            fingerprint.frequency_bin1,
            fingerprint.time_index3,
            fingerprint.frequency_bin3,
            fingerprint.calculate_hash()
        );

        self.fingerprints.fingerprints[self.fingerprints.fingerprint_index] = fingerprint;
        self.fingerprints.fingerprint_index += 1;
        true
    }

    /// Tombstone peaks that can no longer pair (older than the newest peak
    /// by more than `max_time_distance`) or that hit the usage cap, then
    /// re-sort by time and compact tombstones off the live range.
    fn prune(&mut self, event_points: &mut ExtractedEventPoints) {
        let live = event_points.event_point_index;
        let cutoff_time =
            event_points.event_points[live - 1].time_index - self.config.max_time_distance;

        for ep in &mut event_points.event_points[..live] {
            if ep.time_index <= cutoff_time || ep.usages == self.config.max_event_point_usages {
                ep.time_index = TOMBSTONE_TIME;
                ep.frequency_bin = 0;
                ep.magnitude = 0.0;
            }
        }

        event_points.event_points[..live].sort_by_key(|ep| ep.time_index);

        for i in 0..live {
            if event_points.event_points[i].is_tombstone() {
                event_points.event_point_index = i;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventpoint::EventPoint;

    fn buffer_of(points: &[(i32, i32)]) -> ExtractedEventPoints {
        let mut event_points: Vec<EventPoint> = points
            .iter()
            .map(|&(t, f)| EventPoint {
                time_index: t,
                frequency_bin: f,
                magnitude: 1.0,
                usages: 0,
            })
            .collect();
        event_points.resize(64, EventPoint::default());
        ExtractedEventPoints {
            event_points,
            event_point_index: points.len(),
        }
    }

    #[test]
    fn hash_bit_layout() {
        let fp = Fingerprint {
            time_index1: 100,
            frequency_bin1: 10,
            magnitude1: 1.0,
            time_index2: 105,
            frequency_bin2: 20,
            magnitude2: 1.0,
            time_index3: 115,
            frequency_bin3: 25,
            magnitude3: 1.0,
        };
        let hash = fp.calculate_hash();

        assert_eq!(hash & 0x3F, 15, "t3-t1");
        assert_eq!((hash >> 6) & 1, 0, "f1>f2");
        assert_eq!((hash >> 7) & 1, 0, "f2>f3");
        assert_eq!((hash >> 8) & 1, 1, "f3>f1");
        assert_eq!((hash >> 9) & 0x7, 0, "magnitude bits reserved");
        assert_eq!((hash >> 14) & 0xFF, 5, "f1>>1");
        assert_eq!((hash >> 22) & 0x3F, 2, "|f2-f1|>>2");
        assert_eq!((hash >> 28) & 0x3F, 1, "|f3-f2|>>2");
    }

    #[test]
    fn hash_fits_48_bits() {
        let fp = Fingerprint {
            time_index1: 1000,
            frequency_bin1: 511,
            magnitude1: 3.0,
            time_index2: 1020,
            frequency_bin2: 9,
            magnitude2: 2.0,
            time_index3: 1050,
            frequency_bin3: 500,
            magnitude3: 1.0,
        };
        let hash = fp.calculate_hash();
        assert_eq!(hash >> 48, 0);
        assert!(hash >> 34 == 0, "34 significant bits");
    }

    #[test]
    fn pair_mirrors_second_point() {
        let config = OlafConfig::esp32();
        let mut extractor = FingerprintExtractor::new(&config);
        let mut eps = buffer_of(&[(10, 40), (15, 60)]);

        extractor.extract(&mut eps, 100);

        let fps = extractor.fingerprints();
        assert_eq!(fps.fingerprint_index, 1);
        let fp = fps.fingerprints[0];
        assert_eq!(fp.time_index2, fp.time_index3);
        assert_eq!(fp.frequency_bin2, fp.frequency_bin3);
        assert_eq!(fp.time_index1, 10);
        assert_eq!(fp.time_index2, 15);
    }

    #[test]
    fn recent_anchor_is_deferred() {
        let config = OlafConfig::esp32();
        let mut extractor = FingerprintExtractor::new(&config);
        // Anchor newer than block_index - max_time_distance: not yet closed.
        let mut eps = buffer_of(&[(90, 40), (95, 60)]);

        extractor.extract(&mut eps, 100);
        assert_eq!(extractor.fingerprints().fingerprint_index, 0);
        // Both peaks survive for future passes.
        assert_eq!(eps.event_point_index, 2);
    }

    #[test]
    fn distance_constraints_reject_combinations() {
        let config = OlafConfig::esp32();
        let mut extractor = FingerprintExtractor::new(&config);
        // Same frequency (f_diff 0 < min 1) and too-close time (t_diff 1 < 2).
        let mut eps = buffer_of(&[(10, 40), (11, 40), (50, 40)]);

        extractor.extract(&mut eps, 200);
        assert_eq!(extractor.fingerprints().fingerprint_index, 0);
    }

    #[test]
    fn triples_require_both_links() {
        let config = OlafConfig {
            eps_per_fingerprint: 3,
            ..OlafConfig::esp32()
        };
        let mut extractor = FingerprintExtractor::new(&config);
        let mut eps = buffer_of(&[(10, 40), (15, 60), (20, 90)]);

        extractor.extract(&mut eps, 100);

        let fps = extractor.fingerprints();
        assert_eq!(fps.fingerprint_index, 1);
        let fp = fps.fingerprints[0];
        assert_eq!(
            (fp.time_index1, fp.time_index2, fp.time_index3),
            (10, 15, 20)
        );
        assert_eq!(
            (fp.frequency_bin1, fp.frequency_bin2, fp.frequency_bin3),
            (40, 60, 90)
        );
    }

    #[test]
    fn aged_out_peaks_are_compacted() {
        let config = OlafConfig::esp32();
        let mut extractor = FingerprintExtractor::new(&config);
        // First peak is max_time_distance + 1 older than the newest.
        let mut eps = buffer_of(&[(10, 40), (44, 60), (46, 90)]);

        extractor.extract(&mut eps, 100);

        // Peak at t=10 is tombstoned; the live prefix stays time sorted.
        assert_eq!(eps.event_point_index, 2);
        assert_eq!(eps.event_points[0].time_index, 44);
        assert_eq!(eps.event_points[1].time_index, 46);
        assert!(eps.event_points[2].is_tombstone());
    }

    #[test]
    fn usage_cap_retires_and_disqualifies_peaks() {
        let config = OlafConfig {
            max_event_point_usages: 1,
            ..OlafConfig::esp32()
        };
        let mut extractor = FingerprintExtractor::new(&config);
        let mut eps = buffer_of(&[(10, 40), (15, 60), (17, 90)]);

        // Eligibility is checked against the usage count at loop entry, so a
        // pass may overshoot the cap; exactly-capped peaks are tombstoned.
        extractor.extract(&mut eps, 100);
        assert_eq!(extractor.fingerprints().fingerprint_index, 3);
        assert_eq!(eps.event_point_index, 2);
        for ep in &eps.event_points[..eps.event_point_index] {
            assert!(ep.usages > config.max_event_point_usages);
        }

        // Disqualified anchors cut the next pass short before any pairing.
        extractor.fingerprints_mut().fingerprint_index = 0;
        extractor.extract(&mut eps, 100);
        assert_eq!(extractor.fingerprints().fingerprint_index, 0);
    }

    #[test]
    fn fingerprint_capacity_is_respected() {
        let config = OlafConfig {
            max_fingerprints: 2,
            ..OlafConfig::esp32()
        };
        let mut extractor = FingerprintExtractor::new(&config);
        let mut eps = buffer_of(&[(10, 40), (15, 60), (17, 90), (19, 120), (21, 150)]);

        extractor.extract(&mut eps, 100);
        assert_eq!(extractor.fingerprints().fingerprint_index, 2);
    }
}
