//! In-memory fingerprint index
//!
//! Each reference item is an externally built, ascending-sorted array of
//! packed 64-bit entries: a 48-bit hash in the upper bits and the low 16
//! bits of the fingerprint timestamp below it. Because the hash dominates
//! the packed value, one u64 comparison orders by hash first and time
//! second, and all collisions for a hash are contiguous.

use std::sync::Arc;

/// Pack a hash and timestamp into a database entry.
pub fn pack_entry(hash: u64, timestamp: u32) -> u64 {
    (hash << 16) | (timestamp as u64 & 0xFFFF)
}

/// Split a packed entry into its hash and 16-bit timestamp.
pub fn unpack_entry(packed: u64) -> (u64, u32) {
    (packed >> 16, (packed & 0xFFFF) as u32)
}

/// Jenkins one-at-a-time hash, used to derive stable 32-bit audio ids
/// from names.
pub fn jenkins_hash(key: &str) -> u32 {
    let mut hash: u32 = 0;
    for &byte in key.as_bytes() {
        hash = hash.wrapping_add(byte as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

/// One registered reference item.
struct AudioReference {
    audio_id: u32,
    fingerprints: Arc<[u64]>,
}

/// Sorted fingerprint index over any number of reference items. The index
/// never mutates the registered tables.
#[derive(Default)]
pub struct Db {
    audio_refs: Vec<AudioReference>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reference item's packed fingerprint table. The table must
    /// be sorted ascending by packed value.
    pub fn register_audio(&mut self, audio_id: u32, fingerprints: Arc<[u64]>) {
        debug_assert!(
            fingerprints.windows(2).all(|w| w[0] <= w[1]),
            "fingerprint table must be sorted ascending"
        );
        log::info!(
            "registered audio id {} ({} fingerprints)",
            audio_id,
            fingerprints.len()
        );
        self.audio_refs.push(AudioReference {
            audio_id,
            fingerprints,
        });
    }

    /// Drop every table registered under `audio_id`.
    pub fn delete_audio(&mut self, audio_id: u32) {
        self.audio_refs.retain(|r| r.audio_id != audio_id);
    }

    /// Collect every entry whose hash lies in `[start_key, stop_key]` across
    /// all registered items into `results` as `(timestamp << 32) | audio_id`,
    /// stopping once `max_results` entries are collected. Returns the number
    /// of results.
    pub fn find(
        &self,
        start_key: u64,
        stop_key: u64,
        results: &mut Vec<u64>,
        max_results: usize,
    ) -> usize {
        results.clear();

        for audio_ref in &self.audio_refs {
            let fingerprints = &audio_ref.fingerprints;

            // Binary search for any entry of any hash in the range; the
            // landing point is not necessarily the first collision.
            let mut found = None;
            for current_key in start_key..=stop_key {
                if let Ok(index) =
                    fingerprints.binary_search_by(|packed| (packed >> 16).cmp(&current_key))
                {
                    found = Some(index);
                    break;
                }
            }

            let Some(index) = found else { continue };

            // Walk outward from the landing point; sortedness makes every
            // in-range entry contiguous.
            for i in (0..=index).rev() {
                let (hash, timestamp) = unpack_entry(fingerprints[i]);
                if hash < start_key || hash > stop_key {
                    break;
                }
                if results.len() >= max_results {
                    log::warn!("db query result cap {} reached", max_results);
                    return results.len();
                }
                results.push(((timestamp as u64) << 32) | audio_ref.audio_id as u64);
            }
            for i in (index + 1)..fingerprints.len() {
                let (hash, timestamp) = unpack_entry(fingerprints[i]);
                if hash < start_key || hash > stop_key {
                    break;
                }
                if results.len() >= max_results {
                    log::warn!("db query result cap {} reached", max_results);
                    return results.len();
                }
                results.push(((timestamp as u64) << 32) | audio_ref.audio_id as u64);
            }
        }

        results.len()
    }

    /// True when any registered item holds an entry with a hash in
    /// `[start_key, stop_key]`.
    pub fn find_single(&self, start_key: u64, stop_key: u64) -> bool {
        for audio_ref in &self.audio_refs {
            for &packed in audio_ref.fingerprints.iter() {
                let (hash, _) = unpack_entry(packed);
                if hash < start_key {
                    continue;
                }
                if hash > stop_key {
                    break;
                }
                return true;
            }
        }
        false
    }

    pub fn audio_count(&self) -> usize {
        self.audio_refs.len()
    }

    pub fn total_fingerprints(&self) -> usize {
        self.audio_refs.iter().map(|r| r.fingerprints.len()).sum()
    }

    pub fn clear(&mut self) {
        self.audio_refs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_table(entries: &[(u64, u32)]) -> Arc<[u64]> {
        let mut packed: Vec<u64> = entries.iter().map(|&(h, t)| pack_entry(h, t)).collect();
        packed.sort_unstable();
        packed.into()
    }

    #[test]
    fn pack_round_trip() {
        for &(hash, timestamp) in &[(0u64, 0u32), (100, 5), (0xFFFF_FFFF_FFFF, 0xFFFF), (1, 12345)]
        {
            let packed = pack_entry(hash, timestamp);
            let (h, t) = unpack_entry(packed);
            assert_eq!(h, hash);
            assert_eq!(t, timestamp & 0xFFFF);
            assert_eq!(pack_entry(h, t), packed);
        }
    }

    #[test]
    fn range_scan_collects_all_collisions() {
        let mut db = Db::new();
        db.register_audio(7, sorted_table(&[(100, 5), (100, 9), (102, 3), (200, 1)]));

        let mut results = Vec::new();
        let count = db.find(99, 103, &mut results, 64);

        assert_eq!(count, 3);
        let mut decoded: Vec<(u32, u32)> = results
            .iter()
            .map(|&r| ((r >> 32) as u32, r as u32))
            .collect();
        decoded.sort_unstable();
        assert_eq!(decoded, vec![(3, 7), (5, 7), (9, 7)]);
    }

    #[test]
    fn zero_range_is_a_single_hash_scan() {
        let mut db = Db::new();
        db.register_audio(1, sorted_table(&[(100, 5), (100, 9), (102, 3)]));

        let mut results = Vec::new();
        assert_eq!(db.find(100, 100, &mut results, 64), 2);
        assert_eq!(db.find(101, 101, &mut results, 64), 0);
        assert_eq!(db.find(102, 102, &mut results, 64), 1);
    }

    #[test]
    fn result_cap_stops_collection() {
        let mut db = Db::new();
        let entries: Vec<(u64, u32)> = (0..20).map(|t| (500u64, t as u32)).collect();
        db.register_audio(1, sorted_table(&entries));

        let mut results = Vec::new();
        assert_eq!(db.find(500, 500, &mut results, 8), 8);
    }

    #[test]
    fn searches_every_registered_item() {
        let mut db = Db::new();
        db.register_audio(1, sorted_table(&[(100, 1)]));
        db.register_audio(2, sorted_table(&[(100, 2), (300, 4)]));

        let mut results = Vec::new();
        assert_eq!(db.find(100, 100, &mut results, 64), 2);
        let ids: Vec<u32> = results.iter().map(|&r| r as u32).collect();
        assert!(ids.contains(&1) && ids.contains(&2));
    }

    #[test]
    fn find_single_existence() {
        let mut db = Db::new();
        db.register_audio(1, sorted_table(&[(100, 5), (200, 1)]));

        assert!(db.find_single(100, 100));
        assert!(db.find_single(150, 250));
        assert!(!db.find_single(101, 199));
        assert!(!db.find_single(201, u64::MAX >> 16));
    }

    #[test]
    fn delete_audio_removes_tables() {
        let mut db = Db::new();
        db.register_audio(1, sorted_table(&[(100, 5)]));
        db.register_audio(2, sorted_table(&[(100, 6)]));
        assert_eq!(db.audio_count(), 2);

        db.delete_audio(1);
        assert_eq!(db.audio_count(), 1);

        let mut results = Vec::new();
        assert_eq!(db.find(100, 100, &mut results, 64), 1);
        assert_eq!(results[0] as u32, 2);
    }

    #[test]
    fn jenkins_hash_is_stable() {
        assert_eq!(jenkins_hash("a"), jenkins_hash("a"));
        assert_ne!(jenkins_hash("a"), jenkins_hash("b"));
        assert_ne!(jenkins_hash(""), jenkins_hash("a"));
    }
}
