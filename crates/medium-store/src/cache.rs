//! Bounded cache of disjoint medium regions
//!
//! The cache keeps cached [`MediumRegion`]s of one medium keyed by start
//! position. Three invariants hold after every call:
//!
//! - no two stored regions overlap,
//! - the sum of stored region sizes never exceeds the maximum cache size,
//! - no stored region is larger than the maximum region size.
//!
//! Eviction is strictly FIFO by insertion. Parts of a region that survive
//! clipping keep the insertion rank of the region they were cut from.

use crate::error::{Result, StoreError};
use crate::region::{MediumRegion, chunk_range};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedEntry {
    sequence: u64,
    region: MediumRegion,
}

/// FIFO-evicting region cache of one medium
#[derive(Debug)]
pub struct MediumCache {
    regions: BTreeMap<u64, CachedEntry>,
    insertion_order: BTreeSet<(u64, u64)>,
    next_sequence: u64,
    current_size: usize,
    max_cache_size: usize,
    max_region_size: usize,
}

impl MediumCache {
    /// Create an empty cache
    ///
    /// `max_cache_size` must be at least `max_region_size`, which must be
    /// greater than zero.
    pub fn new(max_cache_size: usize, max_region_size: usize) -> Result<Self> {
        if max_region_size == 0 {
            return Err(StoreError::invalid_argument(
                "maximum region size must be greater than 0",
            ));
        }
        if max_cache_size < max_region_size {
            return Err(StoreError::invalid_argument(format!(
                "maximum cache size {max_cache_size} is smaller than maximum region size {max_region_size}"
            )));
        }

        Ok(Self {
            regions: BTreeMap::new(),
            insertion_order: BTreeSet::new(),
            next_sequence: 0,
            current_size: 0,
            max_cache_size,
            max_region_size,
        })
    }

    /// Maximum number of cached bytes
    pub const fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    /// Maximum size of a single stored region
    pub const fn max_region_size(&self) -> usize {
        self.max_region_size
    }

    /// Number of cached bytes
    pub const fn current_size(&self) -> usize {
        self.current_size
    }

    /// Number of stored regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// All stored regions in ascending position order
    pub fn all_regions(&self) -> Vec<MediumRegion> {
        self.regions.values().map(|entry| entry.region.clone()).collect()
    }

    /// Add a cached region; its content replaces any overlapping cached content.
    ///
    /// The region is stored in chunks of at most the maximum region size.
    /// Afterwards the oldest regions are evicted until the cache fits its
    /// budget again, which may include leading chunks of the new region.
    pub fn add_region(&mut self, region: &MediumRegion) -> Result<()> {
        let Some(bytes) = region.bytes() else {
            return Err(StoreError::invalid_argument(format!(
                "cannot cache {region:?} without content"
            )));
        };

        self.remove_regions_in_range(region.start(), region.size() as u64);

        let mut offset = 0usize;
        for (chunk_start, chunk_size) in
            chunk_range(region.start(), region.size() as u64, self.max_region_size)
        {
            let chunk = MediumRegion::with_bytes(chunk_start, bytes.slice(offset..offset + chunk_size));
            offset += chunk_size;

            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.insert_entry(CachedEntry {
                sequence,
                region: chunk,
            });
        }

        debug!(
            "Cached [{}, {}), cache size {} of {}",
            region.start(),
            region.end(),
            self.current_size,
            self.max_cache_size
        );

        self.evict_to_budget();
        Ok(())
    }

    /// Regions exactly tiling `[start, start + size)`.
    ///
    /// Cached regions are returned unclipped and may extend past the range
    /// edges. Uncached bytes are covered by content-less gap regions of at
    /// most the maximum region size.
    pub fn regions_in_range(&self, start: u64, size: u64) -> Vec<MediumRegion> {
        let end = start.saturating_add(size);
        let mut tiling = Vec::new();
        let mut cursor = start;

        for entry in self.overlapping_entries(start, end) {
            let region = &entry.region;
            if region.start() > cursor {
                self.push_gaps(&mut tiling, cursor, region.start() - cursor);
            }
            tiling.push(region.clone());
            cursor = region.end();
        }

        if cursor < end {
            self.push_gaps(&mut tiling, cursor, end - cursor);
        }

        tiling
    }

    /// Number of contiguously cached bytes starting at `position`
    pub fn cached_byte_count_at(&self, position: u64) -> u64 {
        let Some((_, first)) = self.regions.range(..=position).next_back() else {
            return 0;
        };
        if !first.region.contains(position) {
            return 0;
        }

        let mut count = first.region.end() - position;
        let mut previous_end = first.region.end();
        for entry in self.regions.range(previous_end..).map(|(_, entry)| entry) {
            if entry.region.start() != previous_end {
                break;
            }
            count += entry.region.size() as u64;
            previous_end = entry.region.end();
        }
        count
    }

    /// Drop cached coverage of `[start, start + size)`, keeping the parts of
    /// boundary regions outside the range
    pub fn remove_regions_in_range(&mut self, start: u64, size: u64) {
        let end = start.saturating_add(size);
        let affected: Vec<u64> = self
            .overlapping_entries(start, end)
            .map(|entry| entry.region.start())
            .collect();

        for key in affected {
            let Some(entry) = self.remove_entry(key) else {
                continue;
            };
            let Some(clip) = entry.region.clip(start, end - start) else {
                continue;
            };

            for survivor in [clip.front, clip.back].into_iter().flatten() {
                self.insert_entry(CachedEntry {
                    sequence: entry.sequence,
                    region: survivor,
                });
            }
        }
    }

    /// Drop all cached coverage at or behind `position`
    pub fn remove_regions_from(&mut self, position: u64) {
        self.remove_regions_in_range(position, u64::MAX - position);
    }

    /// Drop all cached regions
    pub fn clear(&mut self) {
        self.regions.clear();
        self.insertion_order.clear();
        self.current_size = 0;
    }

    fn overlapping_entries(&self, start: u64, end: u64) -> impl Iterator<Item = &CachedEntry> {
        let leading = self
            .regions
            .range(..start)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(move |entry| entry.region.end() > start);

        let inside = self
            .regions
            .range(start..end)
            .map(|(_, entry)| entry);

        leading.into_iter().chain(inside)
    }

    fn push_gaps(&self, tiling: &mut Vec<MediumRegion>, start: u64, size: u64) {
        tiling.extend(
            chunk_range(start, size, self.max_region_size)
                .map(|(gap_start, gap_size)| MediumRegion::gap(gap_start, gap_size)),
        );
    }

    fn insert_entry(&mut self, entry: CachedEntry) {
        let start = entry.region.start();
        self.current_size += entry.region.size();
        self.insertion_order.insert((entry.sequence, start));
        self.regions.insert(start, entry);
    }

    fn remove_entry(&mut self, start: u64) -> Option<CachedEntry> {
        let entry = self.regions.remove(&start)?;
        self.insertion_order.remove(&(entry.sequence, start));
        self.current_size -= entry.region.size();
        Some(entry)
    }

    fn evict_to_budget(&mut self) {
        while self.current_size > self.max_cache_size {
            let Some((_, start)) = self.insertion_order.pop_first() else {
                break;
            };
            if let Some(entry) = self.regions.remove(&start) {
                self.current_size -= entry.region.size();
                debug!(
                    "Evicted cached region [{}, {})",
                    entry.region.start(),
                    entry.region.end()
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    fn filled(start: u64, size: usize) -> MediumRegion {
        let content: Vec<u8> = (0..size).map(|i| (start as usize + i) as u8).collect();
        MediumRegion::cached(start, Bytes::from(content)).unwrap()
    }

    fn spans(cache: &MediumCache) -> Vec<(u64, u64)> {
        cache
            .all_regions()
            .iter()
            .map(|r| (r.start(), r.end()))
            .collect()
    }

    fn assert_invariants(cache: &MediumCache) {
        let regions = cache.all_regions();
        let total: usize = regions.iter().map(MediumRegion::size).sum();

        assert_eq!(total, cache.current_size());
        assert!(total <= cache.max_cache_size());
        for region in &regions {
            assert!(region.size() <= cache.max_region_size());
            assert!(region.is_cached());
            assert_eq!(region.size(), region.bytes().unwrap().len());
        }
        for pair in regions.windows(2) {
            assert!(pair[0].end() <= pair[1].start());
        }
    }

    #[test]
    fn test_new_validates_sizes() {
        assert!(MediumCache::new(100, 0).is_err());
        assert!(MediumCache::new(40, 50).is_err());
        assert!(MediumCache::new(50, 50).is_ok());
    }

    #[test]
    fn test_add_region_splits_into_chunks() {
        let mut cache = MediumCache::new(100, 50).unwrap();
        cache.add_region(&filled(0, 60)).unwrap();

        assert_eq!(spans(&cache), vec![(0, 50), (50, 60)]);
        assert_eq!(cache.current_size(), 60);
        assert_invariants(&cache);
    }

    #[test]
    fn test_fifo_eviction_by_insertion() {
        let mut cache = MediumCache::new(100, 50).unwrap();
        cache.add_region(&filled(0, 60)).unwrap();
        cache.add_region(&filled(200, 40)).unwrap();

        assert_eq!(cache.current_size(), 100);
        assert_eq!(cache.len(), 3);

        cache.add_region(&filled(300, 10)).unwrap();

        assert_eq!(spans(&cache), vec![(50, 60), (200, 240), (300, 310)]);
        assert_eq!(cache.current_size(), 60);
        assert_invariants(&cache);
    }

    #[test]
    fn test_oversized_region_keeps_its_tail() {
        let mut cache = MediumCache::new(100, 50).unwrap();
        cache.add_region(&filled(0, 230)).unwrap();

        assert_eq!(spans(&cache), vec![(150, 200), (200, 230)]);
        assert_eq!(cache.current_size(), 80);
        assert_invariants(&cache);
    }

    #[test]
    fn test_add_region_without_content_fails() {
        let mut cache = MediumCache::new(100, 50).unwrap();
        let gap = MediumRegion::uncached(0, 10).unwrap();

        assert!(matches!(
            cache.add_region(&gap),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_content_wins_over_overlapping_regions() {
        let mut cache = MediumCache::new(1000, 100).unwrap();
        cache.add_region(&filled(0, 40)).unwrap();

        let replacement = MediumRegion::cached(10, Bytes::from(vec![0xAA; 20])).unwrap();
        cache.add_region(&replacement).unwrap();

        assert_eq!(spans(&cache), vec![(0, 10), (10, 30), (30, 40)]);
        let regions = cache.all_regions();
        assert_eq!(regions[0].bytes().unwrap().as_ref(), &filled(0, 10).bytes().unwrap()[..]);
        assert_eq!(regions[1].bytes().unwrap().as_ref(), &[0xAA; 20][..]);
        assert_eq!(regions[2].bytes().unwrap()[0], 30);
        assert_eq!(cache.current_size(), 40);
        assert_invariants(&cache);
    }

    #[test]
    fn test_clip_survivors_keep_insertion_rank() {
        let mut cache = MediumCache::new(100, 100).unwrap();
        cache.add_region(&filled(0, 60)).unwrap();
        cache.add_region(&filled(100, 20)).unwrap();
        // Cuts [20, 30) out of the oldest region
        cache.add_region(&filled(20, 10)).unwrap();
        assert_eq!(cache.current_size(), 80);

        // Overflows by 30: both survivors of the oldest region go first
        cache.add_region(&filled(200, 50)).unwrap();

        assert_eq!(spans(&cache), vec![(20, 30), (100, 120), (200, 250)]);
        assert_invariants(&cache);
    }

    #[test]
    fn test_regions_in_range_on_empty_cache() {
        let cache = MediumCache::new(100, 30).unwrap();
        let tiling = cache.regions_in_range(10, 70);

        let spans: Vec<_> = tiling.iter().map(|r| (r.start(), r.end())).collect();
        assert_eq!(spans, vec![(10, 40), (40, 70), (70, 80)]);
        assert!(tiling.iter().all(|r| !r.is_cached()));
        assert!(cache.regions_in_range(10, 0).is_empty());
    }

    #[test]
    fn test_regions_in_range_mixes_hits_and_gaps() {
        let mut cache = MediumCache::new(1000, 100).unwrap();
        cache.add_region(&filled(0, 20)).unwrap();
        cache.add_region(&filled(50, 20)).unwrap();

        let tiling = cache.regions_in_range(10, 70);
        let spans: Vec<_> = tiling
            .iter()
            .map(|r| (r.start(), r.end(), r.is_cached()))
            .collect();

        assert_eq!(
            spans,
            vec![(0, 20, true), (20, 50, false), (50, 70, true), (70, 80, false)]
        );
    }

    #[test]
    fn test_cached_byte_count_walks_adjacent_regions() {
        let mut cache = MediumCache::new(1000, 10).unwrap();
        cache.add_region(&filled(0, 25)).unwrap();
        cache.add_region(&filled(40, 5)).unwrap();

        assert_eq!(cache.cached_byte_count_at(0), 25);
        assert_eq!(cache.cached_byte_count_at(12), 13);
        assert_eq!(cache.cached_byte_count_at(25), 0);
        assert_eq!(cache.cached_byte_count_at(42), 3);
        assert_eq!(cache.cached_byte_count_at(100), 0);
    }

    #[test]
    fn test_remove_regions_in_range_keeps_outside_parts() {
        let mut cache = MediumCache::new(1000, 100).unwrap();
        cache.add_region(&filled(0, 50)).unwrap();
        cache.add_region(&filled(60, 20)).unwrap();

        cache.remove_regions_in_range(40, 30);

        assert_eq!(spans(&cache), vec![(0, 40), (70, 80)]);
        assert_eq!(cache.current_size(), 50);
        assert_eq!(cache.all_regions()[1].bytes().unwrap()[0], 70);
        assert_invariants(&cache);

        cache.remove_regions_from(10);
        assert_eq!(spans(&cache), vec![(0, 10)]);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }

    proptest! {
        #[test]
        fn invariants_hold_under_random_adds(
            ops in proptest::collection::vec((0u64..500, 1usize..120, any::<bool>()), 1..40)
        ) {
            let mut cache = MediumCache::new(256, 32).unwrap();
            for (start, size, remove) in ops {
                if remove {
                    cache.remove_regions_in_range(start, size as u64);
                } else {
                    cache.add_region(&filled(start, size)).unwrap();
                }
                assert_invariants(&cache);
            }
        }

        #[test]
        fn regions_in_range_tiles_exactly(
            adds in proptest::collection::vec((0u64..300, 1usize..80), 0..10),
            start in 0u64..400,
            size in 1u64..200
        ) {
            let mut cache = MediumCache::new(512, 32).unwrap();
            for (add_start, add_size) in adds {
                cache.add_region(&filled(add_start, add_size)).unwrap();
            }

            let tiling = cache.regions_in_range(start, size);
            prop_assert!(!tiling.is_empty());
            prop_assert!(tiling[0].start() <= start);
            prop_assert!(tiling[tiling.len() - 1].end() >= start + size);
            for pair in tiling.windows(2) {
                prop_assert_eq!(pair[0].end(), pair[1].start());
            }
            for region in &tiling {
                prop_assert!(region.size() <= 32);
            }
        }
    }
}
