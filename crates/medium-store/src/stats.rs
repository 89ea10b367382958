//! Store statistics

#![allow(clippy::cast_precision_loss)] // Ratios accept precision loss

use serde::Serialize;

/// Counters of one store, reset on every open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Raw reads issued to the accessor
    pub accessor_reads: u64,
    /// Bytes obtained from the accessor
    pub bytes_read: u64,
    /// Cached regions used to serve a read
    pub cache_hits: u64,
    /// Gap regions that had to be fetched from the medium
    pub cache_misses: u64,
    /// Completed flushes
    pub flushes: u64,
    /// Actions written to the medium
    pub actions_applied: u64,
}

impl StoreStats {
    /// Fraction of regions served from the cache, 0.0 without any lookup
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub(crate) fn record_read(&mut self, bytes: usize) {
        self.accessor_reads += 1;
        self.bytes_read += bytes as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let mut stats = StoreStats::default();
        assert!(stats.hit_ratio().abs() < f64::EPSILON);

        stats.cache_hits = 3;
        stats.cache_misses = 1;
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_read() {
        let mut stats = StoreStats::default();
        stats.record_read(10);
        stats.record_read(5);

        assert_eq!(stats.accessor_reads, 2);
        assert_eq!(stats.bytes_read, 15);
    }
}
