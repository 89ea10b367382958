//! Byte ranges on a medium, optionally carrying cached content

use crate::error::{Result, StoreError};
use bytes::Bytes;
use std::fmt;

/// Relationship between two regions, always read as "left relative to right"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionOverlap {
    /// The regions share no byte
    NoOverlap,
    /// Both regions cover exactly the same range
    SameRange,
    /// Left lies completely inside right
    LeftFullyInsideRight,
    /// Right lies completely inside left
    RightFullyInsideLeft,
    /// Left starts first and its back overlaps the front of right
    LeftOverlapsRightAtFront,
    /// Right starts first and left overlaps its back
    LeftOverlapsRightAtBack,
}

impl RegionOverlap {
    /// Classify `[left_start, left_end)` against `[right_start, right_end)`
    pub fn classify(left_start: u64, left_end: u64, right_start: u64, right_end: u64) -> Self {
        let overlap_start = left_start.max(right_start);
        let overlap_end = left_end.min(right_end);

        if overlap_end <= overlap_start {
            Self::NoOverlap
        } else if left_start == right_start && left_end == right_end {
            Self::SameRange
        } else if right_start <= left_start && left_end <= right_end {
            Self::LeftFullyInsideRight
        } else if left_start <= right_start && right_end <= left_end {
            Self::RightFullyInsideLeft
        } else if left_start < right_start {
            Self::LeftOverlapsRightAtFront
        } else {
            Self::LeftOverlapsRightAtBack
        }
    }
}

/// A region clipped against a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionClip {
    /// Part of the region before the range
    pub front: Option<MediumRegion>,
    /// Part of the region inside the range
    pub overlapping: MediumRegion,
    /// Part of the region behind the range
    pub back: Option<MediumRegion>,
}

/// A byte range `[start, start + size)`, cached iff it carries content
#[derive(Clone, PartialEq, Eq)]
pub struct MediumRegion {
    start: u64,
    size: usize,
    bytes: Option<Bytes>,
}

impl MediumRegion {
    /// A region without content
    pub fn uncached(start: u64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(StoreError::invalid_argument("region size must be greater than 0"));
        }
        Ok(Self::gap(start, size))
    }

    /// A region carrying the given content
    pub fn cached(start: u64, bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(StoreError::invalid_argument("cached region must not be empty"));
        }
        Ok(Self::with_bytes(start, bytes))
    }

    pub(crate) const fn gap(start: u64, size: usize) -> Self {
        Self {
            start,
            size,
            bytes: None,
        }
    }

    pub(crate) fn with_bytes(start: u64, bytes: Bytes) -> Self {
        Self {
            start,
            size: bytes.len(),
            bytes: Some(bytes),
        }
    }

    /// First absolute position of the region
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Number of bytes covered
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Position right behind the last byte
    pub const fn end(&self) -> u64 {
        self.start + self.size as u64
    }

    /// Cached content, if any
    pub const fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    /// Whether the region carries content
    pub const fn is_cached(&self) -> bool {
        self.bytes.is_some()
    }

    /// Whether `position` lies inside the region
    pub const fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end()
    }

    /// Classify this region (left) against `other` (right)
    pub fn overlap_with(&self, other: &Self) -> RegionOverlap {
        RegionOverlap::classify(self.start, self.end(), other.start, other.end())
    }

    /// Number of bytes shared with `other`
    pub fn overlapping_byte_count(&self, other: &Self) -> usize {
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        end.saturating_sub(start) as usize
    }

    /// Split into two adjoining regions at an interior position
    pub fn split(&self, at: u64) -> Result<(Self, Self)> {
        if at <= self.start || at >= self.end() {
            return Err(StoreError::invalid_argument(format!(
                "split position {at} is not inside ({}, {})",
                self.start,
                self.end()
            )));
        }
        Ok((self.sub_region(self.start, at), self.sub_region(at, self.end())))
    }

    /// Clip against the range `[range_start, range_start + range_size)`,
    /// `None` if the region does not overlap the range
    pub fn clip(&self, range_start: u64, range_size: u64) -> Option<RegionClip> {
        let range_end = range_start.saturating_add(range_size);
        let overlap_start = self.start.max(range_start);
        let overlap_end = self.end().min(range_end);

        if overlap_end <= overlap_start {
            return None;
        }

        let front = (self.start < overlap_start).then(|| self.sub_region(self.start, overlap_start));
        let back = (overlap_end < self.end()).then(|| self.sub_region(overlap_end, self.end()));

        Some(RegionClip {
            front,
            overlapping: self.sub_region(overlap_start, overlap_end),
            back,
        })
    }

    /// Sub-range `[from, to)`; callers guarantee it lies inside the region
    fn sub_region(&self, from: u64, to: u64) -> Self {
        let size = (to - from) as usize;
        match &self.bytes {
            Some(bytes) => {
                let skip = (from - self.start) as usize;
                Self::with_bytes(from, bytes.slice(skip..skip + size))
            }
            None => Self::gap(from, size),
        }
    }
}

impl fmt::Debug for MediumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MediumRegion[{}, {}) size={} cached={}",
            self.start,
            self.end(),
            self.size,
            self.is_cached()
        )
    }
}

/// Divide `[start, start + size)` into consecutive chunks of at most `chunk_size` bytes
pub(crate) fn chunk_range(start: u64, size: u64, chunk_size: usize) -> impl Iterator<Item = (u64, usize)> {
    let chunk = chunk_size.max(1) as u64;
    let end = start + size;
    (0..size.div_ceil(chunk)).map(move |index| {
        let chunk_start = start + index * chunk;
        (chunk_start, (end - chunk_start).min(chunk) as usize)
    })
}
