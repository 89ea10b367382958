//! The medium store facade
//!
//! A [`MediumStore`] owns the accessor, the read cache, the offset arena and
//! the pending edits of one medium. Reads are served from the cache where
//! possible and populate it otherwise. Edits are only recorded until
//! [`MediumStore::flush`] writes them and rebases every tracked offset.

use crate::accessor::{MediumAccessor, accessor_for};
use crate::action::{ActionHandle, ActionKind, MediumAction};
use crate::cache::MediumCache;
use crate::change::ChangeManager;
use crate::config::StoreConfig;
use crate::error::{EndOfMedium, Result, StoreError};
use crate::medium::Medium;
use crate::offset::{MediumOffset, OffsetFactory};
use crate::region::{MediumRegion, chunk_range};
use crate::stats::StoreStats;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A store behind one coarse lock, for sharing between threads
pub type SharedMediumStore = Arc<Mutex<MediumStore>>;

/// Cached, transactional access to one medium
pub struct MediumStore {
    medium: Medium,
    config: StoreConfig,
    accessor: Box<dyn MediumAccessor>,
    cache: MediumCache,
    offsets: OffsetFactory,
    changes: ChangeManager,
    stats: StoreStats,
    opened: bool,
}

impl MediumStore {
    /// Create a closed store for `medium`
    pub fn new(medium: Medium, config: StoreConfig) -> Result<Self> {
        let accessor = accessor_for(&medium);
        Self::with_accessor(accessor, config)
    }

    /// Create a closed store on top of a custom accessor
    pub fn with_accessor(accessor: Box<dyn MediumAccessor>, config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::InvalidConfiguration)?;

        let cache = MediumCache::new(config.max_cache_size, config.max_cache_region_size)?;
        let offsets = OffsetFactory::new();
        let changes = ChangeManager::new(offsets.session());

        Ok(Self {
            medium: accessor.medium().clone(),
            config,
            accessor,
            cache,
            offsets,
            changes,
            stats: StoreStats::default(),
            opened: false,
        })
    }

    /// Wrap the store into a [`SharedMediumStore`]
    pub fn into_shared(self) -> SharedMediumStore {
        Arc::new(Mutex::new(self))
    }

    /// The medium of this store
    pub const fn medium(&self) -> &Medium {
        &self.medium
    }

    /// The configuration of this store
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Counters since the last open
    pub const fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Whether the store is opened
    pub const fn is_opened(&self) -> bool {
        self.opened
    }

    /// Open the medium
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(StoreError::AlreadyOpen);
        }

        self.accessor.open()?;
        self.opened = true;
        self.stats = StoreStats::default();

        info!("Opened medium store for {}", self.medium);
        Ok(())
    }

    /// Close the medium, dropping the cache, all offsets and all pending edits
    pub fn close(&mut self) -> Result<()> {
        self.ensure_opened()?;

        let pending = self.changes.pending_count();
        if pending > 0 {
            warn!("Closing {} with {} unflushed actions", self.medium, pending);
        }

        self.cache.clear();
        self.offsets.clear();
        self.changes.clear();
        self.opened = false;
        self.accessor.close()?;

        info!("Closed medium store for {}", self.medium);
        Ok(())
    }

    /// Whether no byte exists at `offset`; streams ignore the offset and
    /// report whether they are exhausted
    pub fn is_at_end_of_medium(&mut self, offset: MediumOffset) -> Result<bool> {
        self.ensure_opened()?;

        if !self.medium.is_random_access() {
            let position = self.accessor.position();
            return self.accessor.is_at_end(position);
        }
        let index = self.offsets.index_of(offset)?;
        self.accessor.is_at_end(index)
    }

    /// Mint a tracked offset at `index`
    pub fn create_offset(&mut self, index: u64) -> Result<MediumOffset> {
        self.ensure_opened()?;
        Ok(self.offsets.create_offset(index))
    }

    /// Mint a tracked offset `count` bytes away from `offset`
    pub fn advance_offset(&mut self, offset: MediumOffset, count: i64) -> Result<MediumOffset> {
        self.ensure_opened()?;
        self.offsets.advance(offset, count)
    }

    /// Current absolute index of a tracked offset
    pub fn offset_index(&self, offset: MediumOffset) -> Result<u64> {
        self.ensure_opened()?;
        self.offsets.index_of(offset)
    }

    /// The offset arena, for ordering and range queries
    pub const fn offsets(&self) -> &OffsetFactory {
        &self.offsets
    }

    /// Make sure `[offset, offset + size)` is cached.
    ///
    /// Only uncached parts are read from the medium. Does nothing when
    /// caching is disabled.
    pub fn cache(&mut self, offset: MediumOffset, size: usize) -> Result<()> {
        self.ensure_opened()?;
        let index = self.read_start(offset, size)?;

        if !self.config.caching_enabled {
            debug!("Caching disabled, not caching [{}, +{})", index, size);
            return Ok(());
        }

        self.collect_regions(index, size)?;
        Ok(())
    }

    /// Get exactly `size` bytes at `offset`, preferring cached content
    pub fn get_data(&mut self, offset: MediumOffset, size: usize) -> Result<Bytes> {
        self.ensure_opened()?;
        let index = self.read_start(offset, size)?;

        let regions = self.collect_regions(index, size)?;
        Ok(assemble(&regions, index, size))
    }

    /// Number of contiguously cached bytes starting at `offset`
    pub fn cached_byte_count_at(&self, offset: MediumOffset) -> Result<u64> {
        self.ensure_opened()?;
        let index = self.offsets.index_of(offset)?;
        Ok(self.cache.cached_byte_count_at(index))
    }

    /// All cached regions in position order
    pub fn cached_regions(&self) -> Vec<MediumRegion> {
        self.cache.all_regions()
    }

    /// Number of cached bytes
    pub const fn cache_size(&self) -> usize {
        self.cache.current_size()
    }

    /// Schedule inserting `bytes` before `offset`
    pub fn insert_data(&mut self, offset: MediumOffset, bytes: impl Into<Bytes>) -> Result<ActionHandle> {
        self.ensure_writable()?;
        let index = self.offsets.index_of(offset)?;
        self.check_within_medium(index, 0)?;

        self.changes.schedule_insert(offset, index, bytes.into())
    }

    /// Schedule removing `length` bytes at `offset`
    pub fn remove_data(&mut self, offset: MediumOffset, length: u64) -> Result<ActionHandle> {
        self.ensure_writable()?;
        let index = self.offsets.index_of(offset)?;
        self.check_within_medium(index, length)?;

        self.changes.schedule_remove(offset, index, length)
    }

    /// Schedule replacing `length` bytes at `offset` by `bytes`
    pub fn replace_data(
        &mut self,
        offset: MediumOffset,
        length: u64,
        bytes: impl Into<Bytes>,
    ) -> Result<ActionHandle> {
        self.ensure_writable()?;
        let index = self.offsets.index_of(offset)?;
        self.check_within_medium(index, length)?;

        self.changes.schedule_replace(offset, index, length, bytes.into())
    }

    /// Discard a pending action
    pub fn undo(&mut self, action: ActionHandle) -> Result<()> {
        self.ensure_opened()?;
        self.changes.undo(action)
    }

    /// Look up a scheduled action
    pub fn action(&self, action: ActionHandle) -> Result<&MediumAction> {
        self.ensure_opened()?;
        self.changes.action(action)
    }

    /// Pending actions in the order the next flush applies them
    pub fn pending_actions(&self) -> Vec<MediumAction> {
        self.changes.pending_in_flush_order()
    }

    /// Write all pending actions to the medium.
    ///
    /// Actions are applied by ascending start. After each action every
    /// tracked offset is rebased and cached content at or behind the edit is
    /// dropped, the written bytes themselves stay cached.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_writable()?;

        let actions = self.changes.pending_in_flush_order();
        for action in &actions {
            let start = self.offsets.index_of(action.start())?;
            let removed = action.length();
            let inserted = action.bytes().len() as u64;

            self.apply_to_medium(action, start)?;
            self.update_cache(action, start)?;
            self.offsets
                .update_offsets(action.kind(), start, removed, inserted);
            self.changes.mark_applied(action.handle())?;
            self.stats.actions_applied += 1;
        }

        self.accessor.sync()?;
        self.stats.flushes += 1;

        info!("Flushed {} actions to {}", actions.len(), self.medium);
        Ok(())
    }

    fn ensure_opened(&self) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_opened()?;
        if self.medium.is_read_only() {
            return Err(StoreError::ReadOnlyMedium(self.medium.to_string()));
        }
        Ok(())
    }

    fn read_start(&self, offset: MediumOffset, size: usize) -> Result<u64> {
        if size == 0 {
            return Err(StoreError::invalid_argument("read size must be greater than 0"));
        }
        let index = self.offsets.index_of(offset)?;
        range_end(index, size as u64)?;
        Ok(index)
    }

    fn check_within_medium(&self, index: u64, length: u64) -> Result<()> {
        let end = range_end(index, length)?;
        if let Some(medium_length) = self.accessor.length() {
            if end > medium_length {
                return Err(StoreError::invalid_argument(format!(
                    "range [{index}, {end}) exceeds medium length {medium_length}"
                )));
            }
        }
        Ok(())
    }

    /// Regions covering `[index, index + size)`, all carrying content
    ///
    /// With a known medium length only the bytes up to its end are tiled.
    fn collect_regions(&mut self, index: u64, size: usize) -> Result<Vec<MediumRegion>> {
        let mut available = size;
        if let Some(length) = self.accessor.length() {
            if index > length {
                return Err(EndOfMedium::empty(index, size).into());
            }
            available = usize::try_from(length - index).map_or(size, |left| left.min(size));
        }

        let tiling = self.cache.regions_in_range(index, available as u64);
        let mut filled = Vec::with_capacity(tiling.len());

        for region in tiling {
            if region.is_cached() {
                self.stats.cache_hits += 1;
                filled.push(region);
                continue;
            }
            self.stats.cache_misses += 1;

            let fetched = if self.medium.is_random_access() {
                self.read_from_medium(region.start(), region.size())
            } else {
                self.skip_stream_to(region.start())
                    .and_then(|()| self.read_from_medium(region.start(), region.size()))
            };

            match fetched {
                Ok(bytes) => {
                    let fetched = MediumRegion::with_bytes(region.start(), bytes);
                    self.remember(&fetched)?;
                    filled.push(fetched);
                }
                Err(StoreError::EndOfMedium(eom)) => {
                    if !eom.partial.is_empty() && eom.offset == region.start() {
                        let partial = MediumRegion::with_bytes(region.start(), eom.partial);
                        self.remember(&partial)?;
                        filled.push(partial);
                    }
                    let available = assemble(&filled, index, size);
                    return Err(EndOfMedium::with_partial(index, size, available).into());
                }
                Err(error) => return Err(error),
            }
        }

        if available < size {
            let partial = assemble(&filled, index, available);
            return Err(EndOfMedium::with_partial(index, size, partial).into());
        }
        Ok(filled)
    }

    /// Move a stream forward to `target`, caching the skipped bytes
    fn skip_stream_to(&mut self, target: u64) -> Result<()> {
        let position = self.accessor.position();
        if target < position {
            return Err(StoreError::InvalidMediumOffset {
                offset: target,
                reason: format!("stream already passed it and is positioned at {position}"),
            });
        }

        for (start, size) in chunk_range(position, target - position, self.config.max_cache_region_size) {
            match self.read_from_medium(start, size) {
                Ok(bytes) => self.remember(&MediumRegion::with_bytes(start, bytes))?,
                Err(StoreError::EndOfMedium(eom)) => {
                    if !eom.partial.is_empty() {
                        self.remember(&MediumRegion::with_bytes(start, eom.partial.clone()))?;
                    }
                    return Err(StoreError::EndOfMedium(eom));
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Read `size` bytes at `start` block-wise, bypassing the cache
    fn read_from_medium(&mut self, start: u64, size: usize) -> Result<Bytes> {
        let block_size = self.config.max_read_write_block_size;
        if size <= block_size {
            return self.read_block(start, size);
        }

        let mut data = BytesMut::with_capacity(size);
        for (block_start, block_len) in chunk_range(start, size as u64, block_size) {
            match self.read_block(block_start, block_len) {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(StoreError::EndOfMedium(eom)) => {
                    data.extend_from_slice(&eom.partial);
                    return Err(EndOfMedium::with_partial(start, size, data.freeze()).into());
                }
                Err(error) => return Err(error),
            }
        }
        Ok(data.freeze())
    }

    fn read_block(&mut self, start: u64, size: usize) -> Result<Bytes> {
        let result = self.accessor.read_at(start, size);
        match &result {
            Ok(bytes) => self.stats.record_read(bytes.len()),
            Err(StoreError::EndOfMedium(eom)) => self.stats.record_read(eom.bytes_read),
            Err(_) => {}
        }
        result
    }

    fn remember(&mut self, region: &MediumRegion) -> Result<()> {
        if self.config.caching_enabled {
            self.cache.add_region(region)?;
        }
        Ok(())
    }

    /// Shift the tail behind the affected range and write the new bytes
    fn apply_to_medium(&mut self, action: &MediumAction, start: u64) -> Result<()> {
        let old_length = self.accessor.length().ok_or_else(|| {
            StoreError::invalid_argument(format!("length of {} is unknown", self.medium))
        })?;
        let removed = action.length();
        let inserted = action.bytes().len() as u64;

        let tail_start = (start + removed).min(old_length);
        let tail_length = old_length - tail_start;
        let blocks: Vec<_> =
            chunk_range(tail_start, tail_length, self.config.max_read_write_block_size).collect();

        if inserted > removed {
            let shift = inserted - removed;
            for &(from, size) in blocks.iter().rev() {
                let data = self.read_block(from, size)?;
                self.accessor.write_at(from + shift, &data)?;
            }
        } else if inserted < removed {
            let shift = removed - inserted;
            for &(from, size) in &blocks {
                let data = self.read_block(from, size)?;
                self.accessor.write_at(from - shift, &data)?;
            }
        }

        if inserted > 0 {
            self.accessor.write_at(start, action.bytes())?;
        }
        if removed > inserted {
            self.accessor.truncate(old_length - (removed - inserted))?;
        }

        debug!("Applied {} at {}", action, start);
        Ok(())
    }

    fn update_cache(&mut self, action: &MediumAction, start: u64) -> Result<()> {
        match action.kind() {
            ActionKind::Insert | ActionKind::Remove => self.cache.remove_regions_from(start),
            ActionKind::Replace if action.length_delta() != 0 => {
                self.cache.remove_regions_from(start);
            }
            ActionKind::Replace => self.cache.remove_regions_in_range(start, action.length()),
        }

        if !action.bytes().is_empty() {
            self.remember(&MediumRegion::with_bytes(start, action.bytes().clone()))?;
        }
        Ok(())
    }
}

/// Concatenate the content of `regions` clipped to `[start, start + size)`
fn assemble(regions: &[MediumRegion], start: u64, size: usize) -> Bytes {
    let end = start.saturating_add(size as u64);

    if let [single] = regions {
        if let Some(bytes) = single.bytes() {
            if single.start() <= start && single.end() >= end {
                let from = (start - single.start()) as usize;
                return bytes.slice(from..from + size);
            }
        }
    }

    let cached: usize = regions.iter().filter(|r| r.is_cached()).map(MediumRegion::size).sum();
    let mut data = BytesMut::with_capacity(cached.min(size));
    for region in regions {
        if let Some(bytes) = region
            .clip(start, size as u64)
            .and_then(|clip| clip.overlapping.bytes().cloned())
        {
            data.extend_from_slice(&bytes);
        }
    }
    data.freeze()
}

/// End of `[index, index + length)`, rejecting ranges past the index space
fn range_end(index: u64, length: u64) -> Result<u64> {
    index.checked_add(length).ok_or_else(|| {
        StoreError::invalid_argument(format!(
            "range of {length} bytes at {index} exceeds the addressable medium"
        ))
    })
}

impl Drop for MediumStore {
    fn drop(&mut self) {
        if self.opened {
            if let Err(e) = self.accessor.close() {
                warn!("Failed to close {} on drop: {e}", self.medium);
            }
        }
    }
}

impl fmt::Debug for MediumStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediumStore")
            .field("medium", &self.medium)
            .field("opened", &self.opened)
            .field("cache_size", &self.cache.current_size())
            .field("offsets", &self.offsets.len())
            .field("pending", &self.changes.pending_count())
            .finish_non_exhaustive()
    }
}
