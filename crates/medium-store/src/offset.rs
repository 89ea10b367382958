//! Tracked logical positions on a medium
//!
//! Offsets are minted by an [`OffsetFactory`] and live in its arena. Callers
//! only hold a [`MediumOffset`] handle and read the current absolute index
//! through the factory (or the store owning it). Flushing an edit rebases
//! every tracked index in place, so all handle holders observe the shift.
//!
//! Handles carry the session they were minted in and the factory epoch.
//! Using a handle of another session is a [`StoreError::ForeignMedium`]
//! error, using one that was cleared (store closed and reopened) is a
//! [`StoreError::UnknownOffset`] error.

use crate::action::ActionKind;
use crate::error::{Result, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Handle of an offset tracked by an [`OffsetFactory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediumOffset {
    session: u64,
    epoch: u64,
    id: u64,
}

impl MediumOffset {
    /// Creation sequence number within the factory
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Session of the factory that minted this handle
    pub const fn session(&self) -> u64 {
        self.session
    }
}

impl fmt::Display for MediumOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset#{}@{}.{}", self.id, self.session, self.epoch)
    }
}

/// New index of a tracked offset at `index` after an edit at `start`
/// replacing `removed` bytes by `inserted` bytes was applied.
///
/// - INSERT: indices at or behind `start` move by `inserted`.
/// - REMOVE: indices at or behind `start + removed` move back by `removed`,
///   indices strictly inside the removed range collapse to `start`.
/// - REPLACE: indices at or behind `start + removed` move by the length
///   difference, indices inside the replaced range stay put.
pub fn rebase_index(index: u64, kind: ActionKind, start: u64, removed: u64, inserted: u64) -> u64 {
    let end = start + removed;
    match kind {
        ActionKind::Insert if index >= start => index + inserted,
        ActionKind::Remove if index >= end => index - removed,
        ActionKind::Remove if index > start => start,
        ActionKind::Replace if index >= end => index - removed + inserted,
        _ => index,
    }
}

/// Arena of all offsets minted for one medium session
#[derive(Debug)]
pub struct OffsetFactory {
    session: u64,
    epoch: u64,
    next_id: u64,
    offsets: BTreeMap<u64, u64>,
}

impl Default for OffsetFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetFactory {
    /// Create an empty factory with a fresh session id
    pub fn new() -> Self {
        Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
            next_id: 0,
            offsets: BTreeMap::new(),
        }
    }

    /// Session id stamped into every handle this factory mints
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Number of tracked offsets
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no offset is tracked
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Mint and register an offset at `index`
    pub fn create_offset(&mut self, index: u64) -> MediumOffset {
        let id = self.next_id;
        self.next_id += 1;
        self.offsets.insert(id, index);

        MediumOffset {
            session: self.session,
            epoch: self.epoch,
            id,
        }
    }

    /// Current absolute index of a tracked offset
    pub fn index_of(&self, offset: MediumOffset) -> Result<u64> {
        if offset.session != self.session {
            return Err(StoreError::ForeignMedium(format!(
                "{offset} was not created in session {}",
                self.session
            )));
        }
        if offset.epoch != self.epoch {
            return Err(StoreError::UnknownOffset(format!(
                "{offset} belongs to a closed store session"
            )));
        }
        self.offsets
            .get(&offset.id)
            .copied()
            .ok_or_else(|| StoreError::UnknownOffset(offset.to_string()))
    }

    /// Mint a new offset at `offset + count`
    pub fn advance(&mut self, offset: MediumOffset, count: i64) -> Result<MediumOffset> {
        let index = self.index_of(offset)?;
        let target = index.checked_add_signed(count).ok_or_else(|| {
            StoreError::invalid_argument(format!(
                "advancing index {index} by {count} leaves the medium"
            ))
        })?;
        Ok(self.create_offset(target))
    }

    /// Whether `left` lies strictly before `right`
    pub fn before(&self, left: MediumOffset, right: MediumOffset) -> Result<bool> {
        Ok(self.index_of(left)? < self.index_of(right)?)
    }

    /// Whether `left` lies at or behind `right`
    pub fn behind_or_equal(&self, left: MediumOffset, right: MediumOffset) -> Result<bool> {
        Ok(self.index_of(left)? >= self.index_of(right)?)
    }

    /// Signed distance `to - from`
    pub fn distance_to(&self, from: MediumOffset, to: MediumOffset) -> Result<i64> {
        let from = self.index_of(from)?;
        let to = self.index_of(to)?;
        let distance = i128::from(to) - i128::from(from);
        i64::try_from(distance)
            .map_err(|_| StoreError::invalid_argument("offset distance exceeds i64"))
    }

    /// All tracked offsets with their indices, ordered by index then creation
    pub fn all_offsets(&self) -> Vec<(MediumOffset, u64)> {
        let mut offsets: Vec<_> = self
            .offsets
            .iter()
            .map(|(&id, &index)| (self.handle(id), index))
            .collect();
        offsets.sort_by_key(|(offset, index)| (*index, offset.id));
        offsets
    }

    /// Offsets whose index is at or behind `position`
    pub fn all_offsets_behind_or_equal(&self, position: u64) -> Vec<MediumOffset> {
        self.all_offsets()
            .into_iter()
            .filter(|(_, index)| *index >= position)
            .map(|(offset, _)| offset)
            .collect()
    }

    /// Offsets inside `[start, start + size)`
    pub fn all_offsets_in_region(&self, start: u64, size: u64) -> Vec<MediumOffset> {
        let end = start.saturating_add(size);
        self.all_offsets()
            .into_iter()
            .filter(|(_, index)| *index >= start && *index < end)
            .map(|(offset, _)| offset)
            .collect()
    }

    /// Rebase every tracked offset after an applied edit
    pub fn update_offsets(&mut self, kind: ActionKind, start: u64, removed: u64, inserted: u64) {
        let mut moved = 0usize;
        for index in self.offsets.values_mut() {
            let rebased = rebase_index(*index, kind, start, removed, inserted);
            if rebased != *index {
                *index = rebased;
                moved += 1;
            }
        }
        debug!(
            "Rebased {} of {} offsets after {} at {} (-{} +{})",
            moved,
            self.offsets.len(),
            kind,
            start,
            removed,
            inserted
        );
    }

    /// Drop all tracked offsets; handles minted so far become unknown
    pub fn clear(&mut self) {
        self.offsets.clear();
        self.epoch += 1;
        self.next_id = 0;
    }

    const fn handle(&self, id: u64) -> MediumOffset {
        MediumOffset {
            session: self.session,
            epoch: self.epoch,
            id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn indices(factory: &OffsetFactory, offsets: &[MediumOffset]) -> Vec<u64> {
        offsets.iter().map(|o| factory.index_of(*o).unwrap()).collect()
    }

    #[test]
    fn test_insert_shifts_offsets_at_or_behind() {
        let mut factory = OffsetFactory::new();
        let offsets: Vec<_> = [0, 2, 3, 20, 50]
            .into_iter()
            .map(|i| factory.create_offset(i))
            .collect();

        factory.update_offsets(ActionKind::Insert, 3, 0, 4);

        assert_eq!(indices(&factory, &offsets), vec![0, 2, 7, 24, 54]);
    }

    #[test]
    fn test_remove_collapses_interior_offsets() {
        let mut factory = OffsetFactory::new();
        let offsets: Vec<_> = [0, 16, 20, 26, 30]
            .into_iter()
            .map(|i| factory.create_offset(i))
            .collect();

        factory.update_offsets(ActionKind::Remove, 16, 10, 0);

        assert_eq!(indices(&factory, &offsets), vec![0, 16, 16, 16, 20]);
    }

    #[test]
    fn test_replace_keeps_interior_offsets() {
        let mut factory = OffsetFactory::new();
        let offsets: Vec<_> = [5, 10, 15, 20, 40]
            .into_iter()
            .map(|i| factory.create_offset(i))
            .collect();

        factory.update_offsets(ActionKind::Replace, 10, 10, 3);

        assert_eq!(indices(&factory, &offsets), vec![5, 10, 15, 13, 33]);
    }

    #[test]
    fn test_advance_and_comparisons() {
        let mut factory = OffsetFactory::new();
        let base = factory.create_offset(10);
        let ahead = factory.advance(base, 5).unwrap();
        let back = factory.advance(base, -10).unwrap();

        assert_eq!(factory.index_of(ahead).unwrap(), 15);
        assert_eq!(factory.index_of(back).unwrap(), 0);
        assert!(factory.before(base, ahead).unwrap());
        assert!(!factory.before(ahead, base).unwrap());
        assert!(factory.behind_or_equal(base, base).unwrap());
        assert_eq!(factory.distance_to(ahead, back).unwrap(), -15);
        assert_eq!(factory.distance_to(back, ahead).unwrap(), 15);

        assert!(matches!(
            factory.advance(base, -11),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_foreign_and_cleared_offsets_are_rejected() {
        let mut first = OffsetFactory::new();
        let second = OffsetFactory::new();
        let offset = first.create_offset(3);

        assert!(matches!(
            second.index_of(offset),
            Err(StoreError::ForeignMedium(_))
        ));

        first.clear();
        assert!(first.is_empty());
        assert!(matches!(
            first.index_of(offset),
            Err(StoreError::UnknownOffset(_))
        ));

        // Fresh handles after a clear never alias stale ones
        let fresh = first.create_offset(3);
        assert_eq!(fresh.id(), offset.id());
        assert_ne!(fresh, offset);
    }

    #[test]
    fn test_queries_are_ordered_by_index_then_creation() {
        let mut factory = OffsetFactory::new();
        let a = factory.create_offset(20);
        let b = factory.create_offset(5);
        let c = factory.create_offset(20);
        let d = factory.create_offset(12);

        let all: Vec<_> = factory.all_offsets().into_iter().map(|(o, _)| o).collect();
        assert_eq!(all, vec![b, d, a, c]);

        assert_eq!(factory.all_offsets_behind_or_equal(12), vec![d, a, c]);
        assert_eq!(factory.all_offsets_in_region(5, 15), vec![b, d]);
        assert_eq!(factory.len(), 4);
    }

    proptest! {
        #[test]
        fn insert_rule_holds(index in 0u64..1000, start in 0u64..1000, inserted in 1u64..100) {
            let rebased = rebase_index(index, ActionKind::Insert, start, 0, inserted);
            if index >= start {
                prop_assert_eq!(rebased, index + inserted);
            } else {
                prop_assert_eq!(rebased, index);
            }
        }

        #[test]
        fn remove_rule_holds(index in 0u64..1000, start in 0u64..1000, removed in 1u64..100) {
            let rebased = rebase_index(index, ActionKind::Remove, start, removed, 0);
            if index >= start + removed {
                prop_assert_eq!(rebased, index - removed);
            } else if index > start {
                prop_assert_eq!(rebased, start);
            } else {
                prop_assert_eq!(rebased, index);
            }
        }

        #[test]
        fn rebasing_preserves_order(
            mut positions in proptest::collection::vec(0u64..500, 2..20),
            start in 0u64..500,
            removed in 1u64..50,
            inserted in 0u64..50
        ) {
            positions.sort_unstable();
            // Shrinking replaces keep interior offsets, which may then pass the shifted tail
            let kinds: &[ActionKind] = if inserted >= removed {
                &[ActionKind::Insert, ActionKind::Remove, ActionKind::Replace]
            } else {
                &[ActionKind::Insert, ActionKind::Remove]
            };
            for &kind in kinds {
                let rebased: Vec<_> = positions
                    .iter()
                    .map(|&p| rebase_index(p, kind, start, removed, inserted))
                    .collect();
                prop_assert!(rebased.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }
}
