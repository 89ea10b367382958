//! Scheduling of deferred edits
//!
//! The [`ChangeManager`] keeps every action of a store session and enforces
//! the rules on how pending edits may relate to each other:
//!
//! - An insert must not land strictly inside a pending removed or replaced
//!   range. Inserting at the start of such a range is fine.
//! - A removal or replacement that covers the same range as, or encloses, a
//!   pending removal or replacement supersedes it. Ranges lying inside, or
//!   partially overlapping, a pending range are rejected.
//! - A removal or replacement discards pending inserts strictly inside its
//!   range.
//!
//! Every check runs before any state changes, so a rejected call leaves the
//! pending set untouched.

use crate::action::{ActionHandle, ActionKind, ActionState, MediumAction};
use crate::error::{Result, StoreError};
use crate::offset::MediumOffset;
use crate::region::RegionOverlap;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Registry of the actions of one store session
#[derive(Debug)]
pub struct ChangeManager {
    session: u64,
    epoch: u64,
    next_id: u64,
    actions: BTreeMap<u64, MediumAction>,
}

impl ChangeManager {
    /// Create a manager handing out handles for the given session
    pub const fn new(session: u64) -> Self {
        Self {
            session,
            epoch: 0,
            next_id: 0,
            actions: BTreeMap::new(),
        }
    }

    /// Schedule an insert of `bytes` before `index`
    pub fn schedule_insert(
        &mut self,
        start: MediumOffset,
        index: u64,
        bytes: Bytes,
    ) -> Result<ActionHandle> {
        if bytes.is_empty() {
            return Err(StoreError::invalid_argument("cannot insert zero bytes"));
        }

        if let Some(conflict) = self
            .pending()
            .find(|p| p.kind().covers_range() && p.scheduled_at() < index && index < p.scheduled_end())
        {
            return Err(overlap_error(conflict, ActionKind::Insert, index, index));
        }

        Ok(self.register(ActionKind::Insert, start, index, 0, bytes))
    }

    /// Schedule the removal of `length` bytes at `index`
    pub fn schedule_remove(
        &mut self,
        start: MediumOffset,
        index: u64,
        length: u64,
    ) -> Result<ActionHandle> {
        self.schedule_range(ActionKind::Remove, start, index, length, Bytes::new())
    }

    /// Schedule replacing `length` bytes at `index` by `bytes`
    pub fn schedule_replace(
        &mut self,
        start: MediumOffset,
        index: u64,
        length: u64,
        bytes: Bytes,
    ) -> Result<ActionHandle> {
        self.schedule_range(ActionKind::Replace, start, index, length, bytes)
    }

    /// Discard a pending action
    pub fn undo(&mut self, handle: ActionHandle) -> Result<()> {
        let action = self.action_mut(handle)?;
        if !action.is_pending() {
            return Err(StoreError::ActionNotPending(handle.id));
        }
        action.set_state(ActionState::Undone);
        debug!("Undid {}", handle);
        Ok(())
    }

    /// Mark a pending action as written to the medium
    pub fn mark_applied(&mut self, handle: ActionHandle) -> Result<()> {
        let action = self.action_mut(handle)?;
        if !action.is_pending() {
            return Err(StoreError::ActionNotPending(handle.id));
        }
        action.set_state(ActionState::Applied);
        Ok(())
    }

    /// Look up an action of this session
    pub fn action(&self, handle: ActionHandle) -> Result<&MediumAction> {
        self.check_handle(handle)?;
        self.actions
            .get(&handle.id)
            .ok_or(StoreError::ActionNotPending(handle.id))
    }

    /// Pending actions in the order a flush applies them: ascending start,
    /// inserts before ranged edits at equal starts, then by scheduling order
    pub fn pending_in_flush_order(&self) -> Vec<MediumAction> {
        let mut pending: Vec<MediumAction> = self.pending().cloned().collect();
        pending.sort_by_key(|action| {
            (
                action.scheduled_at(),
                action.kind().covers_range(),
                action.handle().id,
            )
        });
        pending
    }

    /// Number of pending actions
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Drop every action; handles issued so far are no longer pending
    pub fn clear(&mut self) {
        self.actions.clear();
        self.epoch += 1;
    }

    fn schedule_range(
        &mut self,
        kind: ActionKind,
        start: MediumOffset,
        index: u64,
        length: u64,
        bytes: Bytes,
    ) -> Result<ActionHandle> {
        if length == 0 {
            return Err(StoreError::invalid_argument(format!(
                "{kind} needs a length greater than 0"
            )));
        }

        let end = index.checked_add(length).ok_or_else(|| {
            StoreError::invalid_argument(format!("{kind} of {length} bytes at {index} overflows"))
        })?;
        let mut superseded = Vec::new();

        for pending in self.pending() {
            if pending.kind().covers_range() {
                match RegionOverlap::classify(index, end, pending.scheduled_at(), pending.scheduled_end()) {
                    RegionOverlap::NoOverlap => {}
                    RegionOverlap::SameRange | RegionOverlap::RightFullyInsideLeft => {
                        superseded.push(pending.handle());
                    }
                    RegionOverlap::LeftFullyInsideRight
                    | RegionOverlap::LeftOverlapsRightAtFront
                    | RegionOverlap::LeftOverlapsRightAtBack => {
                        return Err(overlap_error(pending, kind, index, end));
                    }
                }
            } else if index < pending.scheduled_at() && pending.scheduled_at() < end {
                superseded.push(pending.handle());
            }
        }

        for handle in superseded {
            if let Some(action) = self.actions.get_mut(&handle.id) {
                warn!("{} supersedes pending {}", kind, action);
                action.set_state(ActionState::Undone);
            }
        }

        Ok(self.register(kind, start, index, length, bytes))
    }

    fn register(
        &mut self,
        kind: ActionKind,
        start: MediumOffset,
        index: u64,
        length: u64,
        bytes: Bytes,
    ) -> ActionHandle {
        let handle = ActionHandle {
            session: self.session,
            epoch: self.epoch,
            id: self.next_id,
        };
        self.next_id += 1;

        let action = MediumAction::new(handle, kind, start, index, length, bytes);
        debug!("Scheduled {}", action);
        self.actions.insert(handle.id, action);
        handle
    }

    fn pending(&self) -> impl Iterator<Item = &MediumAction> {
        self.actions.values().filter(|action| action.is_pending())
    }

    fn check_handle(&self, handle: ActionHandle) -> Result<()> {
        if handle.session != self.session {
            return Err(StoreError::ForeignMedium(format!(
                "{handle} was not scheduled in session {}",
                self.session
            )));
        }
        if handle.epoch != self.epoch {
            return Err(StoreError::ActionNotPending(handle.id));
        }
        Ok(())
    }

    fn action_mut(&mut self, handle: ActionHandle) -> Result<&mut MediumAction> {
        self.check_handle(handle)?;
        self.actions
            .get_mut(&handle.id)
            .ok_or(StoreError::ActionNotPending(handle.id))
    }
}

fn overlap_error(existing: &MediumAction, new_kind: ActionKind, new_start: u64, new_end: u64) -> StoreError {
    StoreError::OverlappingWrite {
        existing_kind: existing.kind(),
        existing_start: existing.scheduled_at(),
        existing_end: existing.scheduled_end(),
        new_kind,
        new_start,
        new_end,
    }
}
