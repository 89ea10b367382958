//! Deferred edits of a medium

use crate::offset::MediumOffset;
use bytes::Bytes;
use std::fmt;

/// Kind of a deferred edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// Insert bytes before a position
    Insert,
    /// Remove a byte range
    Remove,
    /// Replace a byte range by other bytes
    Replace,
}

impl ActionKind {
    /// Whether the edit affects an existing byte range
    pub const fn covers_range(self) -> bool {
        matches!(self, Self::Remove | Self::Replace)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "INSERT",
            Self::Remove => "REMOVE",
            Self::Replace => "REPLACE",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    /// Waiting for the next flush
    Pending,
    /// Written to the medium by a flush
    Applied,
    /// Discarded by an undo or by a superseding edit
    Undone,
}

/// Handle of an action scheduled in a store session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionHandle {
    pub(crate) session: u64,
    pub(crate) epoch: u64,
    pub(crate) id: u64,
}

impl ActionHandle {
    /// Schedule sequence number
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}@{}.{}", self.id, self.session, self.epoch)
    }
}

/// A scheduled edit.
///
/// Ranges are expressed in the addressing of the medium as it was when the
/// action was scheduled. The start is the caller's tracked offset, so the
/// position an action is applied at follows the rebasing done by actions
/// flushed before it.
#[derive(Debug, Clone)]
pub struct MediumAction {
    handle: ActionHandle,
    kind: ActionKind,
    start: MediumOffset,
    scheduled_at: u64,
    length: u64,
    bytes: Bytes,
    state: ActionState,
}

impl MediumAction {
    pub(crate) const fn new(
        handle: ActionHandle,
        kind: ActionKind,
        start: MediumOffset,
        scheduled_at: u64,
        length: u64,
        bytes: Bytes,
    ) -> Self {
        Self {
            handle,
            kind,
            start,
            scheduled_at,
            length,
            bytes,
            state: ActionState::Pending,
        }
    }

    /// Handle identifying this action
    pub const fn handle(&self) -> ActionHandle {
        self.handle
    }

    /// Kind of edit
    pub const fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Tracked start offset
    pub const fn start(&self) -> MediumOffset {
        self.start
    }

    /// Start index at scheduling time
    pub const fn scheduled_at(&self) -> u64 {
        self.scheduled_at
    }

    /// Number of existing bytes affected, 0 for inserts
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// End of the affected range at scheduling time
    pub const fn scheduled_end(&self) -> u64 {
        self.scheduled_at.saturating_add(self.length)
    }

    /// Bytes written by the action, empty for removals
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Current lifecycle state
    pub const fn state(&self) -> ActionState {
        self.state
    }

    /// Whether the action still awaits a flush
    pub fn is_pending(&self) -> bool {
        self.state == ActionState::Pending
    }

    /// Signed change of the medium length caused by this action
    pub fn length_delta(&self) -> i64 {
        self.bytes.len() as i64 - self.length as i64
    }

    pub(crate) const fn set_state(&mut self, state: ActionState) {
        self.state = state;
    }
}

impl fmt::Display for MediumAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}, {}) with {} bytes",
            self.handle,
            self.kind,
            self.scheduled_at,
            self.scheduled_end(),
            self.bytes.len()
        )
    }
}
