//! Tracking state machine for entity lifecycle.

use serde::{Deserialize, Serialize};

/// The active lifecycle flag of an entity.
///
/// `None` in [`TrackingState::status`] is the implicit Clean state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingStatus {
    /// Created in memory, never persisted.
    New,

    /// Persisted and modified since load.
    Dirty,

    /// Removed by its own request.
    SelfDeleted,

    /// Marked for deletion by its owner.
    Deleted,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::New => "New",
            TrackingStatus::Dirty => "Dirty",
            TrackingStatus::SelfDeleted => "SelfDeleted",
            TrackingStatus::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-entity lifecycle flags.
///
/// The flags are mutually exclusive: every transition overwrites the
/// previous one and no transition is ever rejected. Holding the state as a
/// single optional status makes two active flags unrepresentable.
///
/// ```text
///            ┌──────────── transition_to(X) ───────────┐
/// Clean ─────┼──► New │ Dirty │ SelfDeleted │ Deleted ─┘
///   ▲        │
///   └────────┘ mark_clean()
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingState {
    status: Option<TrackingStatus>,
}

impl TrackingState {
    /// Returns a Clean state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a state with `status` active.
    pub fn with_status(status: TrackingStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Clears every flag, then activates `status`.
    pub fn transition_to(&mut self, status: TrackingStatus) {
        self.status = Some(status);
    }

    pub fn mark_new(&mut self) {
        self.transition_to(TrackingStatus::New);
    }

    pub fn mark_dirty(&mut self) {
        self.transition_to(TrackingStatus::Dirty);
    }

    pub fn mark_self_deleted(&mut self) {
        self.transition_to(TrackingStatus::SelfDeleted);
    }

    pub fn mark_deleted(&mut self) {
        self.transition_to(TrackingStatus::Deleted);
    }

    pub fn mark_clean(&mut self) {
        self.status = None;
    }

    pub fn status(&self) -> Option<TrackingStatus> {
        self.status
    }

    pub fn is_new(&self) -> bool {
        self.status == Some(TrackingStatus::New)
    }

    pub fn is_dirty(&self) -> bool {
        self.status == Some(TrackingStatus::Dirty)
    }

    pub fn is_self_deleted(&self) -> bool {
        self.status == Some(TrackingStatus::SelfDeleted)
    }

    pub fn is_deleted(&self) -> bool {
        self.status == Some(TrackingStatus::Deleted)
    }

    pub fn is_clean(&self) -> bool {
        self.status.is_none()
    }

    /// Resets to Clean, then adopts every flag found among `children`.
    ///
    /// Flags are applied in the order New, Dirty, SelfDeleted, Deleted, each
    /// through the overwriting setter, so the most destructive child state
    /// is the one left active.
    pub fn detect_changes<'a, I>(&mut self, children: I)
    where
        I: IntoIterator<Item = &'a TrackingState>,
    {
        let mut found = [false; 4];
        for child in children {
            match child.status {
                Some(TrackingStatus::New) => found[0] = true,
                Some(TrackingStatus::Dirty) => found[1] = true,
                Some(TrackingStatus::SelfDeleted) => found[2] = true,
                Some(TrackingStatus::Deleted) => found[3] = true,
                None => {}
            }
        }

        self.mark_clean();
        const ORDER: [TrackingStatus; 4] = [
            TrackingStatus::New,
            TrackingStatus::Dirty,
            TrackingStatus::SelfDeleted,
            TrackingStatus::Deleted,
        ];
        for (status, present) in ORDER.into_iter().zip(found) {
            if present {
                self.transition_to(status);
            }
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}"),
            None => write!(f, "Clean"),
        }
    }
}
