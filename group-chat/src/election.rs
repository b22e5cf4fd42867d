//! Coordinator election policy.
//!
//! The first session ever registered becomes coordinator. After that the role only moves
//! through an explicit hand-off. When the coordinator disconnects nobody is re-elected and the
//! recorded id goes stale until a live session hands the role to someone else.

use thiserror::Error;
use tracing::warn;

use crate::registry::SessionId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),
    #[error("session {0} is already the coordinator")]
    NoOp(SessionId),
}

#[derive(Debug, Default)]
pub struct Election {
    coordinator: Option<SessionId>,
}

impl Election {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coordinator(&self) -> Option<SessionId> {
        self.coordinator
    }

    /// Returns `true` when `id` was promoted because no coordinator has ever existed.
    pub fn on_register(&mut self, id: SessionId) -> bool {
        if self.coordinator.is_some() {
            return false;
        }
        self.coordinator = Some(id);
        true
    }

    pub fn on_unregister(&self, id: SessionId) {
        if self.coordinator == Some(id) {
            warn!(session = id, "coordinator left without a successor");
        }
    }

    /// Moves the role to `target` and returns the previous holder.
    ///
    /// Callers must hold the registry lock so the check and the swap happen as one step.
    pub fn hand_off(
        &mut self,
        target: SessionId,
        target_registered: bool,
    ) -> Result<Option<SessionId>, CoordinatorError> {
        if !target_registered {
            return Err(CoordinatorError::UnknownSession(target));
        }
        if self.coordinator == Some(target) {
            return Err(CoordinatorError::NoOp(target));
        }
        Ok(self.coordinator.replace(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_is_promoted_once() {
        let mut election = Election::new();
        assert!(election.on_register(1));
        assert!(!election.on_register(2));
        assert_eq!(election.coordinator(), Some(1));
    }

    #[test]
    fn hand_off_returns_previous_holder() {
        let mut election = Election::new();
        election.on_register(1);

        assert_eq!(election.hand_off(2, true), Ok(Some(1)));
        assert_eq!(election.coordinator(), Some(2));
    }

    #[test]
    fn hand_off_rejects_unknown_and_current_targets() {
        let mut election = Election::new();
        election.on_register(1);

        assert_eq!(
            election.hand_off(7, false),
            Err(CoordinatorError::UnknownSession(7))
        );
        assert_eq!(election.hand_off(1, true), Err(CoordinatorError::NoOp(1)));
        assert_eq!(election.coordinator(), Some(1));
    }

    #[test]
    fn coordinator_id_goes_stale_after_departure() {
        let mut election = Election::new();
        election.on_register(1);
        election.on_unregister(1);

        // No re-election happens and a later session is not promoted either.
        assert!(!election.on_register(2));
        assert_eq!(election.coordinator(), Some(1));
    }
}
