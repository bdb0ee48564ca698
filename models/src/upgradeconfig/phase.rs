use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The phase of a single version's upgrade.
///
/// Phases form a strict partial order: `New ≺ Pending ≺ Upgrading ≺ {Upgraded, Failed}`. The
/// orchestrator only ever moves a history entry forward along this order; it never reuses a
/// phase that has already been left behind for the same entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    /// The entry was just created; no precondition checks have run yet.
    New,
    /// Waiting for the configured upgrade window to open.
    Pending,
    /// The upgrade is actively running: control plane, workers, or both.
    Upgrading,
    /// The upgrade completed successfully and all post-checks passed.
    Upgraded,
    /// The upgrade could not proceed or did not complete within its allotted time.
    Failed,
}

impl Phase {
    /// The ordinal position of this phase in the monotonic sequence. `Upgraded` and `Failed` are
    /// both terminal and share the final rank; `can_transition_to` is what actually forbids
    /// moving between them.
    fn rank(self) -> u8 {
        match self {
            Phase::New => 0,
            Phase::Pending => 1,
            Phase::Upgrading => 2,
            Phase::Upgraded | Phase::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Upgraded | Phase::Failed)
    }

    /// Whether advancing from `self` to `next` respects the monotonic ordering. Terminal phases
    /// never transition anywhere, including to themselves; every other move must strictly
    /// increase rank.
    pub fn can_transition_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self.is_terminal(), other.is_terminal(), self == other) {
            (true, true, false) => None,
            _ => Some(self.rank().cmp(&other.rank())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(Phase::New.can_transition_to(Phase::Pending));
        assert!(Phase::Pending.can_transition_to(Phase::Upgrading));
        assert!(Phase::Upgrading.can_transition_to(Phase::Upgraded));
        assert!(Phase::Upgrading.can_transition_to(Phase::Failed));
    }

    #[test]
    fn backward_and_sideways_transitions_are_rejected() {
        assert!(!Phase::Pending.can_transition_to(Phase::New));
        assert!(!Phase::Upgrading.can_transition_to(Phase::Pending));
        assert!(!Phase::New.can_transition_to(Phase::New));
    }

    #[test]
    fn terminal_phases_never_transition() {
        assert!(!Phase::Upgraded.can_transition_to(Phase::Failed));
        assert!(!Phase::Failed.can_transition_to(Phase::Upgraded));
        assert!(!Phase::Upgraded.can_transition_to(Phase::Upgraded));
    }

    #[test]
    fn upgraded_and_failed_are_incomparable() {
        assert_eq!(Phase::Upgraded.partial_cmp(&Phase::Failed), None);
        assert!(Phase::Pending < Phase::Upgrading);
    }
}
