//! Phases of a round and their fixed order.

use serde::{Deserialize, Serialize};

/// A stage of the game.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Phase {
    /// Players join, pick settings and add units.
    #[default]
    Lounge,
    /// The board is built and units deploy.
    Exchange,
    /// Initiative is rolled.
    Initiative,
    /// Units move, one turn at a time.
    Movement,
    /// Movement results are shown.
    MovementReport,
    /// Weapon attacks are declared.
    Firing,
    /// Firing results are shown.
    FiringReport,
    /// Melee and displacement attacks are declared.
    Physical,
    /// Heat and end-of-round checks.
    End,
    /// The game is over.
    Victory,
}

impl Phase {
    /// Phases played as a sequence of individual turns.
    #[must_use]
    pub const fn is_action_phase(self) -> bool {
        matches!(self, Phase::Movement | Phase::Firing | Phase::Physical)
    }

    /// Phases that end once every active player is ready.
    #[must_use]
    pub const fn advances_when_all_ready(self) -> bool {
        !self.is_action_phase()
    }

    /// Report phase that follows an action phase when it produced output.
    #[must_use]
    pub const fn report_phase(self) -> Option<Phase> {
        match self {
            Phase::Movement => Some(Phase::MovementReport),
            Phase::Firing => Some(Phase::FiringReport),
            _ => None,
        }
    }

    /// Next phase in the fixed order, ignoring the optional report phases
    /// and the End branch.
    #[must_use]
    pub const fn next(self) -> Phase {
        match self {
            Phase::Lounge => Phase::Exchange,
            Phase::Exchange => Phase::Initiative,
            Phase::Initiative => Phase::Movement,
            Phase::Movement | Phase::MovementReport => Phase::Firing,
            Phase::Firing | Phase::FiringReport => Phase::Physical,
            Phase::Physical => Phase::End,
            Phase::End => Phase::Initiative,
            Phase::Victory => Phase::Lounge,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Phase::Lounge => "Lounge",
            Phase::Exchange => "Exchange",
            Phase::Initiative => "Initiative",
            Phase::Movement => "Movement",
            Phase::MovementReport => "Movement Report",
            Phase::Firing => "Firing",
            Phase::FiringReport => "Firing Report",
            Phase::Physical => "Physical",
            Phase::End => "End",
            Phase::Victory => "Victory",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cycle() {
        let mut phase = Phase::Initiative;
        let mut seen = vec![phase];
        loop {
            phase = phase.next();
            if phase == Phase::Initiative {
                break;
            }
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                Phase::Initiative,
                Phase::Movement,
                Phase::Firing,
                Phase::Physical,
                Phase::End
            ]
        );
    }

    #[test]
    fn test_reports_follow_action_phases() {
        assert_eq!(Phase::Movement.report_phase(), Some(Phase::MovementReport));
        assert_eq!(Phase::MovementReport.next(), Phase::Firing);
        assert_eq!(Phase::Physical.report_phase(), None);
        assert!(Phase::FiringReport.advances_when_all_ready());
        assert!(!Phase::Physical.advances_when_all_ready());
        assert_eq!(Phase::Victory.next(), Phase::Lounge);
    }
}
