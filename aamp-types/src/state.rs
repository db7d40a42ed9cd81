/// PlayerCore state machine levels (§3, transitions in §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    Released,
    Idle,
    Initializing,
    Preparing,
    Prepared,
    Seeking,
    Playing,
    Paused,
    Complete,
    Error,
    Blocked,
}

impl PlayerState {
    /// Transitions allowed per §4.8. This is intentionally permissive
    /// about transitions not explicitly named (e.g. `Error` -> `Idle` on
    /// a fresh `Tune`) since §4.8 describes "any -> ERROR" /
    /// "any -> BLOCKED" as universal escapes.
    #[must_use]
    pub fn can_transition_to(self, next: PlayerState) -> bool {
        use PlayerState::*;
        if matches!(next, Error | Blocked) {
            return true;
        }
        matches!(
            (self, next),
            (Released, Idle)
                | (Idle, Initializing)
                | (Initializing, Preparing)
                | (Preparing, Prepared)
                | (Prepared, Playing)
                | (Playing, Paused)
                | (Paused, Playing)
                | (Playing, Complete)
                | (_, Seeking)
                | (Seeking, Preparing)
                | (Seeking, Playing)
                | (Error, Idle)
                | (Blocked, Playing)
                | (Blocked, Paused)
        )
    }
}
