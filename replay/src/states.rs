/// Replay session state machine.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine not started yet.
    Uninitialized,

    /// Engine started and continuation height known. The handshake has not
    /// run, so no block may be applied.
    Handshaking,

    /// Handshake done; blocks are applied one by one in height order.
    Applying,

    /// Engine released. Terminal.
    Stopped,
}

impl EngineState {
    /// Check if a transition to the target state is valid.
    ///
    /// `Applying -> Applying` is the per-block step. Every live state may
    /// stop, so a session can always release its engine.
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        match self {
            EngineState::Uninitialized => matches!(target, EngineState::Handshaking | EngineState::Stopped),
            EngineState::Handshaking => matches!(target, EngineState::Applying | EngineState::Stopped),
            EngineState::Applying => matches!(target, EngineState::Applying | EngineState::Stopped),
            EngineState::Stopped => false,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState::Uninitialized
    }
}
