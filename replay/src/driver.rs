use std::path::Path;

use tracing::{debug, info, info_span, warn, Instrument, Span};
use types::BlockPair;

use crate::engine::{ApplyOutcome, Engine};
use crate::error::{EngineError, ReplayError};
use crate::states::EngineState;

/// Drives one engine through a replay session.
///
/// Call order is `start`, `handshake`, any number of `apply`, then `stop`.
/// Anything else is rejected with [`ReplayError::InvalidTransition`] before
/// the engine is touched.
pub struct ReplayDriver {
    engine: Box<dyn Engine>,
    state: EngineState,
    /// Set once `start_engine` succeeded, even if the session never left
    /// `Uninitialized`. `stop` must release such an engine.
    engine_started: bool,
    continuation_height: Option<u64>,
    blocks_applied: u64,
    last_applied: Option<u64>,
    span: Span,
}

impl ReplayDriver {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        let span = info_span!("replay", engine = engine.name());
        Self {
            engine,
            state: EngineState::default(),
            engine_started: false,
            continuation_height: None,
            blocks_applied: 0,
            last_applied: None,
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Continuation height read at start, `None` before that.
    pub fn continuation_height(&self) -> Option<u64> {
        self.continuation_height
    }

    pub fn blocks_applied(&self) -> u64 {
        self.blocks_applied
    }

    /// Height of the last block this session applied.
    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    fn transition(&mut self, to: EngineState) -> Result<(), ReplayError> {
        if !self.state.can_transition_to(to) {
            return Err(ReplayError::InvalidTransition { from: self.state, to });
        }
        debug!(parent: &self.span, from = ?self.state, to = ?to, "Replay state transition");
        self.state = to;
        Ok(())
    }

    fn check(&self, to: EngineState) -> Result<(), ReplayError> {
        if self.state.can_transition_to(to) {
            Ok(())
        } else {
            Err(ReplayError::InvalidTransition { from: self.state, to })
        }
    }

    /// Start the engine and read its continuation height.
    pub async fn start(&mut self, home: &Path) -> Result<u64, ReplayError> {
        self.check(EngineState::Handshaking)?;
        let span = self.span.clone();

        self.engine
            .start_engine(home)
            .instrument(span.clone())
            .await
            .map_err(|source| self.start_failed(source))?;
        self.engine_started = true;

        let height = self
            .engine
            .continuation_height()
            .instrument(span)
            .await
            .map_err(|source| self.start_failed(source))?;

        self.transition(EngineState::Handshaking)?;
        self.continuation_height = Some(height);
        info!(parent: &self.span, continuation_height = height, "Engine started");
        Ok(height)
    }

    fn start_failed(&self, source: EngineError) -> ReplayError {
        ReplayError::StartFailed {
            engine: self.engine.name().to_string(),
            source,
        }
    }

    pub async fn handshake(&mut self) -> Result<(), ReplayError> {
        // Applying -> Applying is the per-block step, not a second handshake.
        if self.state != EngineState::Handshaking {
            return Err(ReplayError::InvalidTransition {
                from: self.state,
                to: EngineState::Applying,
            });
        }

        let span = self.span.clone();
        self.engine
            .do_handshake()
            .instrument(span)
            .await
            .map_err(|source| ReplayError::HandshakeFailed {
                engine: self.engine.name().to_string(),
                source,
            })?;

        self.transition(EngineState::Applying)?;
        info!(parent: &self.span, "Handshake complete");
        Ok(())
    }

    pub async fn apply(&mut self, pair: &BlockPair) -> Result<ApplyOutcome, ReplayError> {
        // Handshaking -> Applying is only reachable through `handshake`.
        if self.state != EngineState::Applying {
            return Err(ReplayError::InvalidTransition {
                from: self.state,
                to: EngineState::Applying,
            });
        }

        let height = pair.height();
        let span = self.span.clone();
        let outcome = self
            .engine
            .apply_block(pair)
            .instrument(span)
            .await
            .map_err(|source| ReplayError::ApplyFailed {
                engine: self.engine.name().to_string(),
                height,
                source,
            })?;

        match outcome {
            ApplyOutcome::Applied => {
                self.blocks_applied += 1;
                self.last_applied = Some(height);
            }
            ApplyOutcome::AlreadyApplied => {
                debug!(parent: &self.span, height, "Block already applied");
            }
        }
        Ok(outcome)
    }

    /// Release the engine. Safe to call more than once; an engine whose
    /// `start_engine` never succeeded is not touched.
    pub async fn stop(&mut self) -> Result<(), ReplayError> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }

        self.state = EngineState::Stopped;
        if !self.engine_started {
            return Ok(());
        }
        self.engine_started = false;
        let span = self.span.clone();
        let stopped = self.engine.stop_engine().instrument(span).await;

        match stopped {
            Ok(()) => {
                info!(
                    parent: &self.span,
                    blocks_applied = self.blocks_applied,
                    last_applied = ?self.last_applied,
                    "Engine stopped"
                );
                Ok(())
            }
            Err(source) => {
                warn!(parent: &self.span, error = %source, "Engine stop failed");
                Err(ReplayError::StopFailed {
                    engine: self.engine.name().to_string(),
                    source,
                })
            }
        }
    }
}
