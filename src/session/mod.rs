//! Game sessions, the registry that owns them, and the exited-session reaper.
//!
//! A [`Session`] binds a game id to exactly one engine process and one
//! [`MoveSynchronizer`]. Sessions are only ever created and destroyed by the
//! [`registry::SessionRegistry`].

pub mod reaper;
pub mod registry;
pub mod synchronizer;

use std::time::Duration;

use crate::engine::spawner::EngineHandle;
use crate::engine::Column;
use crate::{AppError, Result};

pub use registry::{RegistryOptions, SessionRegistry};
pub use synchronizer::{Delivery, MoveSynchronizer, SyncPhase};

/// Whether a session can still accept moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Engine running.
    Active,
    /// Engine exited or was killed; writes are rejected.
    Closing,
}

/// One in-progress game.
#[derive(Debug)]
pub struct Session {
    id: String,
    engine: EngineHandle,
    moves: MoveSynchronizer,
}

impl Session {
    pub(crate) fn new(id: String, engine: EngineHandle) -> Self {
        let moves = MoveSynchronizer::new(&id);
        Self { id, engine, moves }
    }

    /// Game id the session is registered under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// OS process id of the engine.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.engine.pid()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.engine.has_exited() || self.moves.is_closed() {
            SessionState::Closing
        } else {
            SessionState::Active
        }
    }

    /// Whether the engine process has exited.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.engine.has_exited()
    }

    /// The session's move synchronizer.
    #[must_use]
    pub fn moves(&self) -> &MoveSynchronizer {
        &self.moves
    }

    /// Forward a human move to the engine.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WriteClosed` if the session is closing.
    pub async fn write_move(&self, column: Column) -> Result<()> {
        if self.state() == SessionState::Closing {
            return Err(AppError::WriteClosed(format!(
                "session '{}' is closing",
                self.id
            )));
        }
        self.engine.write_move(column).await
    }

    /// Wait up to `timeout` for the engine's next move.
    ///
    /// # Errors
    ///
    /// See [`MoveSynchronizer::request_move`].
    pub async fn request_move(&self, timeout: Duration) -> Result<Column> {
        self.moves.request_move(timeout).await
    }

    /// Kill the engine. Idempotent.
    pub fn kill(&self) {
        self.engine.kill();
    }
}
