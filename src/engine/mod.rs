//! Engine process adapter.
//!
//! Owns one AlphaZero engine subprocess per game and presents a typed
//! interface over its three raw streams:
//!
//! - `codec`: line framing for the engine's stdout and stdin.
//! - `reader`: stdout scanning for `AI move: <n>` lines and stderr
//!   diagnostics.
//! - `writer`: serialised writes of human moves to the engine's stdin.
//! - `spawner`: argument construction, process launch, exit supervision and
//!   kill.

pub mod codec;
pub mod reader;
pub mod spawner;
pub mod writer;

use serde::Deserialize;

use crate::{AppError, Result};

/// Number of columns on a Connect Four board.
pub const BOARD_COLUMNS: u8 = 7;

/// Zero-based board column index.
pub type Column = u8;

/// Which side the human plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerOrder {
    /// Human moves first; the engine answers.
    First,
    /// Engine opens the game.
    Second,
}

impl PlayerOrder {
    /// Values for the engine's `--player1` and `--player2` flags.
    #[must_use]
    pub fn player_flags(self) -> (&'static str, &'static str) {
        match self {
            Self::First => ("human", "az"),
            Self::Second => ("az", "human"),
        }
    }
}

/// Notifications emitted by an engine's stream tasks, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine printed an `AI move: <n>` line.
    MoveProduced {
        /// Column chosen by the engine.
        column: Column,
    },
    /// The engine process ended. Emitted exactly once, after stdout drained.
    ProcessExited {
        /// Exit code, `None` when terminated by a signal.
        exit_code: Option<i32>,
    },
}

/// Check that a human move names a column on the board.
///
/// # Errors
///
/// Returns `AppError::InvalidMove` when `raw` is outside `0..BOARD_COLUMNS`.
pub fn validate_column(raw: i64) -> Result<Column> {
    Column::try_from(raw)
        .ok()
        .filter(|column| *column < BOARD_COLUMNS)
        .ok_or_else(|| {
            AppError::InvalidMove(format!(
                "column {raw} is outside 0..={}",
                BOARD_COLUMNS - 1
            ))
        })
}
