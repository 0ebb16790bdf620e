//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use tokio::task::JoinError;
use tracing::warn;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or socket I/O failure outside a session's engine streams.
    Io(String),
    /// Request body or query could not be decoded.
    InvalidRequest(String),
    /// No session is registered under the given game id.
    SessionNotFound(String),
    /// Column index outside the board.
    InvalidMove(String),
    /// The engine process could not be launched.
    Spawn(String),
    /// The engine's stdin is closed (process exited or was killed).
    WriteClosed(String),
    /// No engine move arrived before the deadline.
    MoveTimeout(String),
    /// The engine process exited while a move was expected.
    ProcessExited(String),
    /// Another caller is already waiting for this session's next move.
    AlreadyWaiting(String),
    /// The registry is full and cannot accept a new game id.
    Capacity(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::InvalidMove(msg) => write!(f, "invalid move: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn failed: {msg}"),
            Self::WriteClosed(msg) => write!(f, "write closed: {msg}"),
            Self::MoveTimeout(msg) => write!(f, "move timeout: {msg}"),
            Self::ProcessExited(msg) => write!(f, "process exited: {msg}"),
            Self::AlreadyWaiting(msg) => write!(f, "already waiting: {msg}"),
            Self::Capacity(msg) => write!(f, "capacity: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Log a background task that panicked or was cancelled.
///
/// Returns whether the task finished normally.
#[allow(clippy::must_use_candidate)]
pub fn report_join(task: &str, result: &std::result::Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) if err.is_panic() => {
            warn!(task, %err, "background task panicked");
            false
        }
        Err(err) => {
            warn!(task, %err, "background task was cancelled");
            false
        }
    }
}
