//! Engine stdout and stderr reader tasks.
//!
//! Stdout is framed into lines by [`EngineLineCodec`] and every line is
//! scanned by [`MoveParser`]. Each `AI move: <n>` occurrence becomes one
//! [`EngineEvent::MoveProduced`], forwarded in the order the engine printed
//! it. Everything else the engine prints is informational and logged at
//! `DEBUG`.
//!
//! Stderr lines are surfaced as `WARN` diagnostics only; a chatty engine is
//! not a broken one.

use futures_util::StreamExt;
use regex::Regex;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::codec::EngineLineCodec;
use crate::engine::{Column, EngineEvent};
use crate::{AppError, Result};

/// Pattern the engine uses to announce its move.
const MOVE_PATTERN: &str = r"AI move: (\d+)";

/// Extracts engine moves from stdout lines.
#[derive(Debug, Clone)]
pub struct MoveParser {
    pattern: Regex,
}

impl MoveParser {
    /// Compile the move pattern.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern fails to compile.
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(MOVE_PATTERN)
            .map_err(|err| AppError::Config(format!("invalid move pattern: {err}")))?;
        Ok(Self { pattern })
    }

    /// Return every move announced on `line`, left to right.
    ///
    /// Numbers too large to be a column are logged and skipped.
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Vec<Column> {
        self.pattern
            .captures_iter(line)
            .filter_map(|caps| {
                let digits = caps.get(1)?.as_str();
                match digits.parse::<Column>() {
                    Ok(column) => Some(column),
                    Err(err) => {
                        warn!(digits, %err, "engine announced an unparseable move, skipping");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Stdout reader task: decodes lines and emits [`EngineEvent::MoveProduced`].
///
/// Returns on EOF, on an unrecoverable read error, when `event_tx` is closed,
/// or when `cancel` fires. It never emits `ProcessExited`; the supervisor
/// does that once the process has actually ended.
pub async fn run_reader<R>(
    session_id: String,
    stdout: R,
    parser: MoveParser,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, EngineLineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "engine reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(session_id, "engine reader: stdout closed");
                        break;
                    }

                    Some(Err(err)) => {
                        warn!(session_id, error = %err, "engine reader: read failed, stopping");
                        break;
                    }

                    Some(Ok(line)) => {
                        let moves = parser.parse_line(&line);
                        if moves.is_empty() {
                            debug!(session_id, line = %line, "engine output");
                            continue;
                        }

                        for column in moves {
                            debug!(session_id, column, "engine produced a move");
                            if event_tx.send(EngineEvent::MoveProduced { column }).await.is_err() {
                                debug!(session_id, "engine reader: event_tx closed, stopping");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Stderr reader task: logs each line as a non-fatal diagnostic.
pub async fn run_diagnostics<R>(session_id: String, stderr: R)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, EngineLineCodec::new());

    while let Some(item) = framed.next().await {
        match item {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => warn!(session_id, line = %line, "engine stderr"),
            Err(err) => {
                debug!(session_id, error = %err, "engine stderr closed with error");
                break;
            }
        }
    }
}
