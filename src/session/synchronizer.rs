//! Per-session move synchronizer.
//!
//! Reconciles moves the engine has already produced with callers asking for
//! the next one. States:
//!
//! | State    | `deliver(c)`                  | `request_move()`                     |
//! |----------|-------------------------------|--------------------------------------|
//! | Idle     | → Buffered(c)                 | → Waiting, deadline armed            |
//! | Waiting  | waiter gets `c` → Idle        | `AlreadyWaiting`                     |
//! | Buffered | queue `c` behind earlier ones | returns oldest move immediately      |
//!
//! A move is never handed to a waiter and buffered at the same time, and
//! never dropped: if the waiter's caller is gone (deadline passed, HTTP
//! client disconnected) the move is buffered for the next request.
//!
//! After [`MoveSynchronizer::process_exited`] a live waiter fails with
//! `ProcessExited`, buffered moves stay retrievable, and a request with
//! nothing buffered fails immediately.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::engine::Column;
use crate::{AppError, Result};

/// Observable synchronizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing buffered, nobody waiting.
    Idle,
    /// One caller is blocked in `request_move`.
    Waiting,
    /// At least one move is ready for the next caller.
    Buffered,
}

/// What happened to a delivered move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed straight to the waiting caller.
    Resolved,
    /// Stored for the next request.
    Buffered,
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<Result<Column>>,
}

impl Waiter {
    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
struct SyncState {
    buffered: VecDeque<Column>,
    waiter: Option<Waiter>,
    next_ticket: u64,
    exit_code: Option<Option<i32>>,
}

/// Single-waiter rendezvous between engine output and move requests.
#[derive(Debug)]
pub struct MoveSynchronizer {
    session_id: String,
    state: Mutex<SyncState>,
}

impl MoveSynchronizer {
    /// Create an idle synchronizer.
    #[must_use]
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_owned(),
            state: Mutex::new(SyncState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        let state = self.lock();
        if state.waiter.as_ref().is_some_and(Waiter::is_live) {
            SyncPhase::Waiting
        } else if state.buffered.is_empty() {
            SyncPhase::Idle
        } else {
            SyncPhase::Buffered
        }
    }

    /// Whether a produced move is waiting to be collected.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        !self.lock().buffered.is_empty()
    }

    /// Whether [`Self::process_exited`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().exit_code.is_some()
    }

    /// Apply an engine move: resolve the waiter or buffer it.
    pub fn deliver(&self, column: Column) -> Delivery {
        let session_id = self.session_id.as_str();
        let mut state = self.lock();

        if let Some(waiter) = state.waiter.take() {
            match waiter.tx.send(Ok(column)) {
                Ok(()) => {
                    debug!(session_id, column, "move handed to waiting caller");
                    return Delivery::Resolved;
                }
                Err(_) => {
                    debug!(session_id, column, "waiting caller is gone, buffering move");
                }
            }
        }

        state.buffered.push_back(column);
        debug!(
            session_id,
            column,
            buffered = state.buffered.len(),
            "move buffered"
        );
        Delivery::Buffered
    }

    /// Mark the engine as gone and fail any waiting caller.
    pub fn process_exited(&self, exit_code: Option<i32>) {
        let session_id = self.session_id.as_str();
        let mut state = self.lock();
        state.exit_code = Some(exit_code);

        if let Some(waiter) = state.waiter.take() {
            let failure = AppError::ProcessExited(exit_message(session_id, exit_code));
            if waiter.tx.send(Err(failure)).is_err() {
                debug!(session_id, "waiting caller already gone at process exit");
            }
        }
    }

    /// Return the next engine move, waiting up to `timeout` for one.
    ///
    /// A buffered move is returned immediately without arming any deadline.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyWaiting`: another caller is already blocked here.
    /// - `AppError::MoveTimeout`: no move arrived within `timeout`.
    /// - `AppError::ProcessExited`: the engine exited before producing one.
    pub async fn request_move(&self, timeout: Duration) -> Result<Column> {
        let session_id = self.session_id.as_str();
        let (ticket, mut rx) = {
            let mut state = self.lock();

            if let Some(column) = state.buffered.pop_front() {
                debug!(session_id, column, "returning buffered move");
                return Ok(column);
            }

            if let Some(exit_code) = state.exit_code {
                return Err(AppError::ProcessExited(exit_message(session_id, exit_code)));
            }

            if let Some(waiter) = &state.waiter {
                if waiter.is_live() {
                    return Err(AppError::AlreadyWaiting(format!(
                        "a move request is already pending for session '{session_id}'"
                    )));
                }
                debug!(session_id, "replacing abandoned waiter");
            }

            let (tx, rx) = oneshot::channel();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.waiter = Some(Waiter { ticket, tx });
            (ticket, rx)
        };

        let outcome = tokio::time::timeout(timeout, &mut rx).await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::ProcessExited(format!(
                "move channel closed for session '{session_id}'"
            ))),
            Err(_elapsed) => {
                let mut state = self.lock();
                if state.waiter.as_ref().is_some_and(|w| w.ticket == ticket) {
                    state.waiter = None;
                }

                // `deliver` sends under the lock, so anything it handed to
                // this waiter after the deadline fired is already in `rx`.
                match rx.try_recv() {
                    Ok(result) => {
                        debug!(session_id, "move arrived as the deadline fired");
                        result
                    }
                    Err(_) => {
                        debug!(session_id, ?timeout, "move request timed out");
                        Err(AppError::MoveTimeout(format!(
                            "no engine move for session '{session_id}' within {timeout:?}"
                        )))
                    }
                }
            }
        }
    }
}

fn exit_message(session_id: &str, exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("engine for session '{session_id}' exited with code {code}"),
        None => format!("engine for session '{session_id}' was terminated"),
    }
}
