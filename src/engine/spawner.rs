//! Engine process spawner and supervisor.
//!
//! Spawns one engine per game with:
//! - piped stdin/stdout/stderr, each owned by exactly one task;
//! - `kill_on_drop(true)` so a leaked handle still takes the process down;
//! - a supervisor task that owns the [`Child`], waits for it to exit (or
//!   kills it on request), lets stdout drain, and then emits
//!   [`EngineEvent::ProcessExited`] exactly once.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::reader::{self, MoveParser};
use crate::engine::writer::EngineWriter;
use crate::engine::{Column, EngineEvent, PlayerOrder};
use crate::errors::report_join;
use crate::{AppError, Result};

/// How long the supervisor waits for stdout to drain after the process exits.
///
/// A grandchild holding the pipe open would otherwise keep the reader alive
/// forever.
const STDOUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

// ── Launch parameters ────────────────────────────────────────────────────────

/// Everything needed to start one engine for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLaunch {
    /// Engine executable.
    pub binary: PathBuf,
    /// Game variant (`--game`).
    pub game: String,
    /// Model directory (`--az_path`).
    pub az_path: PathBuf,
    /// Checkpoint number (`--az_checkpoint`).
    pub az_checkpoint: u32,
    /// Working directory for the child, if any.
    pub working_dir: Option<PathBuf>,
    /// Side assignment for the human player.
    pub order: PlayerOrder,
}

impl EngineLaunch {
    /// Combine the deployment's engine settings with a game's player order.
    #[must_use]
    pub fn new(config: &EngineConfig, order: PlayerOrder) -> Self {
        Self {
            binary: config.binary.clone(),
            game: config.game.clone(),
            az_path: config.az_path.clone(),
            az_checkpoint: config.az_checkpoint,
            working_dir: config.working_dir.clone(),
            order,
        }
    }

    /// Command-line arguments, one flag per argv entry.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let (player1, player2) = self.order.player_flags();
        vec![
            format!("--game={}", self.game),
            format!("--az_path={}", self.az_path.display()),
            format!("--az_checkpoint={}", self.az_checkpoint),
            format!("--player1={player1}"),
            format!("--player2={player2}"),
        ]
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Exclusive handle to a running engine.
///
/// Dropping the handle does not stop the supervisor; call [`Self::kill`].
#[derive(Debug)]
pub struct EngineHandle {
    pid: Option<u32>,
    writer: EngineWriter,
    kill: CancellationToken,
    exited: Arc<AtomicBool>,
}

impl EngineHandle {
    /// OS process id, if the platform reported one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write a human move to the engine.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WriteClosed` once the process has exited.
    pub async fn write_move(&self, column: Column) -> Result<()> {
        if self.has_exited() {
            return Err(AppError::WriteClosed("engine process has exited".into()));
        }
        self.writer.write_move(column).await
    }

    /// Request forcible termination. Idempotent.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Whether the supervisor has observed the process exit.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn an engine and its stream tasks.
///
/// Launch failures the OS reports immediately (missing binary, permission
/// denied) are returned here. Anything the platform reports later, such as
/// the engine rejecting its arguments and exiting, arrives on `event_tx` as
/// [`EngineEvent::ProcessExited`].
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn engine: …")`: OS spawn failure.
/// - `AppError::Spawn("failed to capture engine …")`: a stdio pipe is missing.
pub fn spawn_engine(
    launch: &EngineLaunch,
    session_id: &str,
    parser: MoveParser,
    event_tx: mpsc::Sender<EngineEvent>,
) -> Result<EngineHandle> {
    let mut cmd = Command::new(&launch.binary);
    cmd.args(launch.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &launch.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn engine {}: {err}",
            launch.binary.display()
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture engine stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture engine stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture engine stderr".into()))?;

    let pid = child.id();
    info!(
        session_id,
        pid = pid.unwrap_or(0),
        binary = %launch.binary.display(),
        order = ?launch.order,
        "engine process spawned"
    );

    let kill = CancellationToken::new();
    let reader_cancel = kill.child_token();
    let reader = tokio::spawn(reader::run_reader(
        session_id.to_owned(),
        stdout,
        parser,
        event_tx.clone(),
        reader_cancel.clone(),
    ));
    tokio::spawn(reader::run_diagnostics(session_id.to_owned(), stderr));

    let writer = EngineWriter::new(session_id, stdin);
    let exited = Arc::new(AtomicBool::new(false));

    tokio::spawn(supervise(
        session_id.to_owned(),
        child,
        Drain {
            reader,
            cancel: reader_cancel,
        },
        writer.clone(),
        event_tx,
        kill.clone(),
        Arc::clone(&exited),
    ));

    Ok(EngineHandle {
        pid,
        writer,
        kill,
        exited,
    })
}

// ── Supervisor ───────────────────────────────────────────────────────────────

/// Stdout reader task and the token that abandons it.
struct Drain {
    reader: JoinHandle<()>,
    cancel: CancellationToken,
}

async fn supervise(
    session_id: String,
    mut child: Child,
    drain: Drain,
    writer: EngineWriter,
    event_tx: mpsc::Sender<EngineEvent>,
    kill: CancellationToken,
    exited: Arc<AtomicBool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.cancelled() => {
            info!(session_id, "killing engine process");
            if let Err(err) = child.start_kill() {
                debug!(session_id, %err, "engine already gone when kill was requested");
            }
            child.wait().await
        }
    };

    exited.store(true, Ordering::SeqCst);
    writer.close().await;

    let exit_code = match status {
        Ok(status) => {
            let code = status.code();
            match code {
                Some(code) => info!(session_id, exit_code = code, "engine process exited"),
                None => info!(session_id, "engine process terminated by signal"),
            }
            code
        }
        Err(err) => {
            warn!(session_id, %err, "error waiting for engine process");
            None
        }
    };

    // A final move may be printed right before exit; deliver it first.
    let Drain { mut reader, cancel } = drain;
    let reader_task = format!("engine reader for session '{session_id}'");
    let drained = tokio::time::timeout(STDOUT_DRAIN_GRACE, &mut reader).await;
    match drained {
        Ok(result) => {
            report_join(&reader_task, &result);
        }
        Err(_elapsed) => {
            debug!(session_id, "engine stdout still open after exit, abandoning reader");
            cancel.cancel();
            report_join(&reader_task, &reader.await);
        }
    }

    if event_tx
        .send(EngineEvent::ProcessExited { exit_code })
        .await
        .is_err()
    {
        debug!(
            session_id,
            "event_tx closed before ProcessExited could be delivered"
        );
    }
}
