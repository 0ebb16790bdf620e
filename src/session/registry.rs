//! Session registry: game id → [`Session`].
//!
//! The registry is an explicitly owned object, constructed at startup,
//! shared by cloning (it is an `Arc` inside), and drained by
//! [`SessionRegistry::shutdown`]. Map mutations take one coarse async
//! mutex; per-session state has its own locks, so a slow game never
//! blocks another.
//!
//! # Removal paths
//!
//! 1. Explicit [`SessionRegistry::remove`] (end of game).
//! 2. Replacement by [`SessionRegistry::create_session`] on an id collision.
//! 3. The per-session event consumer on `ProcessExited`, unless a final move
//!    is still buffered; that move is handed out once and the session is
//!    then removed by [`SessionRegistry::request_move`].
//! 4. The reaper's [`SessionRegistry::reap_exited`] backstop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, info_span, Instrument};

use crate::config::{EngineConfig, GlobalConfig};
use crate::engine::reader::MoveParser;
use crate::engine::spawner::{self, EngineLaunch};
use crate::engine::{validate_column, Column, EngineEvent, PlayerOrder};
use crate::session::{Session, SessionState};
use crate::{AppError, Result};

/// Buffer between an engine's stream tasks and its event consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Construction parameters for a [`SessionRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// How every engine is launched.
    pub engine: EngineConfig,
    /// Deadline for a blocking move request.
    pub move_timeout: Duration,
    /// Maximum number of registered games.
    pub max_sessions: usize,
}

impl RegistryOptions {
    /// Derive registry options from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            move_timeout: config.move_timeout(),
            max_sessions: config.max_sessions,
        }
    }
}

#[derive(Debug)]
struct RegistryInner {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    options: RegistryOptions,
    parser: MoveParser,
}

/// Process-wide table of live game sessions.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the engine move pattern fails to compile.
    pub fn new(options: RegistryOptions) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                options,
                parser: MoveParser::new()?,
            }),
        })
    }

    /// Deadline applied by [`Self::request_move`].
    #[must_use]
    pub fn move_timeout(&self) -> Duration {
        self.inner.options.move_timeout
    }

    /// Start a new game under `id`, replacing any game already there.
    ///
    /// The previous occupant is removed and killed under the registry lock
    /// before the new engine is spawned, so no two sessions ever share an
    /// id. The old process is not awaited.
    ///
    /// # Errors
    ///
    /// - `AppError::Capacity`: `id` is new and the registry is full.
    /// - `AppError::Spawn`: the engine could not be launched; nothing is
    ///   registered.
    pub async fn create_session(&self, id: &str, order: PlayerOrder) -> Result<Arc<Session>> {
        let span = info_span!("create_session", session_id = id, ?order);

        async move {
            let mut sessions = self.inner.sessions.lock().await;

            if let Some(previous) = sessions.remove(id) {
                info!(
                    previous_pid = previous.pid().unwrap_or(0),
                    "replacing existing session"
                );
                previous.kill();
            } else if sessions.len() >= self.inner.options.max_sessions {
                return Err(AppError::Capacity(format!(
                    "session limit reached ({}/{})",
                    sessions.len(),
                    self.inner.options.max_sessions
                )));
            }

            let launch = EngineLaunch::new(&self.inner.options.engine, order);
            let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let engine =
                spawner::spawn_engine(&launch, id, self.inner.parser.clone(), event_tx)?;

            let session = Arc::new(Session::new(id.to_owned(), engine));
            sessions.insert(id.to_owned(), Arc::clone(&session));
            drop(sessions);

            self.spawn_event_consumer(Arc::clone(&session), event_rx);
            let active = self.len().await;
            info!(active, "session started");
            Ok(session)
        }
        .instrument(span)
        .await
    }

    /// Look up a session.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.lock().await.get(id).cloned()
    }

    /// Deregister and kill a session. Returns whether one was registered.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.inner.sessions.lock().await.remove(id);
        match removed {
            Some(session) => {
                session.kill();
                info!(session_id = id, "session removed");
                true
            }
            None => {
                debug!(session_id = id, "remove on unknown session, ignoring");
                false
            }
        }
    }

    /// Validate `raw` and forward it to the engine of game `id`.
    ///
    /// The column is checked before the lookup, so an off-board move is
    /// rejected whether or not the game exists.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidMove`: `raw` is not a board column.
    /// - `AppError::SessionNotFound`: no game registered under `id`.
    /// - `AppError::WriteClosed`: the engine has exited.
    pub async fn send_move(&self, id: &str, raw: i64) -> Result<()> {
        let column = validate_column(raw)?;
        let session = self.require(id).await?;
        session.write_move(column).await?;
        info!(session_id = id, column, "human move forwarded");
        Ok(())
    }

    /// Return the engine's next move for game `id`.
    ///
    /// # Errors
    ///
    /// - `AppError::SessionNotFound`: no game registered under `id`.
    /// - Any error of [`Session::request_move`].
    pub async fn request_move(&self, id: &str) -> Result<Column> {
        let session = self.require(id).await?;
        let result = session.request_move(self.move_timeout()).await;

        if session.state() == SessionState::Closing && !session.moves().has_buffered() {
            self.remove_if_current(&session).await;
        }

        result
    }

    /// Remove every session whose engine has exited; returns their ids.
    ///
    /// A session counts as exited only once its exit event has been applied,
    /// so a final move still draining from stdout is never swept away.
    pub async fn reap_exited(&self) -> Vec<String> {
        let mut sessions = self.inner.sessions.lock().await;

        let exited: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.has_exited() && session.moves().is_closed())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &exited {
            if let Some(session) = sessions.remove(id) {
                session.kill();
            }
        }

        exited
    }

    /// Kill and deregister every session. Returns how many were drained.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            session.kill();
        }

        info!(count = drained.len(), "session registry drained");
        drained.len()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    /// Whether no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.lock().await.is_empty()
    }

    async fn require(&self, id: &str) -> Result<Arc<Session>> {
        self.get(id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(format!("no game with id '{id}'")))
    }

    /// Remove `session` only if it still occupies its id.
    async fn remove_if_current(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        let is_current = sessions
            .get(session.id())
            .is_some_and(|current| Arc::ptr_eq(current, session));

        if is_current {
            sessions.remove(session.id());
            session.kill();
            debug!(session_id = session.id(), "exited session deregistered");
        }
        is_current
    }

    /// Apply a session's engine events in arrival order.
    fn spawn_event_consumer(&self, session: Arc<Session>, mut events: mpsc::Receiver<EngineEvent>) {
        let registry = self.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EngineEvent::MoveProduced { column } => {
                        let delivery = session.moves().deliver(column);
                        debug!(session_id = session.id(), column, ?delivery, "engine move applied");
                    }
                    EngineEvent::ProcessExited { exit_code } => {
                        session.moves().process_exited(exit_code);
                        if session.moves().has_buffered() {
                            info!(
                                session_id = session.id(),
                                "engine exited with a move still buffered, keeping session"
                            );
                        } else {
                            registry.remove_if_current(&session).await;
                        }
                        break;
                    }
                }
            }
        });
    }
}
