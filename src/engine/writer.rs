//! Engine stdin writer.
//!
//! A session has exactly one write path into its engine. The stdin handle
//! lives behind an async mutex so concurrent `send-move` calls for the same
//! game are serialised instead of interleaving bytes.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex;
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::engine::codec::EngineLineCodec;
use crate::engine::Column;
use crate::{AppError, Result};

/// Shared handle to an engine's stdin; `None` once closed.
#[derive(Debug, Clone)]
pub struct EngineWriter {
    session_id: Arc<str>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
}

impl EngineWriter {
    /// Wrap a freshly captured stdin.
    #[must_use]
    pub fn new(session_id: &str, stdin: ChildStdin) -> Self {
        Self {
            session_id: Arc::from(session_id),
            stdin: Arc::new(Mutex::new(Some(stdin))),
        }
    }

    /// Write `column` as `"<column>\n"` and flush.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WriteClosed` if stdin was already closed or the
    /// write fails (broken pipe after the engine exited). A failed write
    /// closes the writer for good.
    pub async fn write_move(&self, column: Column) -> Result<()> {
        let session_id = &*self.session_id;
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(AppError::WriteClosed(format!(
                "engine stdin closed for session '{session_id}'"
            )));
        };

        let mut buf = BytesMut::new();
        EngineLineCodec::new().encode(column, &mut buf)?;

        let written = match stdin.write_all(&buf).await {
            Ok(()) => stdin.flush().await,
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            warn!(session_id, column, %err, "engine writer: write to stdin failed");
            guard.take();
            return Err(AppError::WriteClosed(format!(
                "write to engine failed for session '{session_id}': {err}"
            )));
        }

        debug!(session_id, column, "move written to engine");
        Ok(())
    }

    /// Drop stdin so the engine sees EOF; later writes fail.
    pub async fn close(&self) {
        if self.stdin.lock().await.take().is_some() {
            debug!(session_id = &*self.session_id, "engine writer closed");
        }
    }
}
