//! Endpoint handlers.
//!
//! Each handler decodes its wire payload, calls exactly one registry
//! operation, and lets [`AppError`]'s `IntoResponse` pick the status code.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, Instrument};

use super::AppState;
use crate::engine::{Column, PlayerOrder};
use crate::{AppError, Result};

/// Body of `POST /api/start-game`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    /// Client-chosen game id.
    pub game_id: String,
    /// `"first"` when the human opens, `"second"` when the engine does.
    pub player_order: PlayerOrder,
}

/// Body of `POST /api/send-move`.
///
/// `move` is kept as raw JSON so a non-integer is reported as an invalid
/// move rather than a generic decoding failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMoveRequest {
    /// Target game.
    pub game_id: String,
    /// Column index chosen by the human.
    #[serde(rename = "move", default)]
    pub column: Value,
}

/// Body of `POST /api/end-game`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameRequest {
    /// Game to end.
    pub game_id: String,
}

/// Query of `GET /api/get-model-move`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameQuery {
    /// Game whose engine move is requested.
    pub game_id: String,
}

/// Success body for commands.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    /// Always `true`.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl Ack {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_owned(),
        })
    }
}

/// Success body for `GET /api/get-model-move`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelMove {
    /// Column chosen by the engine.
    #[serde(rename = "move")]
    pub column: Column,
}

/// `POST /api/start-game`: spawn an engine for the game, replacing any
/// previous one with the same id.
///
/// # Errors
///
/// `InvalidRequest` for a bad body, `Capacity` when full, `Spawn` when the
/// engine cannot be launched.
pub async fn start_game(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<StartGameRequest>, JsonRejection>,
) -> Result<Json<Ack>> {
    let Json(request) = payload.map_err(|err| AppError::InvalidRequest(err.body_text()))?;

    state
        .registry
        .create_session(&request.game_id, request.player_order)
        .await?;
    Ok(Ack::new("Game started"))
}

/// `POST /api/send-move`: forward the human's column to the engine.
///
/// # Errors
///
/// `InvalidMove` for a non-integer or off-board column, `SessionNotFound`,
/// or `WriteClosed`.
pub async fn send_move(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SendMoveRequest>, JsonRejection>,
) -> Result<Json<Ack>> {
    let Json(request) = payload.map_err(|err| AppError::InvalidRequest(err.body_text()))?;

    let raw = request
        .column
        .as_i64()
        .ok_or_else(|| AppError::InvalidMove(format!("move must be an integer, got {}", request.column)))?;

    state.registry.send_move(&request.game_id, raw).await?;
    Ok(Ack::new("Move sent to engine"))
}

/// `GET /api/get-model-move`: the engine's next move, waiting for it if
/// necessary.
///
/// # Errors
///
/// `SessionNotFound`, `AlreadyWaiting`, `MoveTimeout` or `ProcessExited`.
pub async fn get_model_move(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<GameQuery>, QueryRejection>,
) -> Result<Json<ModelMove>> {
    let Query(query) = query.map_err(|err| AppError::InvalidRequest(err.body_text()))?;
    let span = info_span!("get_model_move", session_id = %query.game_id);

    async move {
        let column = state.registry.request_move(&query.game_id).await?;
        info!(column, "engine move returned");
        Ok(Json(ModelMove { column }))
    }
    .instrument(span)
    .await
}

/// `POST /api/end-game`: kill the engine and forget the game. Idempotent.
///
/// # Errors
///
/// `InvalidRequest` for a bad body.
pub async fn end_game(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<EndGameRequest>, JsonRejection>,
) -> Result<Json<Ack>> {
    let Json(request) = payload.map_err(|err| AppError::InvalidRequest(err.body_text()))?;

    if state.registry.remove(&request.game_id).await {
        Ok(Ack::new("Game ended"))
    } else {
        Ok(Ack::new("No such game"))
    }
}
