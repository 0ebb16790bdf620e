//! HTTP facade for the web client.
//!
//! Mounts the game endpoints behind an axum router:
//!
//! | Route                    | Handler                         |
//! |--------------------------|---------------------------------|
//! | `POST /api/start-game`   | [`handlers::start_game`]        |
//! | `POST /api/send-move`    | [`handlers::send_move`]         |
//! | `GET /api/get-model-move`| [`handlers::get_model_move`]    |
//! | `POST /api/end-game`     | [`handlers::end_game`]          |
//! | `GET /health`            | liveness probe                  |
//!
//! A CORS middleware lets the browser client, served from another origin,
//! call the API.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{GlobalConfig, HttpConfig};
use crate::session::SessionRegistry;
use crate::{AppError, Result};

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Live game sessions.
    pub registry: SessionRegistry,
}

impl AppError {
    /// HTTP status the facade answers with for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidMove(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyWaiting(_) => StatusCode::CONFLICT,
            Self::ProcessExited(_) => StatusCode::GONE,
            Self::MoveTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Io(_) | Self::Spawn(_) | Self::WriteClosed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            info!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the facade router.
///
/// # Errors
///
/// Returns `AppError::Config` if the configured CORS origin is not a valid
/// header value.
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.config.http.allowed_origin).map_err(|err| {
        AppError::Config(format!(
            "invalid http.allowed_origin '{}': {err}",
            state.config.http.allowed_origin
        ))
    })?;

    Ok(Router::new()
        .route("/api/start-game", post(handlers::start_game))
        .route("/api/send-move", post(handlers::send_move))
        .route("/api/get-model-move", get(handlers::get_model_move))
        .route("/api/end-game", post(handlers::end_game))
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn_with_state(origin, cors)))
}

/// Add CORS headers and answer preflight requests.
async fn cors(State(origin): State<HeaderValue>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Bind the facade's listener from configuration.
///
/// # Errors
///
/// Returns `AppError::Config` if the address is invalid or cannot be bound.
pub async fn bind(config: &HttpConfig) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| AppError::Config(format!("invalid http address: {err}")))?;

    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {addr}: {err}")))
}

/// Serve the facade on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` for an invalid CORS origin and `AppError::Io`
/// if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let app = router(state)?;
    let bind = listener.local_addr()?;
    info!(%bind, "starting HTTP facade");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP facade shut down");
    Ok(())
}
