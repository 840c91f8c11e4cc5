//! HTTP surface for browser editors.
//!
//! The server hosts edit sessions but never talks to the rendering service
//! or the store itself: each event response carries the commands the
//! browser must run, and their outcomes are posted back as events.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use sbgb::editor::SessionView;
use sbgb::{Command, Editor, EditorConfig, Event};

#[derive(Parser, Debug)]
#[command(name = "sbgb-server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Static frontend directory.
    #[arg(long, default_value = "frontend")]
    frontend: PathBuf,

    /// Editor settings (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds a session may stay untouched before it is dropped.
    #[arg(long, default_value_t = 3600)]
    session_ttl: u64,
}

struct Session {
    editor: Editor,
    last_seen: Instant,
}

impl Session {
    fn new(editor: Editor) -> Self {
        Self {
            editor,
            last_seen: Instant::now(),
        }
    }

    fn touch(&mut self) -> &mut Editor {
        self.last_seen = Instant::now();
        &mut self.editor
    }
}

type Sessions = HashMap<u64, Session>;

struct AppState {
    config: EditorConfig,
    sessions: Mutex<Sessions>,
    next_id: AtomicU64,
}

type Shared = Arc<AppState>;

impl AppState {
    fn sessions(&self) -> Result<MutexGuard<'_, Sessions>, ApiError> {
        self.sessions
            .lock()
            .map_err(|_| ApiError::Internal("session table poisoned".into()))
    }
}

/// Drop sessions idle for longer than `ttl`. Returns how many were removed.
fn expire_idle(sessions: &mut Sessions, now: Instant, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) <= ttl);
    before - sessions.len()
}

async fn reap_sessions(state: Shared, ttl: Duration) {
    let mut tick = tokio::time::interval(ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1)));
    loop {
        tick.tick().await;
        let Ok(mut sessions) = state.sessions() else {
            tracing::error!("session table poisoned, reaper stopping");
            return;
        };
        let removed = expire_idle(&mut sessions, Instant::now(), ttl);
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "expired idle sessions");
        }
    }
}

enum ApiError {
    NotFound(u64),
    Conflict(&'static str),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("no session {id}")),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[derive(Serialize)]
struct CreatedResponse {
    id: u64,
    view: SessionView,
    commands: Vec<Command>,
}

#[derive(Serialize)]
struct EventResponse {
    view: SessionView,
    commands: Vec<Command>,
}

#[derive(Serialize)]
struct PreviewResponse {
    width: u32,
    height: u32,
    data_url: String,
    thumbnail: String,
}

async fn create_session(State(state): State<Shared>) -> Result<impl IntoResponse, ApiError> {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let mut editor = Editor::new(state.config.clone());
    editor.handle(Event::BasesRequested);
    let body = CreatedResponse {
        id,
        view: editor.view(),
        commands: editor.take_commands(),
    };
    state.sessions()?.insert(id, Session::new(editor));
    tracing::info!(id, "session created");
    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_session(
    State(state): State<Shared>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>, ApiError> {
    let mut sessions = state.sessions()?;
    let editor = sessions.get_mut(&id).ok_or(ApiError::NotFound(id))?.touch();
    Ok(Json(editor.view()))
}

async fn delete_session(State(state): State<Shared>, Path(id): Path<u64>) -> Result<StatusCode, ApiError> {
    state.sessions()?.remove(&id).ok_or(ApiError::NotFound(id))?;
    tracing::info!(id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

async fn post_event(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(event): Json<Event>,
) -> Result<Json<EventResponse>, ApiError> {
    let mut sessions = state.sessions()?;
    let editor = sessions.get_mut(&id).ok_or(ApiError::NotFound(id))?.touch();
    editor.handle(event);
    Ok(Json(EventResponse {
        view: editor.view(),
        commands: editor.take_commands(),
    }))
}

async fn get_preview(
    State(state): State<Shared>,
    Path(id): Path<u64>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let (preview, thumb_size) = {
        let mut sessions = state.sessions()?;
        let editor = sessions.get_mut(&id).ok_or(ApiError::NotFound(id))?.touch();
        let preview = editor
            .download()
            .cloned()
            .ok_or(ApiError::Conflict("preview is missing or out of date"))?;
        (preview, editor.config().thumbnail_size)
    };

    let response = tokio::task::spawn_blocking(move || {
        let (width, height) = preview.dimensions();
        let thumbnail = preview.thumbnail_data_url(thumb_size)?;
        Ok::<_, sbgb::ServiceError>(PreviewResponse {
            width,
            height,
            data_url: preview.data_url(),
            thumbnail,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(response))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EditorConfig::load(path)
            .with_context(|| format!("loading editor config {}", path.display()))?,
        None => EditorConfig::default(),
    };

    let state = Arc::new(AppState {
        config,
        sessions: Mutex::new(HashMap::new()),
        next_id: AtomicU64::new(0),
    });
    tokio::spawn(reap_sessions(Arc::clone(&state), Duration::from_secs(cli.session_ttl)));

    let app = Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/events", post(post_event))
        .route("/api/sessions/{id}/preview", get(get_preview))
        .fallback_service(ServeDir::new(&cli.frontend))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(cli.addr)
        .await
        .with_context(|| format!("binding {}", cli.addr))?;
    tracing::info!("sbgb server at http://{}", cli.addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_sessions_expire_and_active_ones_stay() {
        let mut sessions = Sessions::new();
        sessions.insert(1, Session::new(Editor::new(EditorConfig::default())));
        sessions.insert(2, Session::new(Editor::new(EditorConfig::default())));
        let ttl = Duration::from_secs(60);

        let later = Instant::now() + Duration::from_secs(90);
        if let Some(s) = sessions.get_mut(&2) {
            s.last_seen = later - Duration::from_secs(10);
        }

        assert_eq!(expire_idle(&mut sessions, later, ttl), 1);
        assert!(sessions.contains_key(&2));
        assert!(!sessions.contains_key(&1));
        assert_eq!(expire_idle(&mut sessions, later, ttl), 0);
    }
}
