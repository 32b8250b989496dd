//! HTTP API.
//!
//! Endpoints:
//! - POST /api/chat - Next assistant turn
//! - POST /api/diary/generate - Diary entry from a conversation
//! - POST /api/speech/stt - Multipart `audio` field to text
//! - POST /api/speech/tts - Text to audio bytes
//! - POST /api/live-chat - Realtime voice session actions
//! - GET /api/live-chat/{id} - Realtime session status
//! - GET /api/status - Configured vendors, optionally probed

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::companion::{ChatReply, Companion, ProbeResult, ProviderReport, VendorSet};
use crate::config::Settings;
use crate::error::CompanionError;
use crate::models::{ChatMessage, Focus, GeneratedDiary};
use crate::realtime::{
    AudioFrame, MemorySessionStore, RealtimeManager, SessionStatus, TurnReply,
};
use crate::vendor::VoiceOptions;

/// Shared server state.
pub struct AppState {
    pub companion: Companion,
    pub realtime: Arc<RealtimeManager>,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> Self {
        let vendors = VendorSet::from_settings(settings);
        let realtime = RealtimeManager::new(
            vendors.live.clone(),
            Arc::new(MemorySessionStore::new()),
            settings.idle_timeout(),
            settings.turn_timeout(),
        );
        Self {
            companion: Companion::new(&vendors),
            realtime: Arc::new(realtime),
        }
    }
}

/// A `CompanionError` rendered as `{"error": ...}` with a matching status.
pub struct ApiError(CompanionError);

impl From<CompanionError> for ApiError {
    fn from(error: CompanionError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CompanionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CompanionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "request rejected");
        }

        let body = Json(ErrorBody {
            error: self.0.public_message(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn invalid(reason: &str) -> ApiError {
    ApiError(CompanionError::InvalidRequest(reason.to_string()))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        invalid(&rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the `{"error": ...}` body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// === Request/Response Types ===

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub focus: Focus,
}

/// Diary generation request. A `focus` field is accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct DiaryRequest {
    #[serde(default)]
    pub conversation: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
    pub speed: Option<f32>,
    pub voice: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatRequest {
    pub action: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub focus: Focus,
    pub audio_data: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: &'static str,
    #[serde(flatten)]
    pub turn: Option<TurnReply>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub probe: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub providers: ProviderReport,
    pub live: Option<&'static str>,
    pub live_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<Vec<ProbeResult>>,
}

// === Server Lifecycle ===

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/diary/generate", post(generate_diary))
        .route("/api/speech/stt", post(speech_to_text))
        .route("/api/speech/tts", post(text_to_speech))
        .route("/api/live-chat", post(live_chat))
        .route("/api/live-chat/{session_id}", get(live_status))
        .route("/api/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server and the idle-session reaper.
pub async fn start_server(settings: &Settings, host: &str, port: u16) -> Result<()> {
    let state = Arc::new(AppState::from_settings(settings));
    let reaper = state.realtime.spawn_reaper(settings.sweep_interval());

    let providers = state.companion.providers();
    tracing::info!(
        chat = ?providers.chat,
        transcription = ?providers.transcription,
        speech = ?providers.speech,
        live = ?state.realtime.vendor_name(),
        "providers configured"
    );

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    println!("moodlog server listening on http://{addr}");

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error");

    reaper.abort();
    tracing::info!("server stopped");
    served
}

// === Handlers ===

async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state.companion.reply(&req.messages, req.focus).await?;
    Ok(Json(reply))
}

async fn generate_diary(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<DiaryRequest>,
) -> ApiResult<Json<GeneratedDiary>> {
    let diary = state.companion.generate_diary(&req.conversation).await?;
    Ok(Json(diary))
}

async fn speech_to_text(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<TranscriptResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(CompanionError::InvalidRequest(e.body_text())))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let mime = field.content_type().unwrap_or("audio/webm").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError(CompanionError::InvalidRequest(e.body_text())))?;

        let text = state.companion.transcribe(&bytes, &mime).await?;
        return Ok(Json(TranscriptResponse { text }));
    }

    Err(invalid("No audio file provided"))
}

async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SpeechRequest>,
) -> ApiResult<Response> {
    let voice = VoiceOptions {
        speed: req.speed,
        voice: req.voice,
    };
    let audio = state.companion.synthesize(&req.text, &voice).await?;
    Ok(([(header::CONTENT_TYPE, audio.mime)], audio.bytes).into_response())
}

async fn live_chat(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LiveChatRequest>,
) -> ApiResult<Json<LiveChatResponse>> {
    let realtime = &state.realtime;

    let response = match req.action.as_str() {
        "connect" => {
            let id = realtime.connect(req.focus, req.session_id).await?;
            LiveChatResponse {
                session_id: Some(id),
                status: "connected",
                turn: None,
            }
        }
        "send_audio" => {
            let id = req.session_id.ok_or_else(|| invalid("Session ID is required"))?;
            if realtime.status(&id).await.is_none() {
                return Err(ApiError(CompanionError::SessionNotFound(id)));
            }
            let audio = req
                .audio_data
                .filter(|a| !a.is_empty())
                .ok_or_else(|| invalid("No audio data provided"))?;
            let turn = realtime.send_audio(&id, AudioFrame::pcm16k(audio)).await?;
            LiveChatResponse {
                session_id: None,
                status: "success",
                turn: Some(turn),
            }
        }
        "disconnect" => {
            if let Some(id) = &req.session_id {
                realtime.disconnect(id).await?;
            }
            LiveChatResponse {
                session_id: None,
                status: "disconnected",
                turn: None,
            }
        }
        _ => return Err(invalid("Invalid action")),
    };

    Ok(Json(response))
}

async fn live_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionStatus>> {
    let status = state.realtime.status(&session_id).await;
    status
        .map(Json)
        .ok_or(ApiError(CompanionError::SessionNotFound(session_id)))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Json<StatusReport> {
    let probes = if query.probe {
        Some(state.companion.probe().await)
    } else {
        None
    };

    Json(StatusReport {
        timestamp: Utc::now(),
        providers: state.companion.providers(),
        live: state.realtime.vendor_name(),
        live_sessions: state.realtime.session_count().await,
        probes,
    })
}
