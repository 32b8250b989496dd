//! Live (bidirectional streaming) voice vendors.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::VendorError;
use crate::models::Focus;
use crate::prompts;
use crate::vendor::Vendor;

const GEMINI_LIVE: &str = "gemini-live";
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Mime type of microphone frames sent by the browser client.
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// What the vendor should answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Per-session configuration sent when the connection opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    pub modality: Modality,
    pub system_instruction: String,
}

impl LiveConfig {
    /// Audio replies steered by the focus prompt.
    pub fn for_focus(focus: Focus) -> Self {
        Self {
            modality: Modality::Audio,
            system_instruction: prompts::chat_prompt(focus),
        }
    }
}

/// One chunk of microphone audio, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: String,
    pub mime: String,
}

impl AudioFrame {
    pub fn pcm16k(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime: INPUT_AUDIO_MIME.to_string(),
        }
    }
}

/// Something the vendor sent back during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Base64 audio.
    Audio { data: String, mime: String },
    Text(String),
    TurnComplete,
}

/// An open streaming connection to a live vendor.
#[async_trait]
pub trait LiveConnection: Send {
    async fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), VendorError>;

    /// Next event, or `None` once the vendor has closed the stream.
    async fn next_event(&mut self) -> Result<Option<LiveEvent>, VendorError>;

    async fn close(&mut self) -> Result<(), VendorError>;
}

/// Opens live connections.
#[async_trait]
pub trait LiveVendor: Vendor {
    async fn connect(&self, config: &LiveConfig) -> Result<Box<dyn LiveConnection>, VendorError>;
}

/// Gemini Live over the `BidiGenerateContent` WebSocket.
#[derive(Debug, Clone)]
pub struct GeminiLive {
    url: String,
    api_key: String,
    model: String,
}

impl GeminiLive {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn setup_message(&self, config: &LiveConfig) -> Value {
        json!({
            "setup": {
                "model": format!("models/{}", self.model),
                "generationConfig": {"responseModalities": [config.modality]},
                "systemInstruction": {"parts": [{"text": config.system_instruction}]},
            }
        })
    }
}

impl Vendor for GeminiLive {
    fn name(&self) -> &'static str {
        GEMINI_LIVE
    }
}

#[async_trait]
impl LiveVendor for GeminiLive {
    async fn connect(&self, config: &LiveConfig) -> Result<Box<dyn LiveConnection>, VendorError> {
        let url = reqwest::Url::parse_with_params(&self.url, &[("key", &self.api_key)])
            .map_err(|e| VendorError::stream(GEMINI_LIVE, format!("invalid live url: {e}")))?;

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| VendorError::stream(GEMINI_LIVE, e))?;

        let mut connection = GeminiLiveConnection {
            socket,
            pending: VecDeque::new(),
        };
        connection.send_json(&self.setup_message(config)).await?;

        tokio::time::timeout(SETUP_TIMEOUT, connection.await_setup())
            .await
            .map_err(|_| VendorError::stream(GEMINI_LIVE, "timed out waiting for setupComplete"))??;

        tracing::debug!(model = %self.model, "live connection ready");
        Ok(Box::new(connection))
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established Gemini Live socket.
pub struct GeminiLiveConnection {
    socket: Socket,
    pending: VecDeque<LiveEvent>,
}

/// What a single server frame carried.
#[derive(Debug, Default, PartialEq, Eq)]
struct ServerFrame {
    setup_complete: bool,
    events: Vec<LiveEvent>,
}

fn parse_server_frame(value: &Value) -> ServerFrame {
    let mut frame = ServerFrame {
        setup_complete: value.get("setupComplete").is_some(),
        events: Vec::new(),
    };

    let Some(content) = value.get("serverContent") else {
        return frame;
    };

    let parts = content
        .get("modelTurn")
        .and_then(|t| t.get("parts"))
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        if let Some(inline) = part.get("inlineData") {
            if let Some(data) = inline.get("data").and_then(Value::as_str) {
                let mime = inline
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .unwrap_or("audio/pcm;rate=24000");
                frame.events.push(LiveEvent::Audio {
                    data: data.to_string(),
                    mime: mime.to_string(),
                });
            }
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            frame.events.push(LiveEvent::Text(text.to_string()));
        }
    }

    if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
        frame.events.push(LiveEvent::TurnComplete);
    }
    frame
}

impl GeminiLiveConnection {
    async fn send_json(&mut self, value: &Value) -> Result<(), VendorError> {
        self.socket
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| VendorError::stream(GEMINI_LIVE, e))
    }

    /// Read one frame; `None` when the socket is closed.
    async fn read_frame(&mut self) -> Result<Option<ServerFrame>, VendorError> {
        loop {
            let Some(message) = self.socket.next().await else {
                return Ok(None);
            };
            let message = message.map_err(|e| VendorError::stream(GEMINI_LIVE, e))?;

            let value: Value = match message {
                Message::Text(text) => serde_json::from_str(&text),
                Message::Binary(bytes) => serde_json::from_slice(&bytes),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "live vendor closed the socket");
                    return Ok(None);
                }
                _ => continue,
            }
            .map_err(|e| VendorError::format(GEMINI_LIVE, format!("invalid server frame: {e}")))?;

            return Ok(Some(parse_server_frame(&value)));
        }
    }

    async fn await_setup(&mut self) -> Result<(), VendorError> {
        loop {
            match self.read_frame().await? {
                Some(frame) if frame.setup_complete => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(VendorError::stream(GEMINI_LIVE, "closed before setup completed"));
                }
            }
        }
    }
}

#[async_trait]
impl LiveConnection for GeminiLiveConnection {
    async fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), VendorError> {
        self.send_json(&json!({
            "realtimeInput": {"audio": {"data": frame.data, "mimeType": frame.mime}}
        }))
        .await?;
        // Ends the utterance so the vendor answers this frame.
        self.send_json(&json!({"realtimeInput": {"audioStreamEnd": true}}))
            .await
    }

    async fn next_event(&mut self) -> Result<Option<LiveEvent>, VendorError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.read_frame().await? {
                Some(frame) => self.pending.extend(frame.events),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), VendorError> {
        self.socket
            .close(None)
            .await
            .map_err(|e| VendorError::stream(GEMINI_LIVE, e))
    }
}
