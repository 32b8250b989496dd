//! The companion: chat, diary, transcription and speech over fallback routers.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Settings;
use crate::diary::{DiaryParser, DiaryTextParser};
use crate::error::{CompanionError, Result};
use crate::models::{ChatMessage, Focus, GeneratedDiary};
use crate::prompts;
use crate::realtime::{GeminiLive, LiveVendor};
use crate::router::FallbackRouter;
use crate::vendor::{
    self, ChatVendor, GeminiChat, GeminiSpeech, GeminiTranscriber, GenerationConfig,
    OpenAiCompatChat, SpeechAudio, SpeechVendor, TranscriptionVendor, Vendor, VoiceOptions,
    ZhipuSpeech, ZhipuTranscriber,
};

const CHAT_HINT: &str = "DEEPSEEK_API_KEY, ZHIPU_API_KEY or GEMINI_API_KEY";
const TRANSCRIBE_HINT: &str = "ZHIPU_API_KEY or GEMINI_API_KEY";
const SPEECH_HINT: &str = "GEMINI_API_KEY or ZHIPU_API_KEY";

/// Assistant reply to a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub content: String,
    pub should_continue: bool,
}

/// Configured providers per operation, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
    pub chat: Vec<&'static str>,
    pub transcription: Vec<&'static str>,
    pub speech: Vec<&'static str>,
}

/// Result of a minimal live call to one chat vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub vendor: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

/// Vendors grouped by capability, most preferred first.
#[derive(Default)]
pub struct VendorSet {
    pub chat: Vec<Arc<dyn ChatVendor>>,
    pub transcription: Vec<Arc<dyn TranscriptionVendor>>,
    pub speech: Vec<Arc<dyn SpeechVendor>>,
    pub live: Option<Arc<dyn LiveVendor>>,
}

impl VendorSet {
    /// Build every adapter whose credential is present.
    pub fn from_settings(settings: &Settings) -> Self {
        let client = vendor::client(settings.request_timeout());
        let mut set = Self::default();

        if let Some(key) = settings.deepseek_key() {
            set.chat.push(Arc::new(OpenAiCompatChat::new(
                "deepseek",
                client.clone(),
                &settings.deepseek_base_url,
                key,
                &settings.deepseek_chat_model,
            )));
        }

        if let Some(key) = settings.zhipu_key() {
            set.chat.push(Arc::new(OpenAiCompatChat::new(
                "zhipu",
                client.clone(),
                &settings.zhipu_base_url,
                key,
                &settings.zhipu_chat_model,
            )));
            set.transcription.push(Arc::new(ZhipuTranscriber::new(
                client.clone(),
                &settings.zhipu_base_url,
                key,
                &settings.zhipu_asr_model,
            )));
        }

        if let Some(key) = settings.gemini_key() {
            set.chat.push(Arc::new(GeminiChat::new(
                client.clone(),
                &settings.gemini_base_url,
                key,
                &settings.gemini_chat_model,
            )));
            set.transcription.push(Arc::new(GeminiTranscriber::new(
                client.clone(),
                &settings.gemini_base_url,
                key,
                &settings.gemini_chat_model,
            )));
            set.speech.push(Arc::new(GeminiSpeech::new(
                client.clone(),
                &settings.gemini_base_url,
                key,
                &settings.gemini_tts_model,
            )));
            set.live = Some(Arc::new(GeminiLive::new(
                &settings.gemini_live_url,
                key,
                &settings.gemini_live_model,
            )));
        }

        // Zhipu speech sits behind Gemini.
        if let Some(key) = settings.zhipu_key() {
            set.speech.push(Arc::new(ZhipuSpeech::new(
                client,
                &settings.zhipu_base_url,
                key,
                &settings.zhipu_tts_model,
            )));
        }

        set
    }
}

pub struct Companion {
    chat: FallbackRouter<dyn ChatVendor>,
    diary: FallbackRouter<dyn ChatVendor>,
    transcription: FallbackRouter<dyn TranscriptionVendor>,
    speech: FallbackRouter<dyn SpeechVendor>,
    parser: Box<dyn DiaryParser>,
}

impl Companion {
    pub fn new(vendors: &VendorSet) -> Self {
        let mut chat = FallbackRouter::new("process chat request", CHAT_HINT);
        let mut diary = FallbackRouter::new("generate diary", CHAT_HINT);
        for provider in &vendors.chat {
            chat = chat.with(Arc::clone(provider));
            diary = diary.with(Arc::clone(provider));
        }

        let transcription = vendors
            .transcription
            .iter()
            .fold(FallbackRouter::new("transcribe audio", TRANSCRIBE_HINT), |r, p| {
                r.with(Arc::clone(p))
            });
        let speech = vendors
            .speech
            .iter()
            .fold(FallbackRouter::new("generate speech", SPEECH_HINT), |r, p| {
                r.with(Arc::clone(p))
            });

        Self {
            chat,
            diary,
            transcription,
            speech,
            parser: Box::new(DiaryTextParser::new()),
        }
    }

    /// Swap the diary parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn DiaryParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Produce the assistant's next turn.
    ///
    /// With no messages yet, the companion opens the conversation.
    pub async fn reply(&self, messages: &[ChatMessage], focus: Focus) -> Result<ChatReply> {
        let system_prompt = prompts::chat_prompt(focus);
        let opening;
        let messages = if messages.is_empty() {
            opening = [ChatMessage::user(prompts::OPENING_CUE)];
            &opening[..]
        } else {
            messages
        };

        let content = self
            .chat
            .execute(|vendor| {
                let system_prompt = system_prompt.as_str();
                async move {
                    vendor
                        .complete(system_prompt, messages, &GenerationConfig::CHAT)
                        .await
                }
            })
            .await?;

        tracing::debug!(%focus, turns = messages.len(), "chat reply generated");
        Ok(ChatReply {
            content: content.trim().to_string(),
            should_continue: true,
        })
    }

    /// Write and parse a diary entry for a finished conversation.
    pub async fn generate_diary(&self, conversation: &[ChatMessage]) -> Result<GeneratedDiary> {
        if conversation.is_empty() {
            return Err(CompanionError::InvalidRequest("Conversation is empty".into()));
        }

        let request = [ChatMessage::user(prompts::diary_request(conversation))];
        let text = self
            .diary
            .execute(|vendor| {
                let request = &request[..];
                async move {
                    vendor
                        .complete(prompts::DIARY_WRITER_PERSONA, request, &GenerationConfig::DIARY)
                        .await
                }
            })
            .await?;

        let diary = self.parser.parse(&text);
        tracing::info!(weather = %diary.weather, moods = ?diary.mood_tags, "diary generated");
        Ok(diary)
    }

    pub async fn transcribe(&self, audio: &[u8], mime_hint: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(CompanionError::InvalidRequest("No audio file provided".into()));
        }

        self.transcription
            .execute(|vendor| async move { vendor.transcribe(audio, mime_hint).await })
            .await
    }

    pub async fn synthesize(&self, text: &str, voice: &VoiceOptions) -> Result<SpeechAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CompanionError::InvalidRequest("No text provided".into()));
        }

        self.speech
            .execute(|vendor| async move { vendor.synthesize(text, voice).await })
            .await
    }

    pub fn providers(&self) -> ProviderReport {
        ProviderReport {
            chat: self.chat.provider_names(),
            transcription: self.transcription.provider_names(),
            speech: self.speech.provider_names(),
        }
    }

    /// Send a tiny completion to every chat vendor, bypassing fallback.
    pub async fn probe(&self) -> Vec<ProbeResult> {
        let hello = [ChatMessage::user("Hello")];
        let mut results = Vec::with_capacity(self.chat.providers().len());

        for vendor in self.chat.providers() {
            let outcome = vendor.complete("", &hello, &GenerationConfig::PROBE).await;
            if let Err(error) = &outcome {
                tracing::warn!(vendor = vendor.name(), %error, "probe failed");
            }
            results.push(ProbeResult {
                vendor: vendor.name(),
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        results
    }
}
