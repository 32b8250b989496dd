//! Data models for the companion.

mod diary;
mod focus;
mod message;
mod session;

pub use diary::{GeneratedDiary, DEFAULT_MOOD, DEFAULT_WEATHER, MOOD_TAGS, WEATHER_OPTIONS};
pub use focus::Focus;
pub use message::{ChatMessage, MessageRole};
pub use session::ConversationSession;
