//! Diary entry derived from a conversation.

use serde::{Deserialize, Serialize};

/// Weather used when none can be extracted.
pub const DEFAULT_WEATHER: &str = "晴天";

/// Mood tag used when none can be extracted.
pub const DEFAULT_MOOD: &str = "平静";

/// Weather options the diary prompt offers to the model.
pub const WEATHER_OPTIONS: &[&str] = &["晴天", "多云", "阴天", "小雨", "大雨", "雪", "雾"];

/// Mood tags the diary prompt offers to the model.
pub const MOOD_TAGS: &[&str] = &[
    "平静", "开心", "忧郁", "感激", "疲惫", "期待", "焦虑", "满足", "思考", "温暖",
];

/// Structured diary produced from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDiary {
    pub weather: String,
    /// Never empty.
    pub mood_tags: Vec<String>,
    pub content: String,
}

impl GeneratedDiary {
    /// The default shell with the given body.
    pub fn fallback(content: impl Into<String>) -> Self {
        Self {
            weather: DEFAULT_WEATHER.to_string(),
            mood_tags: vec![DEFAULT_MOOD.to_string()],
            content: content.into(),
        }
    }
}
