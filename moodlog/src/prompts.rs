//! System prompts for the companion and the diary writer.

use crate::models::{ChatMessage, Focus, MOOD_TAGS, WEATHER_OPTIONS};

const COMPANION_BASE: &str = "你是一位温暖、耐心的日记陪伴者。你的任务是通过轻松自然的对话，\
帮助用户回顾今天。每次只问一个问题，回复简短（不超过三句话），先回应用户的感受，再温和地追问。\
不要说教，不要给出长篇建议。";

const FOCUS_EVENT: &str = "本次对话侧重于今天发生的事情：时间、地点、人物和经过。";
const FOCUS_EMOTION: &str = "本次对话侧重于用户的情绪：引导用户说出感受，并接纳所有情绪。";
const FOCUS_GROWTH: &str = "本次对话侧重于成长与收获：今天学到了什么，有什么想要改进的。";
const FOCUS_ALL: &str = "本次对话没有固定主题，跟随用户的兴趣自然展开。";

/// Stands in for the user's first turn so the companion opens the conversation.
pub const OPENING_CUE: &str = "请开始今天的对话。";

/// Persona given to vendors when writing the diary.
pub const DIARY_WRITER_PERSONA: &str =
    "你是一位专业的日记作家，擅长将对话内容转化为温暖治愈的散文式日记。";

/// Instruction sent to Gemini when it is used for transcription.
pub const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe the speech in this audio verbatim. Reply with the transcript only.";

/// Build the companion system prompt for a focus.
pub fn chat_prompt(focus: Focus) -> String {
    let focus_line = match focus {
        Focus::Event => FOCUS_EVENT,
        Focus::Emotion => FOCUS_EMOTION,
        Focus::Growth => FOCUS_GROWTH,
        Focus::All => FOCUS_ALL,
    };
    format!("{COMPANION_BASE}\n{focus_line}")
}

/// Instruction asking for the fielded diary layout the parser expects.
pub fn diary_instruction() -> String {
    format!(
        "请根据下面的对话，以第一人称写一篇日记。严格按照以下格式输出，不要输出其他内容：\n\
         weather: <从 {weather} 中选择一个>\n\
         mood: [<从 {moods} 中选择一到三个，用英文逗号分隔>]\n\
         ---\n\
         <日记正文，200 到 400 字，散文风格>\n\
         ---",
        weather = WEATHER_OPTIONS.join("、"),
        moods = MOOD_TAGS.join("、"),
    )
}

/// Flatten a conversation into `speaker: text` lines.
pub fn transcript(conversation: &[ChatMessage]) -> String {
    conversation
        .iter()
        .map(|m| format!("{}: {}", m.role.transcript_label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The full user prompt for diary generation.
pub fn diary_request(conversation: &[ChatMessage]) -> String {
    format!(
        "{}\n\n以下是对话内容：\n{}",
        diary_instruction(),
        transcript(conversation)
    )
}

/// Prompt that asks a TTS model to read text aloud at a given pace.
pub fn speech_request(text: &str, speed: Option<f32>) -> String {
    let pace = match speed {
        Some(s) if s < 0.9 => "用较慢、舒缓的语速",
        Some(s) if s > 1.1 => "用稍快的语速",
        _ => "用自然的语速",
    };
    format!("请{pace}朗读以下文字：{text}")
}
