//! Runtime configuration.
//!
//! Every setting can be given as a flag or through the environment. A `.env`
//! file in the working directory, or in `<config dir>/moodlog/.env`, is loaded
//! before arguments are parsed.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

const CONFIG_DIR: &str = "moodlog";
const ENV_FILE: &str = ".env";
const GEMINI_LIVE_URL: &str = concat!(
    "wss://generativelanguage.googleapis.com/ws/",
    "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
);

/// Vendor credentials, endpoints and timing knobs.
///
/// Timing values are whole seconds and must be at least one.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// DeepSeek API key (enables DeepSeek chat)
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true, global = true)]
    pub deepseek_api_key: Option<String>,

    /// Zhipu API key (enables Zhipu chat, transcription and speech)
    #[arg(long, env = "ZHIPU_API_KEY", hide_env_values = true, global = true)]
    pub zhipu_api_key: Option<String>,

    /// Gemini API key (enables Gemini chat, transcription, speech and live voice)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    #[arg(
        long,
        env = "DEEPSEEK_BASE_URL",
        default_value = "https://api.deepseek.com/v1",
        hide = true,
        global = true
    )]
    pub deepseek_base_url: String,

    #[arg(
        long,
        env = "ZHIPU_BASE_URL",
        default_value = "https://open.bigmodel.cn/api/paas/v4",
        hide = true,
        global = true
    )]
    pub zhipu_base_url: String,

    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta",
        hide = true,
        global = true
    )]
    pub gemini_base_url: String,

    #[arg(
        long,
        env = "GEMINI_LIVE_URL",
        default_value = GEMINI_LIVE_URL,
        hide = true,
        global = true
    )]
    pub gemini_live_url: String,

    #[arg(
        long,
        env = "DEEPSEEK_CHAT_MODEL",
        default_value = "deepseek-chat",
        hide = true,
        global = true
    )]
    pub deepseek_chat_model: String,

    #[arg(
        long,
        env = "ZHIPU_CHAT_MODEL",
        default_value = "glm-4-flash",
        hide = true,
        global = true
    )]
    pub zhipu_chat_model: String,

    #[arg(long, env = "ZHIPU_ASR_MODEL", default_value = "glm-asr", hide = true, global = true)]
    pub zhipu_asr_model: String,

    #[arg(long, env = "ZHIPU_TTS_MODEL", default_value = "glm-tts", hide = true, global = true)]
    pub zhipu_tts_model: String,

    #[arg(
        long,
        env = "GEMINI_CHAT_MODEL",
        default_value = "gemini-2.5-flash",
        hide = true,
        global = true
    )]
    pub gemini_chat_model: String,

    #[arg(
        long,
        env = "GEMINI_TTS_MODEL",
        default_value = "gemini-2.5-flash-preview-tts",
        hide = true,
        global = true
    )]
    pub gemini_tts_model: String,

    #[arg(
        long,
        env = "GEMINI_LIVE_MODEL",
        default_value = "gemini-2.5-flash-native-audio-preview-12-2025",
        hide = true,
        global = true
    )]
    pub gemini_live_model: String,

    /// Close realtime sessions idle for this many seconds
    #[arg(
        long,
        env = "MOODLOG_IDLE_TIMEOUT_SECS",
        default_value = "1800",
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub idle_timeout_secs: u64,

    /// How often idle realtime sessions are swept, in seconds
    #[arg(
        long,
        env = "MOODLOG_SWEEP_INTERVAL_SECS",
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub sweep_interval_secs: u64,

    /// Longest wait for a live vendor to finish one turn, in seconds
    #[arg(
        long,
        env = "MOODLOG_TURN_TIMEOUT_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub turn_timeout_secs: u64,

    /// Timeout for each vendor HTTP request, in seconds
    #[arg(
        long,
        env = "MOODLOG_REQUEST_TIMEOUT_SECS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub request_timeout_secs: u64,
}

impl Settings {
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub const fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn deepseek_key(&self) -> Option<&str> {
        non_empty(self.deepseek_api_key.as_deref())
    }

    pub fn zhipu_key(&self) -> Option<&str> {
        non_empty(self.zhipu_api_key.as_deref())
    }

    pub fn gemini_key(&self) -> Option<&str> {
        non_empty(self.gemini_api_key.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Load `.env` files into the process environment.
///
/// Values already present in the environment win over file values, and the
/// working directory file wins over the user config one.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }

    if let Some(path) = user_env_file() {
        if path.is_file() && dotenvy::from_path(&path).is_ok() {
            loaded.push(path);
        }
    }

    loaded
}

fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(ENV_FILE))
}
