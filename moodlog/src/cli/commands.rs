//! CLI command execution.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::companion::{Companion, VendorSet};
use crate::config::Settings;
use crate::models::{ChatMessage, ConversationSession, Focus, GeneratedDiary, MessageRole};
use crate::server;
use crate::vendor::{Vendor, VoiceOptions};

use super::args::{Cli, Commands};

/// Typed in `talk` to end the conversation.
const DONE_COMMAND: &str = "/done";

pub async fn execute(cli: Cli) -> Result<()> {
    let settings = cli.settings;

    match cli.command {
        Commands::Serve { host, port } => server::start_server(&settings, &host, port).await,
        Commands::Status { probe } => show_status(&settings, probe).await,
        Commands::Talk { focus, no_diary } => talk(&settings, focus, !no_diary).await,
        Commands::Diary { file, json } => diary_from_file(&settings, &file, json).await,
        Commands::Speak {
            output,
            speed,
            voice,
            text,
        } => speak(&settings, &text.join(" "), VoiceOptions { speed, voice }, &output).await,
        Commands::Transcribe { file, mime } => transcribe(&settings, &file, mime).await,
    }
}

fn companion(settings: &Settings) -> Companion {
    Companion::new(&VendorSet::from_settings(settings))
}

async fn show_status(settings: &Settings, probe: bool) -> Result<()> {
    let vendors = VendorSet::from_settings(settings);
    let companion = Companion::new(&vendors);
    let report = companion.providers();

    println!("Chat:          {}", list_or_none(&report.chat));
    println!("Transcription: {}", list_or_none(&report.transcription));
    println!("Speech:        {}", list_or_none(&report.speech));
    println!(
        "Live voice:    {}",
        vendors.live.as_ref().map_or("(none)", |v| v.name())
    );

    if probe {
        println!();
        for result in companion.probe().await {
            match result.error {
                None => println!("{:<10} ok", result.vendor),
                Some(error) => println!("{:<10} error: {error}", result.vendor),
            }
        }
    }
    Ok(())
}

fn list_or_none(names: &[&str]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(" -> ")
    }
}

async fn talk(settings: &Settings, focus: Focus, write_diary: bool) -> Result<()> {
    let companion = companion(settings);
    let mut session = ConversationSession::new(focus);

    println!("Focus: {focus}. Type {DONE_COMMAND} or press Ctrl-D to finish.");
    println!();

    let opening = companion.reply(session.messages(), focus).await?;
    println!("AI: {}", opening.content);
    session.push(MessageRole::Assistant, opening.content)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = line.trim();
        if line == DONE_COMMAND {
            break;
        }
        if line.is_empty() {
            continue;
        }

        session.push(MessageRole::User, line)?;
        match companion.reply(session.messages(), focus).await {
            Ok(reply) => {
                println!("AI: {}", reply.content);
                session.push(MessageRole::Assistant, reply.content)?;
            }
            Err(e) => eprintln!("Warning: {}", e.public_message()),
        }
    }

    session.close();
    tracing::info!(
        session_id = %session.id,
        turns = session.messages().len(),
        "conversation finished"
    );

    if write_diary && session.has_user_input() {
        println!();
        let diary = companion.generate_diary(session.messages()).await?;
        print_diary(&diary);
    }
    Ok(())
}

async fn diary_from_file(settings: &Settings, file: &Path, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let conversation = load_conversation(&text)?;

    let diary = companion(settings).generate_diary(&conversation).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&diary)?);
    } else {
        print_diary(&diary);
    }
    Ok(())
}

/// Read a conversation saved as a JSON message array or as a plain transcript.
///
/// Transcript lines start with a speaker label (`用户:`, `AI:`, `user:`,
/// `assistant:`); unlabeled lines continue the previous message.
fn load_conversation(text: &str) -> Result<Vec<ChatMessage>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("Invalid conversation JSON");
    }

    let mut messages: Vec<ChatMessage> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match split_speaker(line) {
            Some((role, content)) => messages.push(ChatMessage::new(role, content)),
            None => match messages.last_mut() {
                Some(previous) => {
                    previous.content.push('\n');
                    previous.content.push_str(line);
                }
                None => messages.push(ChatMessage::user(line)),
            },
        }
    }

    if messages.is_empty() {
        bail!("Conversation file is empty");
    }
    Ok(messages)
}

fn split_speaker(line: &str) -> Option<(MessageRole, &str)> {
    let (label, rest) = line.split_once([':', '：'])?;
    let role = match label.trim().to_lowercase().as_str() {
        "用户" | "me" => MessageRole::User,
        "ai" => MessageRole::Assistant,
        other => MessageRole::from_wire(other)?,
    };
    Some((role, rest.trim()))
}

fn print_diary(diary: &GeneratedDiary) {
    println!("Weather: {}", diary.weather);
    println!("Mood:    {}", diary.mood_tags.join(", "));
    println!("{}", "-".repeat(40));
    println!("{}", diary.content);
}

async fn speak(settings: &Settings, text: &str, voice: VoiceOptions, output: &Path) -> Result<()> {
    let audio = companion(settings).synthesize(text, &voice).await?;
    tokio::fs::write(output, &audio.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} bytes of {} to {}", audio.bytes.len(), audio.mime, output.display());
    Ok(())
}

async fn transcribe(settings: &Settings, file: &Path, mime: Option<String>) -> Result<()> {
    let audio = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mime = mime.unwrap_or_else(|| guess_audio_mime(file).to_string());

    let text = companion(settings).transcribe(&audio, &mime).await?;
    println!("{text}");
    Ok(())
}

fn guess_audio_mime(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg" | "oga") => "audio/ogg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("flac") => "audio/flac",
        _ => "audio/webm",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn transcript_lines_become_messages() {
        let messages = load_conversation("AI: 今天怎么样？\n用户：下雨了\n不过很开心\n").unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::Assistant);
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "下雨了\n不过很开心");
    }

    #[test]
    fn json_conversation_is_accepted() {
        let messages = load_conversation(r#"[{"role": "user", "content": "考试通过了"}]"#).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "考试通过了");
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(load_conversation("\n  \n").is_err());
    }

    #[tokio::test]
    async fn diary_file_without_vendors_fails_cleanly() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "用户: 今天散步了").unwrap();

        let settings = crate::config::testing::bare_settings();
        let err = diary_from_file(&settings, file.path(), false).await.unwrap_err();

        assert!(err.to_string().contains("no provider configured"));
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(guess_audio_mime(Path::new("a.WAV")), "audio/wav");
        assert_eq!(guess_audio_mime(Path::new("clip")), "audio/webm");
    }
}
