//! Best-effort parser for generated diary text.
//!
//! The diary prompt asks for this layout:
//!
//! ```text
//! weather: 多云
//! mood: [思考, 期待]
//! ---
//! body
//! ---
//! ```
//!
//! Models do not always comply, so parsing degrades in steps: the strict
//! layout first, then a line scan, then defaults. It never fails.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{GeneratedDiary, DEFAULT_MOOD, DEFAULT_WEATHER};

static WEATHER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s*#]*(?:weather|天气)\**\s*[:：]\s*(.*?)\s*$").expect("weather pattern")
});

static MOOD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s*#]*(?:mood|心情)\**\s*[:：]\s*(.*?)\s*$").expect("mood pattern")
});

static SEPARATOR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-{3,}\s*$").expect("separator pattern"));

static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[\w-]*\s*$").expect("fence pattern"));

/// Converts a vendor's raw diary text into a [`GeneratedDiary`].
pub trait DiaryParser: Send + Sync {
    fn parse(&self, text: &str) -> GeneratedDiary;
}

/// Default parser: strict fielded layout with a heuristic fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiaryTextParser;

impl DiaryTextParser {
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    Weather(&'a str),
    Mood { tags: Vec<String>, bracketed: bool },
    Separator,
    Fence,
    Text(&'a str),
}

impl Line<'_> {
    const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

fn classify(line: &str) -> Line<'_> {
    if SEPARATOR_LINE.is_match(line) {
        return Line::Separator;
    }
    if FENCE_LINE.is_match(line) {
        return Line::Fence;
    }
    if let Some(caps) = WEATHER_LINE.captures(line) {
        return Line::Weather(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(caps) = MOOD_LINE.captures(line) {
        let value = caps.get(1).map_or("", |m| m.as_str());
        let (inner, bracketed) = strip_brackets(value);
        return Line::Mood {
            tags: split_tags(inner),
            bracketed,
        };
    }
    Line::Text(line)
}

fn strip_brackets(value: &str) -> (&str, bool) {
    let value = value.trim();
    for (open, close) in [('[', ']'), ('【', '】')] {
        if let Some(inner) = value.strip_prefix(open).and_then(|v| v.strip_suffix(close)) {
            return (inner, true);
        }
    }
    (value, false)
}

fn split_tags(list: &str) -> Vec<String> {
    list.split([',', '，'])
        .map(|t| t.trim().trim_matches(|c: char| c == '"' || c == '\'').trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Join the text lines of a region, dropping metadata, and trim the result.
fn join_text(lines: &[(usize, &str, Line<'_>)]) -> String {
    lines
        .iter()
        .filter(|(_, _, kind)| kind.is_text())
        .map(|(_, raw, _)| *raw)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First region between two consecutive separators that holds any text.
fn delimited_body(lines: &[(usize, &str, Line<'_>)]) -> Option<String> {
    let separators: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, (_, _, kind))| *kind == Line::Separator)
        .map(|(pos, _)| pos)
        .collect();

    separators.windows(2).find_map(|pair| {
        let body = join_text(&lines[pair[0] + 1..pair[1]]);
        (!body.is_empty()).then_some(body)
    })
}

/// Line scan used when the strict layout is incomplete.
fn scanned_body(lines: &[(usize, &str, Line<'_>)]) -> Option<String> {
    let mut collected = Vec::new();
    let mut seen_metadata = false;

    for (index, raw, kind) in lines {
        match kind {
            Line::Weather(_) | Line::Mood { .. } | Line::Separator => {
                seen_metadata = true;
            }
            Line::Fence => {}
            Line::Text(_) if seen_metadata || *index > 0 => collected.push(*raw),
            Line::Text(_) => {}
        }
    }

    let body = collected.join("\n").trim().to_string();
    (!body.is_empty()).then_some(body)
}

/// Remove any metadata or separator lines left in the content.
fn cleanup(content: &str) -> String {
    content
        .lines()
        .filter(|line| classify(line).is_text())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

impl DiaryParser for DiaryTextParser {
    fn parse(&self, text: &str) -> GeneratedDiary {
        let lines: Vec<(usize, &str, Line<'_>)> = text
            .lines()
            .enumerate()
            .map(|(index, raw)| (index, raw, classify(raw)))
            .collect();

        let weather = lines.iter().find_map(|(_, _, kind)| match kind {
            Line::Weather(value) if !value.is_empty() => Some((*value).to_string()),
            _ => None,
        });

        let mood = lines.iter().find_map(|(_, _, kind)| match kind {
            Line::Mood { tags, bracketed } if !tags.is_empty() => Some((tags.clone(), *bracketed)),
            _ => None,
        });

        let strict_body = delimited_body(&lines);
        let strict = weather.is_some() && matches!(mood, Some((_, true))) && strict_body.is_some();

        let body = if strict {
            strict_body
        } else {
            tracing::debug!("diary text not in strict layout, scanning lines");
            scanned_body(&lines)
        };

        let mut content = body.map(|b| cleanup(&b)).unwrap_or_default();
        if content.is_empty() {
            content = text.trim().to_string();
        }

        GeneratedDiary {
            weather: weather.unwrap_or_else(|| DEFAULT_WEATHER.to_string()),
            mood_tags: mood.map_or_else(|| vec![DEFAULT_MOOD.to_string()], |(tags, _)| tags),
            content,
        }
    }
}
