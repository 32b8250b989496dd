//! Conversational focus chosen by the user.

use serde::{Deserialize, Serialize};

/// Theme that shapes the companion's system prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    /// What happened today.
    Event,
    /// How the user felt.
    Emotion,
    /// What the user learned.
    Growth,
    /// No particular theme.
    #[default]
    All,
}

impl Focus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Emotion => "emotion",
            Self::Growth => "growth",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for Focus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Focus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(Self::Event),
            "emotion" => Ok(Self::Emotion),
            "growth" => Ok(Self::Growth),
            "all" | "" => Ok(Self::All),
            other => Err(format!(
                "unknown focus '{other}' (expected event, emotion, growth or all)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Emotion".parse::<Focus>(), Ok(Focus::Emotion));
        assert_eq!("".parse::<Focus>(), Ok(Focus::All));
        assert!("weekend".parse::<Focus>().is_err());
    }

    #[test]
    fn defaults_to_all_when_missing() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default)]
            focus: Focus,
        }
        let body: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(body.focus, Focus::All);
    }
}
