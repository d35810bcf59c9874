//! Data sources a tracking job can target

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External data provider a task is looked up against.
///
/// `Google` and `Yandex` are organic web search engines sharing one lookup
/// contract; `Wordstat` is the keyword-frequency service whose integer answer
/// is stored in the rank slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Google,
    Yandex,
    Wordstat,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Google, Source::Yandex, Source::Wordstat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Yandex => "yandex",
            Self::Wordstat => "wordstat",
        }
    }

    /// Whether this source answers with a SERP rank (as opposed to a frequency).
    pub fn is_organic(&self) -> bool {
        matches!(self, Self::Google | Self::Yandex)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "yandex" => Ok(Self::Yandex),
            "wordstat" => Ok(Self::Wordstat),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}
