use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static EPISODE_STEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<title>.+?)\s+episode\s+(?P<episode>\d+)\s*$")
        .unwrap_or_else(|err| panic!("episode filename pattern is invalid: {err}"))
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ValidationError {
    #[error("missing search query")]
    EmptyQuery,
    #[error("catalog index must be positive (got {0})")]
    NonPositiveIndex(i64),
    #[error("episode must be positive (got {0})")]
    NonPositiveEpisode(i64),
    #[error("episode {episode} is outside 1..={available}")]
    EpisodeOutOfRange { episode: u32, available: u32 },
    #[error("invalid episode selector `{0}`")]
    InvalidSelector(String),
    #[error("unknown translation mode `{0}` (expected sub or dub)")]
    UnknownMode(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TranslationMode {
    #[default]
    Sub,
    Dub,
}

impl TranslationMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Dub => "dub",
        }
    }

    /// Blank input means the default (`sub`).
    pub(crate) fn parse_or_default(raw: Option<&str>) -> Result<Self, ValidationError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for TranslationMode {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sub" => Ok(Self::Sub),
            "dub" => Ok(Self::Dub),
            _ => Err(ValidationError::UnknownMode(raw.trim().to_string())),
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EpisodeSelector {
    Single(u32),
    Range { start: u32, end: u32 },
}

impl EpisodeSelector {
    pub(crate) fn single(episode: i64) -> Result<Self, ValidationError> {
        Ok(Self::Single(positive_episode(episode)?))
    }

    pub(crate) fn is_range(self) -> bool {
        matches!(self, Self::Range { .. })
    }

    pub(crate) fn last(self) -> u32 {
        match self {
            Self::Single(episode) => episode,
            Self::Range { end, .. } => end,
        }
    }
}

impl FromStr for EpisodeSelector {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let invalid = || ValidationError::InvalidSelector(trimmed.to_string());
        let parse = |part: &str| part.trim().parse::<i64>().map_err(|_| invalid());

        let Some((start_raw, end_raw)) = trimmed.split_once('-') else {
            return Self::single(parse(trimmed)?);
        };
        let start = positive_episode(parse(start_raw)?)?;
        let end = positive_episode(parse(end_raw)?)?;
        if end < start {
            return Err(invalid());
        }
        if start == end {
            return Ok(Self::Single(start));
        }
        Ok(Self::Range { start, end })
    }
}

impl fmt::Display for EpisodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(episode) => write!(f, "{episode}"),
            Self::Range { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

fn positive_episode(episode: i64) -> Result<u32, ValidationError> {
    if episode < 1 {
        return Err(ValidationError::NonPositiveEpisode(episode));
    }
    u32::try_from(episode).map_err(|_| ValidationError::InvalidSelector(episode.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadRequest {
    pub(crate) title: String,
    pub(crate) mode: TranslationMode,
    pub(crate) catalog_index: u32,
    pub(crate) selector: EpisodeSelector,
}

impl DownloadRequest {
    pub(crate) fn new(
        title: &str,
        mode: TranslationMode,
        catalog_index: i64,
        selector: EpisodeSelector,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        if catalog_index < 1 {
            return Err(ValidationError::NonPositiveIndex(catalog_index));
        }
        let catalog_index = u32::try_from(catalog_index)
            .map_err(|_| ValidationError::NonPositiveIndex(catalog_index))?;
        Ok(Self {
            title: title.to_string(),
            mode,
            catalog_index,
            selector,
        })
    }

    /// Rejects selectors reaching past the episode count the catalog reported.
    pub(crate) fn check_available(&self, available: Option<u32>) -> Result<(), ValidationError> {
        match available {
            Some(available) if self.selector.last() > available => {
                Err(ValidationError::EpisodeOutOfRange {
                    episode: self.selector.last(),
                    available,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Splits a media file stem following the `<Title> Episode <N>` convention.
///
/// Stems that do not follow it are a single-episode title named after the
/// whole stem. Episode numbers must be positive integers.
pub(crate) fn parse_title_and_episode(stem: &str) -> (String, u32) {
    if let Some(captures) = EPISODE_STEM.captures(stem)
        && let Ok(episode) = captures["episode"].parse::<u32>()
        && episode > 0
    {
        return (captures["title"].trim().to_string(), episode);
    }
    (stem.trim().to_string(), 1)
}

/// Like [`parse_title_and_episode`] but only when the convention matched.
pub(crate) fn parse_episode_suffix(stem: &str) -> Option<(String, u32)> {
    let captures = EPISODE_STEM.captures(stem)?;
    let episode = captures["episode"].parse::<u32>().ok().filter(|ep| *ep > 0)?;
    Some((captures["title"].trim().to_string(), episode))
}

pub(crate) fn normalize_title(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub(crate) fn format_timestamp_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
