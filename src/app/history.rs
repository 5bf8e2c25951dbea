use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::episode::{normalize_title, parse_episode_suffix};

pub(crate) const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub(crate) enum EventKind {
    SearchDownload,
    SeasonDownload,
    PlayEpisode,
    PlayDownloadedFile,
    Generic,
    Other(String),
}

impl EventKind {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::SearchDownload => "search-download",
            Self::SeasonDownload => "season-download",
            Self::PlayEpisode => "play-episode",
            Self::PlayDownloadedFile => "play-downloaded-file",
            Self::Generic => "generic",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "search-download" => Self::SearchDownload,
            "season-download" => Self::SeasonDownload,
            "play-episode" => Self::PlayEpisode,
            "play-downloaded-file" => Self::PlayDownloadedFile,
            "" | "generic" => Self::Generic,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HistoryEntry {
    pub(crate) timestamp: String,
    pub(crate) event: EventKind,
    #[serde(default)]
    pub(crate) details: Map<String, Value>,
}

impl HistoryEntry {
    pub(crate) fn new(event: EventKind, details: Map<String, Value>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event,
            details,
        }
    }

    fn detail_str(&self, key: &str) -> Option<&str> {
        self.details
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn detail_u32(&self, key: &str) -> Option<u32> {
        match self.details.get(key)? {
            Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(text) => text.trim().parse::<u32>().ok(),
            _ => None,
        }
    }

    fn filename_parts(&self) -> Option<(String, u32)> {
        let filename = self.detail_str("filename")?;
        let stem = Path::new(filename).file_stem()?.to_string_lossy().into_owned();
        parse_episode_suffix(&stem)
    }

    pub(crate) fn title(&self) -> Option<String> {
        self.detail_str("anime")
            .or_else(|| self.detail_str("title"))
            .map(str::to_string)
            .or_else(|| self.filename_parts().map(|(title, _)| title))
            .or_else(|| self.detail_str("query").map(str::to_string))
    }

    /// Falls back to the episode encoded in the recorded filename.
    pub(crate) fn episode(&self) -> Option<u32> {
        self.detail_u32("episode")
            .or_else(|| self.filename_parts().map(|(_, episode)| episode))
    }

    pub(crate) fn episode_count(&self) -> Option<u32> {
        self.detail_u32("episodes").filter(|count| *count > 0)
    }

    /// A cached local poster, else the remote cover recorded with the entry.
    pub(crate) fn poster(&self) -> Option<&str> {
        self.detail_str("poster")
            .or_else(|| self.detail_str("cover_url"))
    }

    /// Titles this entry can vouch for, normalized.
    fn title_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for raw in [self.detail_str("anime"), self.detail_str("title")]
            .into_iter()
            .flatten()
        {
            keys.push(normalize_title(raw));
        }
        if let Some((title, _)) = self.filename_parts() {
            keys.push(normalize_title(&title));
        }
        keys.sort();
        keys.dedup();
        keys
    }

    pub(crate) fn summary(&self) -> String {
        let title = self.title().unwrap_or_else(|| "unknown title".to_string());
        let episode = self
            .episode()
            .map(|episode| format!(" episode {episode}"))
            .unwrap_or_default();
        match &self.event {
            EventKind::SearchDownload => format!("Downloaded {title}{episode}"),
            EventKind::PlayEpisode => format!("Played {title}{episode}"),
            EventKind::PlayDownloadedFile => format!("Played downloaded {title}{episode}"),
            EventKind::SeasonDownload => match self.detail_str("range") {
                Some(range) => format!("Started season download of {title} episodes {range}"),
                None => format!("Started season download of {title}"),
            },
            EventKind::Generic | EventKind::Other(_) => {
                let label = capitalized_label(self.event.as_str());
                match self.title() {
                    Some(title) => format!("{label}: {title}"),
                    None => label,
                }
            }
        }
    }
}

fn capitalized_label(kind: &str) -> String {
    let spaced = kind.replace(['-', '_'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Event".to_string(),
    }
}

/// Bounded, file-backed log of user actions. Only the newest
/// [`HISTORY_LIMIT`] entries survive an append.
#[derive(Debug)]
pub(crate) struct HistoryStore {
    path: PathBuf,
    limit: usize,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self::with_limit(path, HISTORY_LIMIT)
    }

    pub(crate) fn with_limit(path: PathBuf, limit: usize) -> Self {
        Self {
            path,
            limit: limit.max(1),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn append(
        &self,
        event: EventKind,
        details: Map<String, Value>,
    ) -> io::Result<HistoryEntry> {
        let entry = HistoryEntry::new(event, details);
        let _guard = self.lock();
        let mut entries = self.load();
        entries.push(entry.clone());
        if entries.len() > self.limit {
            entries.drain(..entries.len() - self.limit);
        }
        self.persist(&entries)?;
        tracing::debug!(event = %entry.event, kept = entries.len(), "history appended");
        Ok(entry)
    }

    /// Newest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = {
            let _guard = self.lock();
            self.load()
        };
        entries.into_iter().rev().take(limit).collect()
    }

    pub(crate) fn title_index(&self) -> TitleIndex {
        TitleIndex::from_entries(&self.recent(self.limit))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> Vec<HistoryEntry> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "history unreadable, treating as empty");
                return Vec::new();
            }
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "history corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    fn persist(&self, entries: &[HistoryEntry]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(entries).map_err(io::Error::other)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)
    }
}

/// Per-title facts derived from the history log: the largest episode count
/// ever recorded and the newest poster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TitleIndex {
    counts: HashMap<String, u32>,
    posters: HashMap<String, String>,
}

impl TitleIndex {
    /// Expects entries newest first.
    pub(crate) fn from_entries(entries: &[HistoryEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let keys = entry.title_keys();
            if let Some(count) = entry.episode_count() {
                for key in &keys {
                    let best = index.counts.entry(key.clone()).or_insert(count);
                    *best = (*best).max(count);
                }
            }
            if let Some(poster) = entry.poster() {
                for key in &keys {
                    index
                        .posters
                        .entry(key.clone())
                        .or_insert_with(|| poster.to_string());
                }
            }
        }
        index
    }

    pub(crate) fn episode_count(&self, title: &str) -> Option<u32> {
        self.counts.get(&normalize_title(title)).copied()
    }

    pub(crate) fn poster(&self, title: &str) -> Option<&str> {
        self.posters.get(&normalize_title(title)).map(String::as_str)
    }
}
