use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::catalog::{Catalog, lookup_title};
use super::download::DownloadRoot;
use super::episode::{TranslationMode, normalize_title, parse_title_and_episode};
use super::history::{HistoryStore, TitleIndex};
use super::media::MediaFile;
use super::poster::PosterCache;

const INFERENCE_MODES: &[TranslationMode] = &[TranslationMode::Dub, TranslationMode::Sub];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LibraryEntry {
    pub(crate) title: String,
    pub(crate) poster_url: Option<String>,
    pub(crate) total_episode_count: u32,
    pub(crate) downloaded_episode_numbers: BTreeSet<u32>,
    pub(crate) file_by_episode: BTreeMap<u32, MediaFile>,
    pub(crate) most_recent_modified: SystemTime,
}

/// Media files sharing one derived title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TitleGroup {
    pub(crate) title: String,
    pub(crate) files: BTreeMap<u32, MediaFile>,
    pub(crate) most_recent_modified: SystemTime,
}

impl TitleGroup {
    pub(crate) fn max_episode(&self) -> u32 {
        self.files.keys().next_back().copied().unwrap_or(1)
    }
}

/// Groups files by normalized derived title. The newest file names the group,
/// and when two files claim the same episode the newer one is kept.
pub(crate) fn group_media_files(files: Vec<MediaFile>) -> Vec<TitleGroup> {
    let mut groups: HashMap<String, TitleGroup> = HashMap::new();
    for file in files {
        let (title, episode) = parse_title_and_episode(&file.stem());
        let group = groups
            .entry(normalize_title(&title))
            .or_insert_with(|| TitleGroup {
                title: title.clone(),
                files: BTreeMap::new(),
                most_recent_modified: file.modified,
            });
        if file.modified >= group.most_recent_modified {
            group.most_recent_modified = file.modified;
            group.title = title;
        }
        match group.files.get(&episode) {
            Some(existing) if existing.modified > file.modified => {}
            _ => {
                group.files.insert(episode, file);
            }
        }
    }

    let mut groups = groups.into_values().collect::<Vec<_>>();
    sort_newest_first(&mut groups, |group| (group.most_recent_modified, &group.title));
    groups
}

/// Disk evidence wins over a smaller inferred count.
pub(crate) fn reconcile_total(inferred: Option<u32>, max_downloaded: u32) -> u32 {
    inferred.unwrap_or(max_downloaded).max(max_downloaded).max(1)
}

fn sort_newest_first<T, K>(items: &mut [T], key: K)
where
    K: Fn(&T) -> (SystemTime, &String),
{
    items.sort_by(|a, b| {
        let (a_time, a_title) = key(a);
        let (b_time, b_title) = key(b);
        b_time.cmp(&a_time).then_with(|| a_title.cmp(b_title))
    });
}

/// Builds the library view from the download root, the history log and,
/// for titles history knows nothing about, the catalog.
pub(crate) struct LibraryIndexer {
    root: Arc<DownloadRoot>,
    history: Arc<HistoryStore>,
    catalog: Arc<dyn Catalog>,
    posters: Arc<PosterCache>,
    inferred: Mutex<HashMap<String, u32>>,
}

impl LibraryIndexer {
    pub(crate) fn new(
        root: Arc<DownloadRoot>,
        history: Arc<HistoryStore>,
        catalog: Arc<dyn Catalog>,
        posters: Arc<PosterCache>,
    ) -> Self {
        Self {
            root,
            history,
            catalog,
            posters,
            inferred: Mutex::new(HashMap::new()),
        }
    }

    /// Newest activity first.
    pub(crate) fn list_library(&self) -> io::Result<Vec<LibraryEntry>> {
        let groups = group_media_files(self.root.media_files()?);
        let index = self.history.title_index();

        let mut entries = groups
            .into_iter()
            .map(|group| self.build_entry(group, &index))
            .collect::<Vec<_>>();
        sort_newest_first(&mut entries, |entry| (entry.most_recent_modified, &entry.title));
        Ok(entries)
    }

    fn build_entry(&self, group: TitleGroup, index: &TitleIndex) -> LibraryEntry {
        let inferred = index
            .episode_count(&group.title)
            .or_else(|| self.catalog_episode_count(&group.title));
        let total_episode_count = reconcile_total(inferred, group.max_episode());
        let poster_url = index
            .poster(&group.title)
            .map(str::to_string)
            .or_else(|| self.posters.resolve(&group.title));

        LibraryEntry {
            downloaded_episode_numbers: group.files.keys().copied().collect(),
            title: group.title,
            poster_url,
            total_episode_count,
            file_by_episode: group.files,
            most_recent_modified: group.most_recent_modified,
        }
    }

    fn catalog_episode_count(&self, title: &str) -> Option<u32> {
        let key = normalize_title(title);
        if let Some(count) = self
            .inferred
            .lock()
            .ok()
            .and_then(|inferred| inferred.get(&key).copied())
        {
            return Some(count);
        }

        let (_, result) = lookup_title(self.catalog.as_ref(), title, INFERENCE_MODES)?;
        tracing::debug!(title, count = result.episode_count, "episode count inferred from catalog");
        if let Ok(mut inferred) = self.inferred.lock() {
            inferred.insert(key, result.episode_count);
        }
        Some(result.episode_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn file(name: &str, secs: u64) -> MediaFile {
        MediaFile {
            path: PathBuf::from("/downloads").join(name),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn group_media_files_splits_titles_and_orders_by_recency() {
        let groups = group_media_files(vec![
            file("Show A Episode 1.mp4", 10),
            file("Show A Episode 2.mp4", 30),
            file("Random Clip.mkv", 20),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].title, "Show A");
        assert_eq!(groups[0].files.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(groups[1].title, "Random Clip");
        assert_eq!(groups[1].files.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn group_media_files_merges_case_variants_and_keeps_newest_duplicate() {
        let groups = group_media_files(vec![
            file("show a Episode 1.mkv", 5),
            file("Show A Episode 1.mp4", 9),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title, "Show A");
        assert_eq!(groups[0].files[&1].path, PathBuf::from("/downloads/Show A Episode 1.mp4"));
    }

    #[test]
    fn reconcile_total_raises_count_to_disk_evidence() {
        assert_eq!(reconcile_total(Some(12), 3), 12);
        assert_eq!(reconcile_total(Some(2), 5), 5);
        assert_eq!(reconcile_total(None, 4), 4);
        assert_eq!(reconcile_total(None, 0), 1);
    }
}
