use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::app::media::{MediaFile, Snapshot};

/// Filesystem timestamps can be coarser than the clock used to mark the start.
pub(crate) const RECENCY_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DetectionTier {
    New,
    Updated,
    Recent,
}

impl DetectionTier {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Recent => "recent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Detection {
    pub(crate) file: MediaFile,
    pub(crate) tier: DetectionTier,
}

pub(crate) type Detector = fn(&Snapshot, &Snapshot, SystemTime) -> Option<MediaFile>;

/// Tried in order; the first tier that yields a file wins.
pub(crate) const DETECTORS: &[(DetectionTier, Detector)] = &[
    (DetectionTier::New, detect_new_file),
    (DetectionTier::Updated, detect_updated_file),
    (DetectionTier::Recent, detect_recent_file),
];

pub(crate) fn detect_result_file(
    before: &Snapshot,
    after: &Snapshot,
    started: SystemTime,
) -> Option<Detection> {
    DETECTORS.iter().find_map(|(tier, detector)| {
        detector(before, after, started).map(|file| Detection { file, tier: *tier })
    })
}

pub(crate) fn detect_new_file(
    before: &Snapshot,
    after: &Snapshot,
    _started: SystemTime,
) -> Option<MediaFile> {
    latest(after.iter().filter(|(path, _)| !before.contains_key(*path)))
}

pub(crate) fn detect_updated_file(
    before: &Snapshot,
    after: &Snapshot,
    _started: SystemTime,
) -> Option<MediaFile> {
    latest(after.iter().filter(|(path, modified)| {
        before
            .get(*path)
            .is_some_and(|previous| *modified > previous)
    }))
}

pub(crate) fn detect_recent_file(
    _before: &Snapshot,
    after: &Snapshot,
    started: SystemTime,
) -> Option<MediaFile> {
    let threshold = started
        .checked_sub(RECENCY_SLACK)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    latest(after.iter().filter(|(_, modified)| **modified >= threshold))
}

// Ties on mtime fall back to the path so the pick is deterministic.
fn latest<'a>(candidates: impl Iterator<Item = (&'a PathBuf, &'a SystemTime)>) -> Option<MediaFile> {
    candidates
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(path, modified)| MediaFile {
            path: path.clone(),
            modified: *modified,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn snap(entries: &[(&str, SystemTime)]) -> Snapshot {
        entries
            .iter()
            .map(|(name, modified)| (PathBuf::from(name), *modified))
            .collect()
    }

    #[test]
    fn new_file_is_detected_among_unchanged_ones() {
        let before = snap(&[("a.mp4", at(0)), ("b.mp4", at(5))]);
        let after = snap(&[("a.mp4", at(0)), ("b.mp4", at(5)), ("c.mp4", at(1))]);

        let detection = detect_result_file(&before, &after, at(100)).expect("new file");
        assert_eq!(detection.file.path, PathBuf::from("c.mp4"));
        assert_eq!(detection.tier, DetectionTier::New);
    }

    #[test]
    fn latest_new_file_wins_when_several_appear() {
        let before = snap(&[]);
        let after = snap(&[("x.mp4", at(10)), ("y.mp4", at(12)), ("z.mp4", at(11))]);

        let detection = detect_result_file(&before, &after, at(0)).expect("new file");
        assert_eq!(detection.file.path, PathBuf::from("y.mp4"));
    }

    #[test]
    fn new_tier_outranks_a_more_recent_update() {
        let before = snap(&[("old.mp4", at(0))]);
        let after = snap(&[("old.mp4", at(50)), ("fresh.mp4", at(20))]);

        let detection = detect_result_file(&before, &after, at(10)).expect("new file");
        assert_eq!(detection.file.path, PathBuf::from("fresh.mp4"));
        assert_eq!(detection.tier, DetectionTier::New);
    }

    #[test]
    fn updated_file_is_detected_over_unrelated_unchanged_files() {
        let before = snap(&[("a.mp4", at(0)), ("b.mp4", at(90))]);
        let after = snap(&[("a.mp4", at(3)), ("b.mp4", at(90))]);

        let detection = detect_result_file(&before, &after, at(100)).expect("updated file");
        assert_eq!(detection.file.path, PathBuf::from("a.mp4"));
        assert_eq!(detection.tier, DetectionTier::Updated);
    }

    #[test]
    fn recency_window_tolerates_one_second_of_skew() {
        let before = snap(&[("a.mp4", at(99)), ("b.mp4", at(50))]);
        let after = before.clone();

        let detection = detect_result_file(&before, &after, at(100)).expect("recent file");
        assert_eq!(detection.file.path, PathBuf::from("a.mp4"));
        assert_eq!(detection.tier, DetectionTier::Recent);
    }

    #[test]
    fn nothing_new_updated_or_recent_yields_none() {
        let before = snap(&[("a.mp4", at(10)), ("b.mp4", at(20))]);
        let after = before.clone();

        assert_eq!(detect_result_file(&before, &after, at(100)), None);
        assert_eq!(detect_result_file(&snap(&[]), &snap(&[]), at(100)), None);
    }

    #[test]
    fn removed_files_are_never_reported() {
        let before = snap(&[("gone.mp4", at(200))]);
        let after = snap(&[]);
        assert_eq!(detect_result_file(&before, &after, at(200)), None);
    }

    #[test]
    fn equal_mtimes_break_ties_by_path() {
        let before = snap(&[]);
        let after = snap(&[("a.mp4", at(5)), ("b.mp4", at(5))]);
        let detection = detect_result_file(&before, &after, at(0)).expect("new file");
        assert_eq!(detection.file.path, PathBuf::from("b.mp4"));
    }
}
