mod detect;
mod process;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use thiserror::Error;

use detect::{Detection, detect_result_file};
pub(crate) use process::{AniCli, Downloader, ToolExit, resolve_downloader_bin_from_env};

use super::episode::{DownloadRequest, ValidationError};
use super::media::{self, MediaFile, Snapshot};

#[derive(Debug, Error)]
pub(crate) enum DownloadError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("downloader `{0}` is not installed or not in PATH")]
    ToolNotFound(String),
    #[error("{}", tool_failed_message(.code, .detail))]
    ToolFailed {
        code: Option<i32>,
        detail: Option<String>,
    },
    #[error("downloader finished but no downloaded file could be found")]
    OutputNotDetected,
    #[error("download directory error: {0}")]
    Io(#[from] io::Error),
}

fn tool_failed_message(code: &Option<i32>, detail: &Option<String>) -> String {
    let status = match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    match detail {
        Some(detail) => format!("downloader reported an error ({status}): {detail}"),
        None => format!("downloader reported an error ({status})"),
    }
}

/// The directory the downloader writes into, plus the lock that serializes
/// every snapshot/invoke/detect sequence against it.
#[derive(Debug)]
pub(crate) struct DownloadRoot {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DownloadRoot {
    pub(crate) fn open(path: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn snapshot(&self) -> io::Result<Snapshot> {
        media::snapshot(&self.path)
    }

    pub(crate) fn media_files(&self) -> io::Result<Vec<MediaFile>> {
        media::scan_media_files(&self.path)
    }

    /// Compares the directory as it is now against `before`.
    pub(crate) fn detect_result_file(
        &self,
        before: &Snapshot,
        started: SystemTime,
    ) -> io::Result<Option<Detection>> {
        let after = self.snapshot()?;
        Ok(detect_result_file(before, &after, started))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub(crate) struct DownloadService {
    root: Arc<DownloadRoot>,
    tool: Arc<dyn Downloader>,
}

impl DownloadService {
    pub(crate) fn new(root: Arc<DownloadRoot>, tool: Arc<dyn Downloader>) -> Self {
        Self { root, tool }
    }

    pub(crate) fn root(&self) -> &DownloadRoot {
        &self.root
    }

    /// Runs the downloader for one episode and returns the file it produced.
    ///
    /// Blocks for the whole download. Only one of these runs at a time so the
    /// before/after comparison can only see this invocation's output.
    pub(crate) fn download_episode(
        &self,
        request: &DownloadRequest,
    ) -> Result<MediaFile, DownloadError> {
        if request.selector.is_range() {
            return Err(ValidationError::InvalidSelector(request.selector.to_string()).into());
        }

        let _guard = self.root.lock();
        let before = self.root.snapshot()?;
        let started = SystemTime::now();
        tracing::info!(
            title = %request.title,
            index = request.catalog_index,
            episode = %request.selector,
            mode = %request.mode,
            "starting episode download"
        );

        let exit = self.tool.run(request, self.root.path())?;
        if !exit.success {
            tracing::warn!(title = %request.title, code = ?exit.code, detail = ?exit.detail, "downloader failed");
            return Err(DownloadError::ToolFailed {
                code: exit.code,
                detail: exit.detail,
            });
        }

        let Some(detection) = self.root.detect_result_file(&before, started)? else {
            tracing::warn!(title = %request.title, "downloader succeeded but produced no detectable file");
            return Err(DownloadError::OutputNotDetected);
        };
        tracing::info!(
            file = %detection.file.path.display(),
            tier = detection.tier.as_str(),
            "episode download finished"
        );
        Ok(detection.file)
    }

    /// Starts a multi-episode download in the background. Its files are never
    /// matched back to this call, so it skips the download lock.
    pub(crate) fn start_detached(&self, request: &DownloadRequest) -> Result<u32, DownloadError> {
        let pid = self.tool.spawn_detached(request, self.root.path())?;
        tracing::info!(
            title = %request.title,
            index = request.catalog_index,
            episodes = %request.selector,
            pid,
            "started detached download"
        );
        Ok(pid)
    }
}
