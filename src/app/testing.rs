use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::catalog::{Catalog, CatalogError, CoverImage, CoverSource, SearchResult};
use super::download::{DownloadError, Downloader, ToolExit};
use super::episode::{DownloadRequest, TranslationMode, normalize_title};

#[derive(Debug, Clone)]
enum FakeOutcome {
    Write(String),
    Fail(i32, String),
    Silent,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeCall {
    pub(crate) title: String,
    pub(crate) selector: String,
    pub(crate) detached: bool,
    pub(crate) started: Instant,
    pub(crate) finished: Instant,
}

/// Stands in for the downloader. `{episode}` in a file template is replaced
/// with the requested selector.
#[derive(Debug)]
pub(crate) struct FakeDownloader {
    outcome: FakeOutcome,
    delay: Duration,
    calls: Mutex<Vec<FakeCall>>,
}

impl FakeDownloader {
    pub(crate) fn writing(template: &str) -> Self {
        Self::with(FakeOutcome::Write(template.to_string()))
    }

    pub(crate) fn failing(code: i32, detail: &str) -> Self {
        Self::with(FakeOutcome::Fail(code, detail.to_string()))
    }

    pub(crate) fn silent() -> Self {
        Self::with(FakeOutcome::Silent)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, request: &DownloadRequest, detached: bool, started: Instant) {
        self.calls.lock().expect("calls lock").push(FakeCall {
            title: request.title.clone(),
            selector: request.selector.to_string(),
            detached,
            started,
            finished: Instant::now(),
        });
    }
}

impl Downloader for FakeDownloader {
    fn run(&self, request: &DownloadRequest, cwd: &Path) -> Result<ToolExit, DownloadError> {
        let started = Instant::now();
        thread::sleep(self.delay);
        let exit = match &self.outcome {
            FakeOutcome::Write(template) => {
                let name = template.replace("{episode}", &request.selector.to_string());
                std::fs::write(cwd.join(name), b"video")?;
                ToolExit {
                    success: true,
                    code: Some(0),
                    detail: None,
                }
            }
            FakeOutcome::Fail(code, detail) => ToolExit {
                success: false,
                code: Some(*code),
                detail: Some(detail.clone()),
            },
            FakeOutcome::Silent => ToolExit {
                success: true,
                code: Some(0),
                detail: None,
            },
        };
        self.record(request, false, started);
        Ok(exit)
    }

    fn spawn_detached(&self, request: &DownloadRequest, _cwd: &Path) -> Result<u32, DownloadError> {
        self.record(request, true, Instant::now());
        Ok(4242)
    }
}

/// Catalog answering from a fixed table keyed by normalized query and mode.
#[derive(Debug, Default)]
pub(crate) struct FakeCatalog {
    results: HashMap<(String, TranslationMode), Vec<SearchResult>>,
    fail: bool,
    searches: AtomicUsize,
}

impl FakeCatalog {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn with(mut self, query: &str, mode: TranslationMode, results: Vec<SearchResult>) -> Self {
        self.results.insert((normalize_title(query), mode), results);
        self
    }

    pub(crate) fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl Catalog for FakeCatalog {
    fn search(&self, query: &str, mode: TranslationMode) -> Result<Vec<SearchResult>, CatalogError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CatalogError::Request("HTTP status 503".to_string()));
        }
        Ok(self
            .results
            .get(&(normalize_title(query), mode))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeCovers {
    image: Option<CoverImage>,
    fetches: AtomicUsize,
}

impl FakeCovers {
    pub(crate) fn serving(bytes: &[u8], content_type: &str) -> Self {
        Self {
            image: Some(CoverImage {
                bytes: bytes.to_vec(),
                content_type: Some(content_type.to_string()),
            }),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl CoverSource for FakeCovers {
    fn fetch_cover(&self, _title: &str) -> Option<CoverImage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.image.clone()
    }
}

pub(crate) fn search_result(id: &str, title: &str, episodes: u32) -> SearchResult {
    SearchResult {
        id: id.to_string(),
        title: title.to_string(),
        episode_count: episodes,
        cover_url: None,
    }
}
