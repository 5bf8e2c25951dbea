use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use super::catalog::{CoverImage, CoverSource};
use super::episode::normalize_title;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "webp", "gif"];

pub(crate) const POSTER_ROUTE: &str = "/posters";

/// On-disk cover cache keyed by a hash of the normalized title.
///
/// Writes go through a unique temp file and a rename, so two requests
/// fetching the same title at once both end up with the same file.
pub(crate) struct PosterCache {
    dir: PathBuf,
    covers: Arc<dyn CoverSource>,
    misses: Mutex<HashSet<String>>,
}

impl PosterCache {
    pub(crate) fn open(dir: PathBuf, covers: Arc<dyn CoverSource>) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            covers,
            misses: Mutex::new(HashSet::new()),
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn cached(&self, title: &str) -> Option<String> {
        let key = cache_key(title);
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| format!("{key}.{ext}"))
            .find(|name| self.dir.join(name).is_file())
    }

    /// Returns the cached poster's URL, fetching it on first use.
    pub(crate) fn resolve(&self, title: &str) -> Option<String> {
        if let Some(name) = self.cached(title) {
            return Some(poster_url(&name));
        }

        let key = cache_key(title);
        if self.is_known_miss(&key) {
            return None;
        }

        let Some(image) = self.covers.fetch_cover(title) else {
            tracing::debug!(title, "no cover available");
            self.remember_miss(key);
            return None;
        };
        match self.store(&key, &image) {
            Ok(name) => {
                tracing::info!(title, file = %name, "cached poster");
                Some(poster_url(&name))
            }
            Err(err) => {
                tracing::warn!(title, error = %err, "failed to cache poster");
                None
            }
        }
    }

    fn is_known_miss(&self, key: &str) -> bool {
        self.misses
            .lock()
            .map(|misses| misses.contains(key))
            .unwrap_or(false)
    }

    fn remember_miss(&self, key: String) {
        if let Ok(mut misses) = self.misses.lock() {
            misses.insert(key);
        }
    }

    fn store(&self, key: &str, image: &CoverImage) -> io::Result<String> {
        let name = format!("{key}.{}", extension_for(image.content_type.as_deref()));
        let final_path = self.dir.join(&name);
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp_path = self
            .dir
            .join(format!("{name}.{}-{suffix}.tmp", std::process::id()));

        fs::write(&tmp_path, &image.bytes)?;
        if let Err(err) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        Ok(name)
    }
}

pub(crate) fn cache_key(title: &str) -> String {
    hex::encode(Sha256::digest(normalize_title(title).as_bytes()))
}

pub(crate) fn poster_url(name: &str) -> String {
    format!("{POSTER_ROUTE}/{}", urlencoding::encode(name))
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());
    match essence.as_deref() {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => "jpg",
    }
}
