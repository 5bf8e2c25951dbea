use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

pub const HISTORY_FILE_NAME: &str = "history.json";
pub const POSTER_DIR_NAME: &str = "posters";

pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("anishelf"))
}

pub fn default_download_dir(data_dir: &Path) -> PathBuf {
    match dirs::video_dir() {
        Some(videos) => videos.join("anishelf"),
        None => data_dir.join("downloads"),
    }
}

pub fn path_from_env(env_value: Option<OsString>) -> Option<PathBuf> {
    match env_value {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

/// Resolves `name` under `root`, refusing anything that would land outside it.
///
/// The file must exist; both sides are canonicalized so symlinks pointing out
/// of the root are rejected as well.
pub fn resolve_inside_root(root: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    if name.trim().is_empty() || relative.is_absolute() {
        return None;
    }
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }

    let root = root.canonicalize().ok()?;
    let resolved = root.join(relative).canonicalize().ok()?;
    (resolved.starts_with(&root) && resolved.is_file()).then_some(resolved)
}
