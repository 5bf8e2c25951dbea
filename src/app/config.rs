use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::download::resolve_downloader_bin_from_env;
use crate::cli::ServeArgs;
use crate::paths::{
    HISTORY_FILE_NAME, POSTER_DIR_NAME, default_data_dir, default_download_dir, path_from_env,
};

pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8765";

pub(crate) const ENV_DOWNLOADER_BIN: &str = "ANISHELF_DOWNLOADER_BIN";
pub(crate) const ENV_DOWNLOAD_DIR: &str = "ANISHELF_DOWNLOAD_DIR";
pub(crate) const ENV_DATA_DIR: &str = "ANISHELF_DATA_DIR";
pub(crate) const ENV_BIND: &str = "ANISHELF_BIND";

/// Everything the server needs to start. Flags win over environment
/// variables, which win over platform defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) bind: SocketAddr,
    pub(crate) download_dir: PathBuf,
    pub(crate) data_dir: PathBuf,
    pub(crate) downloader_bin: PathBuf,
    pub(crate) history_path: PathBuf,
    pub(crate) poster_dir: PathBuf,
}

impl Settings {
    pub(crate) fn from_env(args: &ServeArgs) -> Result<Self> {
        Self::resolve(args, |key| std::env::var_os(key))
    }

    pub(crate) fn resolve<F>(args: &ServeArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let data_dir = match args
            .data_dir
            .clone()
            .or_else(|| path_from_env(env(ENV_DATA_DIR)))
        {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        let download_dir = args
            .download_dir
            .clone()
            .or_else(|| path_from_env(env(ENV_DOWNLOAD_DIR)))
            .unwrap_or_else(|| default_download_dir(&data_dir));

        let raw_bind = args
            .bind
            .clone()
            .or_else(|| env(ENV_BIND).and_then(|value| value.into_string().ok()))
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = raw_bind
            .trim()
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address `{raw_bind}`"))?;

        Ok(Self {
            bind,
            downloader_bin: resolve_downloader_bin_from_env(env(ENV_DOWNLOADER_BIN)),
            history_path: data_dir.join(HISTORY_FILE_NAME),
            poster_dir: data_dir.join(POSTER_DIR_NAME),
            download_dir,
            data_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn resolve_uses_environment_when_flags_are_absent() {
        let env = env_from(&[
            (ENV_DATA_DIR, "/var/lib/anishelf"),
            (ENV_DOWNLOAD_DIR, "/srv/anime"),
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_DOWNLOADER_BIN, "/opt/ani-cli"),
        ]);
        let settings = Settings::resolve(&ServeArgs::default(), env).expect("settings");

        assert_eq!(settings.bind, "0.0.0.0:9000".parse::<SocketAddr>().expect("addr"));
        assert_eq!(settings.download_dir, PathBuf::from("/srv/anime"));
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/anishelf"));
        assert_eq!(settings.downloader_bin, PathBuf::from("/opt/ani-cli"));
        assert_eq!(
            settings.history_path,
            PathBuf::from("/var/lib/anishelf/history.json")
        );
        assert_eq!(settings.poster_dir, PathBuf::from("/var/lib/anishelf/posters"));
    }

    #[test]
    fn resolve_prefers_flags_over_environment() {
        let env = env_from(&[(ENV_DOWNLOAD_DIR, "/srv/anime"), (ENV_BIND, "0.0.0.0:9000")]);
        let args = ServeArgs {
            bind: Some("127.0.0.1:7000".to_string()),
            download_dir: Some(PathBuf::from("/mnt/shows")),
            data_dir: Some(PathBuf::from("/tmp/state")),
        };
        let settings = Settings::resolve(&args, env).expect("settings");

        assert_eq!(settings.bind.port(), 7000);
        assert_eq!(settings.download_dir, PathBuf::from("/mnt/shows"));
        assert_eq!(settings.history_path, PathBuf::from("/tmp/state/history.json"));
        assert_eq!(settings.downloader_bin, PathBuf::from("ani-cli"));
    }

    #[test]
    fn resolve_defaults_bind_and_rejects_garbage() {
        let args = ServeArgs {
            data_dir: Some(PathBuf::from("/tmp/state")),
            download_dir: Some(PathBuf::from("/tmp/downloads")),
            ..ServeArgs::default()
        };
        let settings = Settings::resolve(&args, env_from(&[])).expect("settings");
        assert_eq!(settings.bind, DEFAULT_BIND.parse::<SocketAddr>().expect("addr"));

        let err = Settings::resolve(&args, env_from(&[(ENV_BIND, "not an address")]))
            .expect_err("bad bind");
        assert!(err.to_string().contains("invalid bind address"));
    }
}
