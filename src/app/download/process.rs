use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use super::DownloadError;
use crate::app::episode::{DownloadRequest, TranslationMode};

const DEFAULT_DOWNLOADER_BIN: &str = "ani-cli";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolExit {
    pub(crate) success: bool,
    pub(crate) code: Option<i32>,
    pub(crate) detail: Option<String>,
}

/// The external downloader, run with its working directory set to the download root.
pub(crate) trait Downloader: Send + Sync {
    /// Runs to completion.
    fn run(&self, request: &DownloadRequest, cwd: &Path) -> Result<ToolExit, DownloadError>;

    /// Starts without waiting and returns the child pid.
    fn spawn_detached(&self, request: &DownloadRequest, cwd: &Path) -> Result<u32, DownloadError>;
}

pub(crate) fn build_download_args(request: &DownloadRequest) -> Vec<String> {
    let mut args = vec![
        "-d".to_string(),
        "-S".to_string(),
        request.catalog_index.to_string(),
        "-e".to_string(),
        request.selector.to_string(),
    ];
    if request.mode == TranslationMode::Dub {
        args.push("--dub".to_string());
    }
    args.push(request.title.clone());
    args
}

pub(crate) fn resolve_downloader_bin_from_env(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_DOWNLOADER_BIN),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AniCli {
    bin: PathBuf,
}

impl AniCli {
    pub(crate) fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    fn command(&self, request: &DownloadRequest, cwd: &Path) -> ProcessCommand {
        let mut cmd = ProcessCommand::new(&self.bin);
        cmd.args(build_download_args(request))
            .current_dir(cwd)
            .env("ANI_CLI_DOWNLOAD_DIR", cwd)
            .stdin(Stdio::null());
        cmd
    }

    fn launch_error(&self, err: io::Error) -> DownloadError {
        if err.kind() == io::ErrorKind::NotFound {
            DownloadError::ToolNotFound(self.bin.display().to_string())
        } else {
            DownloadError::Io(err)
        }
    }
}

impl Downloader for AniCli {
    fn run(&self, request: &DownloadRequest, cwd: &Path) -> Result<ToolExit, DownloadError> {
        let output = self
            .command(request, cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| self.launch_error(err))?;

        let detail = last_meaningful_line(&output.stderr)
            .or_else(|| last_meaningful_line(&output.stdout));
        Ok(ToolExit {
            success: output.status.success(),
            code: output.status.code(),
            detail,
        })
    }

    fn spawn_detached(&self, request: &DownloadRequest, cwd: &Path) -> Result<u32, DownloadError> {
        let mut cmd = self.command(request, cwd);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        detach_from_session(&mut cmd);

        let mut child = cmd.spawn().map_err(|err| self.launch_error(err))?;
        let pid = child.id();
        let label = format!("{} -e {}", request.title, request.selector);
        thread::spawn(move || match child.wait() {
            Ok(status) => tracing::info!(pid, download = %label, %status, "detached download exited"),
            Err(err) => tracing::warn!(pid, download = %label, error = %err, "failed waiting on detached download"),
        });
        Ok(pid)
    }
}

// A new session keeps terminal signals aimed at the server away from the download.
#[cfg(unix)]
fn detach_from_session(cmd: &mut ProcessCommand) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach_from_session(cmd: &mut ProcessCommand) {
    let _ = cmd;
}

fn last_meaningful_line(raw: &[u8]) -> Option<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(|line| line.chars().take(240).collect())
}
