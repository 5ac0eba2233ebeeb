use crate::error::{CutError, CutResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use which::which;

/// Resolved processing binary and its probing companion.
#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Paths configured by the user that take precedence over discovery.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

pub fn with_exe_suffix(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Directory of the running executable.
pub fn install_root() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

pub fn bundled_ffmpeg_path(install_root: &Path) -> PathBuf {
    install_root.join("ffmpeg").join(with_exe_suffix("ffmpeg"))
}

/// The probing companion is assumed to sit next to the resolved ffmpeg.
pub fn companion_path(ffmpeg: &Path) -> PathBuf {
    let dir = ffmpeg.parent().unwrap_or(Path::new(""));
    dir.join(with_exe_suffix("ffprobe"))
}

/// Missing files, wrong-arch builds and non-executables all fail here.
pub fn can_execute(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn locate(overrides: &ToolOverrides, install_root: Option<&Path>) -> CutResult<Tools> {
    let ffmpeg = resolve_ffmpeg(overrides.ffmpeg.as_deref(), install_root)?;
    let ffprobe = match &overrides.ffprobe {
        Some(path) if path.is_file() => path.clone(),
        Some(path) => {
            return Err(CutError::BinaryNotFound {
                name: path.display().to_string(),
            });
        }
        None => companion_path(&ffmpeg),
    };
    info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "resolved tools");
    Ok(Tools { ffmpeg, ffprobe })
}

fn resolve_ffmpeg(configured: Option<&Path>, install_root: Option<&Path>) -> CutResult<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(CutError::BinaryNotFound {
            name: path.display().to_string(),
        });
    }

    if let Some(root) = install_root {
        let bundled = bundled_ffmpeg_path(root);
        if can_execute(&bundled) {
            return Ok(bundled);
        }
        debug!(path = %bundled.display(), "bundled ffmpeg unavailable");
    }

    which("ffmpeg")
        .or_else(|_| {
            if cfg!(windows) {
                which(with_exe_suffix("ffmpeg"))
            } else {
                Err(which::Error::CannotFindBinaryPath)
            }
        })
        .map_err(|err| {
            warn!(%err, "ffmpeg not found in PATH");
            CutError::BinaryNotFound {
                name: "ffmpeg".into(),
            }
        })
}
