use std::io;
use thiserror::Error;

/// How an operation subprocess ended when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    /// Terminated without an exit code (killed by a signal).
    Signal,
    SpawnFailed(io::ErrorKind),
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exit code {code}"),
            ExitKind::Signal => write!(f, "terminated by signal"),
            ExitKind::SpawnFailed(kind) => write!(f, "spawn failed ({kind})"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CutError {
    #[error("`{name}` not found (bundled copy unusable and not in PATH)")]
    BinaryNotFound { name: String },

    #[error("probe failed for {path}: {message}")]
    Probe { path: String, message: String },

    #[error("unsupported file: {path}")]
    UnsupportedFormat { path: String },

    #[error("{program} failed ({exit})\n{stderr}")]
    Process {
        program: String,
        exit: ExitKind,
        stderr: String,
    },

    #[error("invalid cut range {from}..{to} (duration {duration})")]
    InvalidRange { from: f64, to: f64, duration: f64 },

    #[error("another operation is already running")]
    Busy,

    #[error("operation cancelled")]
    Cancelled,

    #[error("no media file loaded")]
    NoMedia,

    #[error("audio stream {0} does not exist")]
    NoAudioStream(usize),

    #[error("nothing to merge: scene list is empty")]
    NoScenes,

    #[error("project file {path}: {message}")]
    Project { path: String, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type CutResult<T> = Result<T, CutError>;

impl CutError {
    pub(crate) fn probe(path: &std::path::Path, message: impl Into<String>) -> Self {
        CutError::Probe {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Exit code 1 and a missing program both mean the tool could not make
    /// sense of the input; those get the short message instead of a dump.
    pub fn is_unsupported_media(&self) -> bool {
        matches!(
            self,
            CutError::Process {
                exit: ExitKind::Code(1) | ExitKind::SpawnFailed(io::ErrorKind::NotFound),
                ..
            }
        )
    }

    pub fn user_message(&self) -> String {
        if self.is_unsupported_media() {
            return "ffmpeg was unable to process this file. It may be of an unknown format or codec combination".into();
        }
        match self {
            CutError::UnsupportedFormat { .. } => "Unsupported file".into(),
            other => format!("Failed to run ffmpeg:\n{other}"),
        }
    }
}
