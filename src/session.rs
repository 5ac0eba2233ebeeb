use crate::command::{CutSpec, CutStrategy};
use crate::error::{CutError, CutResult};
use crate::probe::{AudioStream, MediaFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// One segment destined for a merge. Only `left`/`right` are interpreted;
/// the key and thumbnail belong to whoever renders the scene list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub left: f64,
    pub right: f64,
    #[serde(rename = "dataUri", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub key: serde_json::Value,
}

impl Scene {
    pub fn new(left: f64, right: f64, key: impl Into<serde_json::Value>) -> Self {
        Self {
            left,
            right,
            thumbnail: None,
            key: key.into(),
        }
    }
}

/// Everything the front end would otherwise keep as ambient state. Passed by
/// reference into each engine call.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub media: Option<MediaFile>,
    /// `<file>-html5ified.mp4` when one exists next to the loaded file.
    pub preview_path: Option<PathBuf>,
    pub scenes: Vec<Scene>,
    pub selected_audio: usize,
    pub output_dir: Option<PathBuf>,
    pub include_all_streams: bool,
    pub strip_audio: bool,
    pub strategy: CutStrategy,
    pub rotation: Option<i32>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media(&self) -> CutResult<&MediaFile> {
        self.media.as_ref().ok_or(CutError::NoMedia)
    }

    /// Replaces the loaded file and drops everything derived from the old one.
    pub fn set_media(&mut self, media: MediaFile) {
        let preview = preview_sibling(&media.path);
        self.preview_path = preview.exists().then_some(preview);
        self.selected_audio = 0;
        self.media = Some(media);
    }

    pub fn selected_audio_stream(&self) -> Option<&AudioStream> {
        self.media
            .as_ref()
            .and_then(|m| m.audio_streams.get(self.selected_audio))
    }

    pub fn cut_spec(&self, from: f64, to: f64) -> CutResult<CutSpec> {
        let media = self.media()?;
        Ok(CutSpec {
            source: media.path.clone(),
            output_dir: self.output_dir.clone(),
            format: media.format.clone(),
            cut_from: from,
            cut_to: to,
            total_duration: media.duration,
            rotation: self.rotation,
            include_all_streams: self.include_all_streams,
            strip_audio: self.strip_audio,
        })
    }

    /// Appends a scene keyed by wall-clock milliseconds, bumped if needed so
    /// keys stay unique.
    pub fn add_scene(&mut self, left: f64, right: f64) -> &Scene {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let last = self
            .scenes
            .iter()
            .filter_map(|s| s.key.as_u64())
            .max()
            .unwrap_or_default();
        let key = now.max(last + 1);
        self.scenes.push(Scene::new(left, right, key));
        &self.scenes[self.scenes.len() - 1]
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

pub fn preview_sibling(video: &Path) -> PathBuf {
    with_suffix(video, "-html5ified.mp4")
}

pub fn project_path(video: &Path) -> PathBuf {
    with_suffix(video, ".prj")
}

/// Writes the session's scenes next to the loaded file as `<file>.prj`.
pub fn save_project(session: &Session) -> CutResult<PathBuf> {
    let media = session.media()?;
    let path = project_path(&media.path);
    let json = serde_json::to_string(&session.scenes).map_err(|err| CutError::Project {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), scenes = session.scenes.len(), "project saved");
    Ok(path)
}

/// Reads `<video>.prj`, returning the video path and its scenes. The video
/// must still exist.
pub fn load_project(project: &Path) -> CutResult<(PathBuf, Vec<Scene>)> {
    let project_err = |message: String| CutError::Project {
        path: project.display().to_string(),
        message,
    };
    let raw = project.as_os_str().to_string_lossy();
    let video = raw
        .strip_suffix(".prj")
        .map(PathBuf::from)
        .ok_or_else(|| project_err("expected a .prj file".into()))?;
    if !video.exists() {
        return Err(project_err(format!(
            "corresponding video file {} does not exist",
            video.display()
        )));
    }
    let text = std::fs::read_to_string(project)?;
    let scenes: Vec<Scene> =
        serde_json::from_str(&text).map_err(|err| project_err(err.to_string()))?;
    info!(path = %project.display(), scenes = scenes.len(), "project loaded");
    Ok((video, scenes))
}
