//! Metadata lookups through ffprobe.
//!
//! Duration and container names come from the JSON report
//! (`-of json -show_format`). Codec and audio stream descriptions come from
//! the human-readable report ffprobe prints on stderr when given only a path.
//! All text scraping for metadata lives here.

use crate::error::{CutError, CutResult};
use crate::ffmpeg::Tools;
use crate::format::{
    SNIFF_LEN, determine_output_format, map_format, sniff_extension, split_format_names,
};
use crate::process;
use regex::Regex;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Codec the HTML5 preview path can play without re-encoding.
pub const BASELINE_CODEC: &str = "h264";

static VIDEO_STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream\s?#\d+:\d+(?:\[0x[0-9a-fA-F]+\])?(?:\([a-z]{3}\))?\s?:\s?Video:\s*([^\r\n]+)")
        .expect("valid video stream regex")
});

static AUDIO_STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream\s?#\d+:\d+(?:\[0x[0-9a-fA-F]+\])?(?:\([a-z]{3}\))?\s?:\s?Audio:\s*([^\r\n]+)")
        .expect("valid audio stream regex")
});

#[derive(Debug, Deserialize)]
struct ProbeReport {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

/// One audio stream; `index` is its position among audio streams (`0:a:N`).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub index: usize,
    pub description: String,
}

impl AudioStream {
    pub fn is_surround(&self) -> bool {
        self.description.contains("5.1")
    }

    /// `5.1(side)` carries SL/SR instead of BL/BR.
    pub fn is_side_layout(&self) -> bool {
        self.description.contains("5.1(side)")
    }
}

/// Everything the engine needs to know about a loaded file.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub duration: f64,
    /// Muxer name accepted by `-f`.
    pub format: String,
    pub video_codec: Option<String>,
    pub audio_streams: Vec<AudioStream>,
}

impl MediaFile {
    /// Probes a freshly opened file. Fails with `UnsupportedFormat` when no
    /// container format can be determined.
    pub fn load(tools: &Tools, path: &Path) -> CutResult<Self> {
        let report = structured_report(tools, path)?;
        let format = resolve_format(path, report.format_name.as_deref())?.ok_or_else(|| {
            CutError::UnsupportedFormat {
                path: path.display().to_string(),
            }
        })?;
        let duration = duration_from(path, &report)?;
        let text = diagnostic_report(tools, path)?;
        let media = MediaFile {
            path: path.to_path_buf(),
            duration,
            format,
            video_codec: video_codec(&text),
            audio_streams: audio_streams(&text),
        };
        info!(
            path = %path.display(),
            format = %media.format,
            duration = media.duration,
            audio_streams = media.audio_streams.len(),
            "loaded media"
        );
        Ok(media)
    }

    pub fn is_codec_ok(&self) -> bool {
        self.video_codec
            .as_deref()
            .is_some_and(|codec| codec.contains(BASELINE_CODEC))
    }
}

pub fn get_duration(tools: &Tools, path: &Path) -> CutResult<f64> {
    let report = structured_report(tools, path)?;
    duration_from(path, &report)
}

/// `Ok(None)` means the probe ran but no format could be determined.
pub fn get_format(tools: &Tools, path: &Path) -> CutResult<Option<String>> {
    let report = structured_report(tools, path)?;
    resolve_format(path, report.format_name.as_deref())
}

pub fn is_codec_ok(tools: &Tools, path: &Path) -> CutResult<bool> {
    let text = diagnostic_report(tools, path)?;
    Ok(video_codec(&text).is_some_and(|codec| codec.contains(BASELINE_CODEC)))
}

pub fn get_audio_streams(tools: &Tools, path: &Path) -> CutResult<Vec<AudioStream>> {
    let text = diagnostic_report(tools, path)?;
    Ok(audio_streams(&text))
}

/// Codec name of the first video stream in a human-readable report.
pub fn video_codec(report: &str) -> Option<String> {
    let caps = VIDEO_STREAM_RE.captures(report)?;
    caps[1]
        .split([' ', ','])
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Audio stream descriptions in file order.
pub fn audio_streams(report: &str) -> Vec<AudioStream> {
    AUDIO_STREAM_RE
        .captures_iter(report)
        .enumerate()
        .map(|(index, caps)| AudioStream {
            index,
            description: caps[1].trim().to_string(),
        })
        .collect()
}

fn parse_report(path: &Path, json: &str) -> CutResult<ProbeFormat> {
    let report: ProbeReport = serde_json::from_str(json)
        .map_err(|err| CutError::probe(path, format!("unparseable probe output: {err}")))?;
    Ok(report.format.unwrap_or_default())
}

fn duration_from(path: &Path, format: &ProbeFormat) -> CutResult<f64> {
    let raw = format
        .duration
        .as_deref()
        .ok_or_else(|| CutError::probe(path, "no duration in probe output"))?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| CutError::probe(path, format!("invalid duration `{raw}`")))
}

fn resolve_format(path: &Path, format_name: Option<&str>) -> CutResult<Option<String>> {
    let candidates = split_format_names(format_name.unwrap_or_default());
    let head = read_head(path)?;
    let sniffed = sniff_extension(&head);
    debug!(?candidates, ?sniffed, "resolving format");
    Ok(determine_output_format(&candidates, sniffed).map(|f| map_format(&f)))
}

fn read_head(path: &Path) -> CutResult<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}

fn structured_report(tools: &Tools, path: &Path) -> CutResult<ProbeFormat> {
    let args: Vec<OsString> = vec![
        "-of".into(),
        "json".into(),
        "-show_format".into(),
        "-i".into(),
        path.into(),
    ];
    let out = process::run(&tools.ffprobe, &args, &mut |_: &str| {}, None)
        .map_err(|err| probe_failure(path, err))?;
    parse_report(path, &out.stdout)
}

fn diagnostic_report(tools: &Tools, path: &Path) -> CutResult<String> {
    let args: Vec<OsString> = vec![path.into()];
    let out = process::run(&tools.ffprobe, &args, &mut |_: &str| {}, None)
        .map_err(|err| probe_failure(path, err))?;
    Ok(out.stderr())
}

fn probe_failure(path: &Path, err: CutError) -> CutError {
    match err {
        CutError::Process { exit, stderr, .. } => {
            CutError::probe(path, format!("ffprobe failed ({exit}): {stderr}"))
        }
        other => other,
    }
}
