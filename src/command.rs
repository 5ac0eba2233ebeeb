//! Argument vectors for every ffmpeg invocation. Nothing here touches the
//! filesystem or spawns anything; flag order matters because some flags are
//! positional relative to `-i` and the output path.

use crate::error::{CutError, CutResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// How a segment is cut out of its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CutStrategy {
    /// Output-side seek: frame accurate, decodes from the file start.
    Precise,
    /// Input-side `-noaccurate_seek`: snaps to the keyframe at or before the
    /// start, fast, timestamps rebased to zero.
    #[default]
    Keyframe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CutSpec {
    pub source: PathBuf,
    pub output_dir: Option<PathBuf>,
    /// Muxer name passed to `-f`.
    pub format: String,
    pub cut_from: f64,
    pub cut_to: f64,
    pub total_duration: f64,
    pub rotation: Option<i32>,
    pub include_all_streams: bool,
    pub strip_audio: bool,
}

impl CutSpec {
    /// `0 <= cut_from < cut_to <= total_duration`, nothing is clamped.
    pub fn validate(&self) -> CutResult<()> {
        let finite = [self.cut_from, self.cut_to, self.total_duration]
            .iter()
            .all(|v| v.is_finite());
        if finite
            && self.cut_from >= 0.0
            && self.cut_from < self.cut_to
            && self.cut_to <= self.total_duration
        {
            return Ok(());
        }
        Err(CutError::InvalidRange {
            from: self.cut_from,
            to: self.cut_to,
            duration: self.total_duration,
        })
    }

    pub fn cut_duration(&self) -> f64 {
        self.cut_to - self.cut_from
    }

    /// A zero start means "don't trim the head": no `-ss` at all.
    fn seek_args(&self) -> Vec<OsString> {
        if self.cut_from == 0.0 {
            Vec::new()
        } else {
            vec!["-ss".into(), seconds(self.cut_from)]
        }
    }

    /// An end equal to the duration means "don't trim the tail": no `-t`.
    fn duration_args(&self) -> Vec<OsString> {
        if self.cut_to == self.total_duration {
            Vec::new()
        } else {
            vec!["-t".into(), seconds(self.cut_duration())]
        }
    }

    fn audio_args(&self) -> Vec<OsString> {
        if self.strip_audio {
            vec!["-an".into()]
        } else {
            vec!["-acodec".into(), "copy".into()]
        }
    }

    fn tail_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.include_all_streams {
            args.extend(["-map".into(), "0".into()]);
        }
        args.extend(["-map_metadata".into(), "0".into()]);
        if let Some(deg) = self.rotation {
            args.extend(["-metadata:s:v:0".into(), format!("rotate={deg}").into()]);
        }
        args.extend(["-f".into(), OsString::from(&self.format)]);
        args
    }
}

fn seconds(value: f64) -> OsString {
    value.to_string().into()
}

fn strs(items: &[&str]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}

pub fn cut_args(spec: &CutSpec, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), spec.source.clone().into(), "-y".into()];
    args.extend(spec.audio_args());
    args.extend(strs(&["-vcodec", "copy", "-scodec", "copy"]));
    args.extend(spec.seek_args());
    args.extend(spec.duration_args());
    args.extend(spec.tail_args());
    args.push(out.into());
    args
}

pub fn keyframe_cut_args(spec: &CutSpec, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-noaccurate_seek".into()];
    args.extend(spec.seek_args());
    args.extend(["-i".into(), spec.source.clone().into(), "-y".into()]);
    args.extend(strs(&["-vcodec", "copy"]));
    args.extend(spec.audio_args());
    args.extend(strs(&["-scodec", "copy"]));
    args.extend(spec.duration_args());
    args.extend(spec.tail_args());
    args.extend(strs(&["-avoid_negative_ts", "make_zero"]));
    args.push(out.into());
    args
}

pub fn build_cut_args(strategy: CutStrategy, spec: &CutSpec, out: &Path) -> Vec<OsString> {
    match strategy {
        CutStrategy::Precise => cut_args(spec, out),
        CutStrategy::Keyframe => keyframe_cut_args(spec, out),
    }
}

/// One concat-demuxer manifest line. Single quotes inside the path are
/// closed, escaped and reopened.
pub fn manifest_line(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{escaped}'\n")
}

/// Pure stream copy of the segments listed in `filelist`.
pub fn concat_args(filelist: &Path, out: &Path) -> Vec<OsString> {
    let mut args = strs(&["-y", "-f", "concat", "-safe", "0", "-i"]);
    args.push(filelist.into());
    args.extend(strs(&["-c", "copy"]));
    args.push(out.into());
    args
}

const HTML5_ENCODE: &[&str] = &[
    "-vf",
    "scale=-2:400,format=yuv420p",
    "-sws_flags",
    "neighbor",
    "-vcodec",
    "libx264",
    "-profile:v",
    "baseline",
    "-x264opts",
    "level=3.0",
    "-preset:v",
    "ultrafast",
    "-crf",
    "28",
];

const CONVERT_ENCODE: &[&str] = &[
    "-vf",
    "scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p",
    "-sws_flags",
    "neighbor",
    "-vcodec",
    "libx264",
    "-profile:v",
    "baseline",
    "-x264opts",
    "level=3.0",
    "-preset:v",
    "slow",
    "-crf",
    "20",
];

/// Low-resolution preview the embedded player can decode. Audio is dropped.
pub fn html5ify_args(input: &Path, out: &Path, encode_video: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
    if encode_video {
        args.extend(strs(HTML5_ENCODE));
    } else {
        args.extend(strs(&["-vcodec", "copy"]));
    }
    args.extend(strs(&["-an", "-y"]));
    args.push(out.into());
    args
}

/// Full-resolution conversion to a baseline H.264 mp4.
pub fn convert_args(
    input: &Path,
    out: &Path,
    encode_video: bool,
    strip_audio: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
    if encode_video {
        args.extend(strs(CONVERT_ENCODE));
    } else {
        args.extend(strs(&["-vcodec", "copy"]));
    }
    if strip_audio {
        args.push("-an".into());
    } else {
        args.extend(strs(&["-acodec", "copy"]));
    }
    args.push("-y".into());
    args.push(out.into());
    args
}

/// Where extracted audio is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    File(PathBuf),
    /// Parts of one DVD title, read back to back through the concat protocol.
    Concat(Vec<PathBuf>),
}

impl AudioInput {
    fn to_arg(&self) -> OsString {
        match self {
            AudioInput::File(path) => path.clone().into(),
            AudioInput::Concat(parts) => {
                let mut arg = OsString::from("concat:");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        arg.push("|");
                    }
                    arg.push(part);
                }
                arg
            }
        }
    }
}

/// Splits `VTS_01_2.VOB` into `(1, 2)`. Part 0 is the menu, not title data.
pub fn parse_vob_name(file_name: &str) -> Option<(u32, u32)> {
    let upper = file_name.to_ascii_uppercase();
    let stem = upper.strip_suffix(".VOB")?;
    let rest = stem.strip_prefix("VTS_")?;
    let (title, part) = rest.split_once('_')?;
    let title: u32 = title.parse().ok()?;
    let part: u32 = part.parse().ok()?;
    (part >= 1).then_some((title, part))
}

/// Decodes one audio stream into a single file.
pub fn extract_audio_args(input: &AudioInput, stream: usize, out: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.to_arg(),
        "-map".into(),
        format!("0:a:{stream}").into(),
        "-y".into(),
        out.into(),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurroundOutputs {
    pub front: PathBuf,
    pub back: PathBuf,
    pub center: PathBuf,
}

/// Filter graph that splits a 5.1 stream into three two-channel files:
/// front L/R, back (or side) L/R and center + LFE.
pub fn surround_filter(stream: usize, side_layout: bool) -> String {
    let (layout, rear) = if side_layout {
        ("5.1(side)", "sl][sr")
    } else {
        ("5.1", "bl][br")
    };
    format!(
        "[0:a:{stream}]channelsplit=channel_layout={layout}[fl][fr][fc][lfe][{rear}];\
         [fl][fr]join=inputs=2:channel_layout=stereo[front];\
         [{rear}]join=inputs=2:channel_layout=stereo[back];\
         [fc][lfe]join=inputs=2:channel_layout=stereo[center]"
    )
}

pub fn split_surround_args(
    input: &AudioInput,
    stream: usize,
    side_layout: bool,
    outs: &SurroundOutputs,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        input.to_arg(),
        "-y".into(),
        "-filter_complex".into(),
        surround_filter(stream, side_layout).into(),
    ];
    for (label, path) in [
        ("[front]", &outs.front),
        ("[back]", &outs.back),
        ("[center]", &outs.center),
    ] {
        args.extend(["-map".into(), label.into(), path.clone().into()]);
    }
    args
}
