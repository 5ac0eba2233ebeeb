use anyhow::{Result, bail};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use losscut::command::CutStrategy;
use losscut::ffmpeg::ToolOverrides;
use losscut::timecode::parse_duration;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "losscut",
    version,
    about = "Lossless trimming, merging and audio extraction on top of ffmpeg"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to ffmpeg binary (overrides the bundled copy and PATH lookup)
    #[arg(long, global = true, env = "LOSSCUT_FFMPEG", value_hint = ValueHint::ExecutablePath)]
    pub ffmpeg: Option<PathBuf>,

    /// Path to ffprobe binary (default: next to ffmpeg)
    #[arg(long, global = true, env = "LOSSCUT_FFPROBE", value_hint = ValueHint::ExecutablePath)]
    pub ffprobe: Option<PathBuf>,

    /// Write outputs here instead of next to the input
    #[arg(short = 'o', long, global = true, env = "LOSSCUT_OUT_DIR", value_hint = ValueHint::DirPath)]
    pub out_dir: Option<PathBuf>,

    /// Debug-level logs, including every ffmpeg invocation
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print duration, container format, video codec and audio streams
    Probe {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
    },

    /// Cut one range out of a file without re-encoding
    Cut {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Start (seconds, MM:SS or HH:MM:SS.mmm; default: file start)
        #[arg(long, value_parser = parse_time)]
        from: Option<f64>,

        /// End (default: file end)
        #[arg(long, value_parser = parse_time)]
        to: Option<f64>,

        #[command(flatten)]
        flags: CutFlags,

        /// Keep every stream (subtitles, data), not just the defaults
        #[arg(long, action = ArgAction::SetTrue)]
        all_streams: bool,

        /// Rotation metadata to write on the video stream
        #[arg(long, value_parser = parse_rotation)]
        rotate: Option<i32>,
    },

    /// Cut several ranges and join them into `<name>_cut.<ext>`
    Merge {
        /// Video file, or a `<video>.prj` project holding the scenes
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// A range as `START-END`; repeat for more scenes
        #[arg(long = "scene", value_parser = parse_scene)]
        scenes: Vec<(f64, f64)>,

        #[command(flatten)]
        flags: CutFlags,

        /// Also write the scene list to `<video>.prj`
        #[arg(long, action = ArgAction::SetTrue)]
        save_project: bool,
    },

    /// Extract one audio stream to WAV (5.1 is split into three files)
    ExtractAudio {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Audio stream index, counted among audio streams only
        #[arg(long, default_value_t = 0)]
        stream: usize,
    },

    /// Write a `-html5ified.mp4` preview a browser can play
    Html5ify {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Re-encode video when the codec is not already playable
        #[arg(long, action = ArgAction::SetTrue)]
        encode: bool,
    },

    /// Convert to `<file>.mp4`
    Convert {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Re-encode video to baseline H.264 when needed
        #[arg(long, action = ArgAction::SetTrue)]
        encode: bool,

        #[arg(long, action = ArgAction::SetTrue)]
        strip_audio: bool,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct CutFlags {
    /// Frame-accurate output-side seek instead of snapping to keyframes
    #[arg(long, action = ArgAction::SetTrue)]
    pub precise: bool,

    /// Drop audio from the output
    #[arg(long, action = ArgAction::SetTrue)]
    pub strip_audio: bool,
}

impl CutFlags {
    pub fn strategy(&self) -> CutStrategy {
        if self.precise {
            CutStrategy::Precise
        } else {
            CutStrategy::Keyframe
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tools: ToolOverrides,
    pub output_dir: Option<PathBuf>,
    /// `None` runs the interactive prompt.
    pub command: Option<Commands>,
}

impl Commands {
    pub fn input(&self) -> &Path {
        match self {
            Commands::Probe { input }
            | Commands::Cut { input, .. }
            | Commands::Merge { input, .. }
            | Commands::ExtractAudio { input, .. }
            | Commands::Html5ify { input, .. }
            | Commands::Convert { input, .. } => input.as_path(),
        }
    }
}

impl Cli {
    pub fn into_config(self) -> Result<AppConfig> {
        if let Some(command) = &self.command {
            let input = command.input();
            if !input.exists() {
                bail!("Input not found: {}", input.display());
            }
            if let Commands::Cut {
                from: Some(from),
                to: Some(to),
                ..
            } = command
            {
                if from >= to {
                    bail!("--from must be before --to");
                }
            }
        }
        if let Some(dir) = &self.out_dir {
            if !dir.is_dir() {
                bail!("Output directory not found: {}", dir.display());
            }
        }

        Ok(AppConfig {
            tools: ToolOverrides {
                ffmpeg: self.ffmpeg,
                ffprobe: self.ffprobe,
            },
            output_dir: self.out_dir,
            command: self.command,
        })
    }
}

pub fn parse_time(s: &str) -> Result<f64, String> {
    let seconds = parse_duration(s)?;
    if seconds < 0.0 {
        return Err(format!("negative time: {s}"));
    }
    Ok(seconds)
}

/// `START-END`, each side in any form `parse_time` accepts.
pub fn parse_scene(s: &str) -> Result<(f64, f64), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got `{s}`"))?;
    let (start, end) = (parse_time(start.trim())?, parse_time(end.trim())?);
    if start >= end {
        return Err(format!("scene `{s}` ends before it starts"));
    }
    Ok((start, end))
}

pub fn parse_rotation(s: &str) -> Result<i32, String> {
    match s.trim().parse::<i32>() {
        Ok(deg @ (0 | 90 | 180 | 270)) => Ok(deg),
        _ => Err("rotation must be 0, 90, 180 or 270".into()),
    }
}
