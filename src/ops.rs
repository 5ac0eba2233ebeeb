//! Top-level media operations. Each public method runs one operation from
//! start to finish: validate, build the argument vector, supervise ffmpeg,
//! then post-process the output.

use crate::command::{
    AudioInput, CutSpec, CutStrategy, SurroundOutputs, build_cut_args, concat_args, convert_args,
    extract_audio_args, html5ify_args, manifest_line, parse_vob_name, split_surround_args,
};
use crate::error::{CutError, CutResult};
use crate::ffmpeg::{ToolOverrides, Tools, install_root, locate};
use crate::probe::MediaFile;
use crate::process::{self, CancelToken, ProcessOutput};
use crate::progress::{ProgressParser, ProgressPattern, ProgressSink, ScaledSink};
use crate::session::Session;
use crate::timecode::format_duration;
use filetime::FileTime;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Where the engine is within the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Idle,
    Probing,
    Building,
    Running,
    PostProcessing,
}

pub struct Engine {
    tools: Tools,
    state: Mutex<OpState>,
    cancel: Mutex<Option<CancelToken>>,
}

/// Holds the single-flight slot; dropping it returns the engine to `Idle`.
struct OpGuard<'a> {
    engine: &'a Engine,
    cancel: CancelToken,
}

impl OpGuard<'_> {
    fn set(&self, state: OpState) {
        debug!(?state, "operation state");
        *self.engine.state.lock() = state;
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        *self.engine.state.lock() = OpState::Idle;
        *self.engine.cancel.lock() = None;
    }
}

/// Scratch files of one merge. Everything tracked is removed on drop,
/// including the directory when this guard created it.
struct ScratchDir {
    dir: PathBuf,
    created: bool,
    files: Vec<PathBuf>,
}

impl ScratchDir {
    fn create(dir: PathBuf) -> CutResult<Self> {
        let created = !dir.exists();
        if created {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            created,
            files: Vec::new(),
        })
    }

    fn path(&self) -> &Path {
        &self.dir
    }

    fn track(&mut self, file: PathBuf) {
        self.files.push(file);
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        for file in &self.files {
            if let Err(err) = fs::remove_file(file) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %file.display(), %err, "failed to remove scratch file");
                }
            }
        }
        if self.created {
            if let Err(err) = fs::remove_dir(&self.dir) {
                warn!(path = %self.dir.display(), %err, "failed to remove scratch directory");
            }
        }
    }
}

impl Engine {
    pub fn new(tools: Tools) -> Self {
        Self {
            tools,
            state: Mutex::new(OpState::Idle),
            cancel: Mutex::new(None),
        }
    }

    /// Locates ffmpeg (configured, bundled, then `PATH`) and builds an engine.
    pub fn locate(overrides: &ToolOverrides) -> CutResult<Self> {
        let root = install_root();
        Ok(Self::new(locate(overrides, root.as_deref())?))
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    pub fn state(&self) -> OpState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.state() != OpState::Idle
    }

    /// Kills the running subprocess, if any. The operation fails with
    /// `Cancelled` and its scratch files are cleaned up.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().as_ref() {
            info!("cancelling current operation");
            token.cancel();
        }
    }

    fn begin(&self) -> CutResult<OpGuard<'_>> {
        let mut state = self.state.lock();
        if *state != OpState::Idle {
            return Err(CutError::Busy);
        }
        *state = OpState::Probing;
        let cancel = CancelToken::new();
        *self.cancel.lock() = Some(cancel.clone());
        Ok(OpGuard {
            engine: self,
            cancel,
        })
    }

    /// Probes `path` into the session, replacing whatever was loaded.
    pub fn load(&self, session: &mut Session, path: &Path) -> CutResult<()> {
        let _guard = self.begin()?;
        let media = log_outcome("load", MediaFile::load(&self.tools, path))?;
        session.set_media(media);
        Ok(())
    }

    /// Cuts `[from, to)` of the loaded file with the session's strategy.
    pub fn cut(
        &self,
        session: &Session,
        from: f64,
        to: f64,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let spec = session.cut_spec(from, to)?;
        self.cut_with(session.strategy, &spec, sink)
    }

    pub fn cut_with(
        &self,
        strategy: CutStrategy,
        spec: &CutSpec,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let guard = self.begin()?;
        log_outcome("cut", self.run_cut(&guard, strategy, spec, sink))
    }

    /// Cuts every scene into a scratch directory and concatenates the
    /// segments losslessly into `<stem>_cut<ext>`.
    pub fn merge(&self, session: &Session, sink: &dyn ProgressSink) -> CutResult<PathBuf> {
        let guard = self.begin()?;
        log_outcome("merge", self.run_merge(&guard, session, sink))
    }

    /// Extracts the session's selected audio stream to WAV. A 5.1 stream is
    /// split into front, back and center files.
    pub fn extract_audio(
        &self,
        session: &Session,
        sink: &dyn ProgressSink,
    ) -> CutResult<Vec<PathBuf>> {
        let guard = self.begin()?;
        log_outcome("extract audio", self.run_extract_audio(&guard, session, sink))
    }

    /// Writes a preview the embedded player can decode and records it in the
    /// session. Video is only re-encoded when requested and the codec is not
    /// already playable.
    pub fn html5ify(
        &self,
        session: &mut Session,
        encode_video: bool,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let guard = self.begin()?;
        let out = log_outcome("html5ify", self.run_html5ify(&guard, session, encode_video, sink))?;
        session.preview_path = Some(out.clone());
        Ok(out)
    }

    /// Converts to a baseline H.264 `<file>.mp4` and loads the result into
    /// the session in place of the source.
    pub fn convert(
        &self,
        session: &mut Session,
        encode_video: bool,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let guard = self.begin()?;
        let out = log_outcome("convert", self.run_convert(&guard, session, encode_video, sink))?;
        guard.set(OpState::Probing);
        let media = log_outcome("load converted", MediaFile::load(&self.tools, &out))?;
        session.set_media(media);
        Ok(out)
    }

    fn execute(
        &self,
        guard: &OpGuard<'_>,
        args: &[OsString],
        pattern: ProgressPattern,
        total_seconds: f64,
        sink: &dyn ProgressSink,
    ) -> CutResult<ProcessOutput> {
        guard.set(OpState::Running);
        info!(args = %process::render_args(args), "ffmpeg");
        let parser = ProgressParser::new(pattern, total_seconds, sink);
        let mut on_line = |line: &str| parser.feed(line);
        process::run(&self.tools.ffmpeg, args, &mut on_line, Some(&guard.cancel))
    }

    fn run_cut(
        &self,
        guard: &OpGuard<'_>,
        strategy: CutStrategy,
        spec: &CutSpec,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        guard.set(OpState::Building);
        spec.validate()?;
        let out = cut_output_path(spec);
        let args = build_cut_args(strategy, spec, &out);
        info!(from = spec.cut_from, to = spec.cut_to, ?strategy, "cutting");

        sink.report(0.0);
        self.execute(guard, &args, ProgressPattern::Frames, spec.cut_duration(), sink)?;

        guard.set(OpState::PostProcessing);
        transfer_timestamps(&spec.source, &out)?;
        Ok(out)
    }

    fn run_merge(
        &self,
        guard: &OpGuard<'_>,
        session: &Session,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let media = session.media()?;
        if session.scenes.is_empty() {
            return Err(CutError::NoScenes);
        }

        guard.set(OpState::Building);
        let base_dir = output_dir_for(&media.path, session.output_dir.as_deref());
        let mut specs = Vec::with_capacity(session.scenes.len());
        for scene in &session.scenes {
            let mut spec = session.cut_spec(scene.left, scene.right)?;
            spec.validate()?;
            spec.rotation = None;
            spec.include_all_streams = false;
            specs.push(spec);
        }

        let mut scratch = ScratchDir::create(scratch_dir_for(&media.path, &base_dir))?;
        let slices = (specs.len() + 1) as f64;
        sink.report(0.0);

        let mut manifest = String::new();
        for (i, spec) in specs.iter_mut().enumerate() {
            spec.output_dir = Some(scratch.path().to_path_buf());
            let segment = cut_output_path(spec);
            scratch.track(segment.clone());

            let scaled = ScaledSink::new(sink, i as f64 / slices, 1.0 / slices);
            self.run_cut(guard, session.strategy, spec, &scaled)?;
            manifest.push_str(&manifest_line(&segment));
            sink.report((i + 1) as f64 / slices);
        }

        let filelist = scratch.path().join("filelist.txt");
        scratch.track(filelist.clone());
        fs::write(&filelist, manifest)?;

        guard.set(OpState::Building);
        let out = merged_output_path(media, session.output_dir.as_deref());
        let args = concat_args(&filelist, &out);
        let total: f64 = specs.iter().map(CutSpec::cut_duration).sum();
        let tail = ScaledSink::new(sink, 1.0 - 1.0 / slices, 1.0 / slices);
        self.execute(guard, &args, ProgressPattern::Size, total, &tail)?;

        guard.set(OpState::PostProcessing);
        transfer_timestamps(&media.path, &out)?;
        drop(scratch);
        info!(path = %out.display(), segments = specs.len(), "merged");
        Ok(out)
    }

    fn run_extract_audio(
        &self,
        guard: &OpGuard<'_>,
        session: &Session,
        sink: &dyn ProgressSink,
    ) -> CutResult<Vec<PathBuf>> {
        let media = session.media()?;
        let stream = session
            .selected_audio_stream()
            .ok_or(CutError::NoAudioStream(session.selected_audio))?;

        let input = title_input(&media.path)?;
        if let AudioInput::Concat(parts) = &input {
            info!(parts = parts.len(), "joining title parts");
        }

        guard.set(OpState::Building);
        let dir = output_dir_for(&media.path, session.output_dir.as_deref());
        let stem = file_stem(&media.path);
        let (args, outputs) = if stream.is_surround() {
            let outs = SurroundOutputs {
                front: dir.join(format!("{stem}-front.wav")),
                back: dir.join(format!("{stem}-back.wav")),
                center: dir.join(format!("{stem}-center.wav")),
            };
            let args = split_surround_args(&input, stream.index, stream.is_side_layout(), &outs);
            (args, vec![outs.front, outs.back, outs.center])
        } else {
            let out = dir.join(format!("{stem}.wav"));
            (extract_audio_args(&input, stream.index, &out), vec![out])
        };

        sink.report(0.0);
        self.execute(guard, &args, ProgressPattern::Size, media.duration, sink)?;

        guard.set(OpState::PostProcessing);
        for out in &outputs {
            transfer_timestamps(&media.path, out)?;
        }
        Ok(outputs)
    }

    fn run_html5ify(
        &self,
        guard: &OpGuard<'_>,
        session: &Session,
        encode_video: bool,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let media = session.media()?;
        guard.set(OpState::Building);
        let encode = encode_video && !media.is_codec_ok();
        let out = output_dir_for(&media.path, session.output_dir.as_deref())
            .join(format!("{}-html5ified.mp4", file_name(&media.path)));
        let args = html5ify_args(&media.path, &out, encode);

        sink.report(0.0);
        self.execute(guard, &args, ProgressPattern::Size, media.duration, sink)?;

        guard.set(OpState::PostProcessing);
        transfer_timestamps(&media.path, &out)?;
        Ok(out)
    }

    fn run_convert(
        &self,
        guard: &OpGuard<'_>,
        session: &Session,
        encode_video: bool,
        sink: &dyn ProgressSink,
    ) -> CutResult<PathBuf> {
        let media = session.media()?;
        guard.set(OpState::Building);
        let encode = encode_video && !media.is_codec_ok();
        let out = output_dir_for(&media.path, session.output_dir.as_deref())
            .join(format!("{}.mp4", file_name(&media.path)));
        let args = convert_args(&media.path, &out, encode, session.strip_audio);

        sink.report(0.0);
        self.execute(guard, &args, ProgressPattern::Size, media.duration, sink)?;

        guard.set(OpState::PostProcessing);
        transfer_timestamps(&media.path, &out)?;
        Ok(out)
    }
}

/// Logs the outcome of an operation at its boundary.
fn log_outcome<T>(op: &str, result: CutResult<T>) -> CutResult<T> {
    match &result {
        Ok(_) => info!(op, "done"),
        Err(CutError::Cancelled) => warn!(op, "cancelled"),
        Err(err) => error!(op, %err, "failed"),
    }
    result
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into())
}

fn extension_or(path: &Path, format: &str) -> String {
    match path.extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy()),
        None => format!(".{format}"),
    }
}

/// The custom output directory if set, otherwise the source's directory.
pub fn output_dir_for(source: &Path, custom: Option<&Path>) -> PathBuf {
    match custom {
        Some(dir) => dir.to_path_buf(),
        None => source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// `<dir>/<file name>-<HH.MM.SS.mmm>-<HH.MM.SS.mmm><ext>`
pub fn cut_output_path(spec: &CutSpec) -> PathBuf {
    let dir = output_dir_for(&spec.source, spec.output_dir.as_deref());
    dir.join(format!(
        "{}-{}-{}{}",
        file_name(&spec.source),
        format_duration(spec.cut_from, true),
        format_duration(spec.cut_to, true),
        extension_or(&spec.source, &spec.format)
    ))
}

/// `<dir>/<stem>`, or `<dir>/<stem>.scenes` when a file already takes that
/// name (an extensionless source is its own stem).
pub fn scratch_dir_for(source: &Path, dir: &Path) -> PathBuf {
    let stem = file_stem(source);
    let plain = dir.join(&stem);
    if plain.exists() && !plain.is_dir() {
        dir.join(format!("{stem}.scenes"))
    } else {
        plain
    }
}

/// `<dir>/<stem>_cut<ext>`
pub fn merged_output_path(media: &MediaFile, custom: Option<&Path>) -> PathBuf {
    output_dir_for(&media.path, custom).join(format!(
        "{}_cut{}",
        file_stem(&media.path),
        extension_or(&media.path, &media.format)
    ))
}

/// Dates the output by the source's content times rather than processing time.
pub fn transfer_timestamps(source: &Path, out: &Path) -> CutResult<()> {
    let meta = fs::metadata(source)?;
    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(out, atime, mtime)?;
    Ok(())
}

/// For a DVD title part, every part of the same title in order; otherwise the
/// file itself.
pub fn title_input(path: &Path) -> CutResult<AudioInput> {
    let Some((title, _)) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_vob_name)
    else {
        return Ok(AudioInput::File(path.to_path_buf()));
    };

    let dir = output_dir_for(path, None);
    let mut parts: Vec<(u32, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some((t, part)) = name.to_str().and_then(parse_vob_name) {
            if t == title {
                parts.push((part, entry.path()));
            }
        }
    }
    parts.sort_by_key(|(part, _)| *part);

    if parts.len() > 1 {
        Ok(AudioInput::Concat(parts.into_iter().map(|(_, p)| p).collect()))
    } else {
        Ok(AudioInput::File(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::AudioStream;
    use crate::progress::NoProgress;

    fn media(path: PathBuf) -> MediaFile {
        MediaFile {
            path,
            duration: 120.0,
            format: "mp4".into(),
            video_codec: Some("h264".into()),
            audio_streams: vec![AudioStream {
                index: 0,
                description: "aac (LC), 48000 Hz, stereo, fltp".into(),
            }],
        }
    }

    fn spec(source: &str, from: f64, to: f64) -> CutSpec {
        CutSpec {
            source: PathBuf::from(source),
            output_dir: None,
            format: "mp4".into(),
            cut_from: from,
            cut_to: to,
            total_duration: 5188.672,
            rotation: None,
            include_all_streams: false,
            strip_audio: false,
        }
    }

    #[test]
    fn cut_outputs_are_named_by_range() {
        let s = spec("/videos/gladbeck.mp4", 112.5, 4970.25);
        assert_eq!(
            cut_output_path(&s),
            PathBuf::from("/videos/gladbeck.mp4-00.01.52.500-01.22.50.250.mp4")
        );

        let mut custom = spec("/videos/raw", 0.0, 1.0);
        custom.output_dir = Some(PathBuf::from("/out"));
        assert_eq!(
            cut_output_path(&custom),
            PathBuf::from("/out/raw-00.00.00.000-00.00.01.000.mp4")
        );
    }

    #[test]
    fn merged_output_sits_beside_source() {
        let m = media(PathBuf::from("/videos/holiday.mkv"));
        assert_eq!(
            merged_output_path(&m, None),
            PathBuf::from("/videos/holiday_cut.mkv")
        );
        assert_eq!(
            merged_output_path(&m, Some(Path::new("/exports"))),
            PathBuf::from("/exports/holiday_cut.mkv")
        );
    }

    #[test]
    fn title_parts_are_joined_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "VTS_01_0.VOB",
            "VTS_01_2.VOB",
            "VTS_01_1.VOB",
            "VTS_02_1.VOB",
            "VTS_01_10.VOB",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let input = title_input(&dir.path().join("VTS_01_1.VOB")).unwrap();
        assert_eq!(
            input,
            AudioInput::Concat(vec![
                dir.path().join("VTS_01_1.VOB"),
                dir.path().join("VTS_01_2.VOB"),
                dir.path().join("VTS_01_10.VOB"),
            ])
        );

        let single = title_input(&dir.path().join("VTS_02_1.VOB")).unwrap();
        assert_eq!(single, AudioInput::File(dir.path().join("VTS_02_1.VOB")));

        let plain = title_input(Path::new("/videos/a.mkv")).unwrap();
        assert_eq!(plain, AudioInput::File(PathBuf::from("/videos/a.mkv")));
    }

    #[test]
    fn scratch_dir_avoids_an_extensionless_source() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        fs::write(&raw, b"video").unwrap();
        assert_eq!(scratch_dir_for(&raw, dir.path()), dir.path().join("raw.scenes"));

        let movie = dir.path().join("movie.mkv");
        assert_eq!(scratch_dir_for(&movie, dir.path()), dir.path().join("movie"));
        fs::create_dir(dir.path().join("movie")).unwrap();
        assert_eq!(scratch_dir_for(&movie, dir.path()), dir.path().join("movie"));
    }

    #[test]
    fn timestamps_follow_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.mp4");
        let out = dir.path().join("out.mp4");
        fs::write(&source, b"a").unwrap();
        fs::write(&out, b"b").unwrap();
        let old = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_times(&source, old, old).unwrap();

        transfer_timestamps(&source, &out).unwrap();
        let meta = fs::metadata(&out).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("holiday");
        {
            let mut scratch = ScratchDir::create(dir.clone()).unwrap();
            let f = scratch.path().join("filelist.txt");
            fs::write(&f, "x").unwrap();
            scratch.track(f);
            scratch.track(dir.join("never-written.mp4"));
        }
        assert!(!dir.exists());
    }

    #[test]
    fn invalid_range_is_rejected_before_spawning() {
        let engine = Engine::new(Tools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        });
        let s = spec("/videos/a.mp4", 30.0, 30.0);
        let err = engine.cut_with(CutStrategy::Keyframe, &s, &NoProgress).unwrap_err();
        assert!(matches!(err, CutError::InvalidRange { .. }));
        assert_eq!(engine.state(), OpState::Idle);
    }

    #[test]
    fn merge_without_scenes_fails_fast() {
        let engine = Engine::new(Tools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        });
        let mut session = Session::new();
        session.set_media(media(PathBuf::from("/videos/a.mp4")));
        assert!(matches!(engine.merge(&session, &NoProgress), Err(CutError::NoScenes)));
        assert!(!engine.is_busy());
    }

    #[test]
    fn second_operation_is_rejected_while_busy() {
        let engine = Engine::new(Tools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        });
        let guard = engine.begin().unwrap();
        guard.set(OpState::Running);
        let s = spec("/videos/a.mp4", 1.0, 2.0);
        assert!(matches!(
            engine.cut_with(CutStrategy::Precise, &s, &NoProgress),
            Err(CutError::Busy)
        ));
        drop(guard);
        assert_eq!(engine.state(), OpState::Idle);
    }

    #[cfg(unix)]
    mod with_fake_ffmpeg {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::{Arc, Mutex as StdMutex};

        /// Logs each invocation's argv on one line, copies a concat manifest
        /// aside, emits one progress line and creates the outputs (the last
        /// argument and every `.wav`).
        fn fake_ffmpeg(dir: &Path, exit_code: i32) -> PathBuf {
            let log = dir.join("calls.log");
            let captured = dir.join("captured-filelist.txt");
            let script = format!(
                r#"#!/bin/sh
echo "$*" >> '{log}'
prev=""
concat=0
for a in "$@"; do
  if [ "$prev" = "-f" ] && [ "$a" = "concat" ]; then concat=1; fi
  if [ "$prev" = "-i" ] && [ "$concat" = 1 ]; then cp "$a" '{captured}'; fi
  prev="$a"
done
last="$prev"
printf 'frame=   10 fps=0.0 q=-1.0 size=     256kB time=00:00:01.00 bitrate= 100.0kbits/s speed=10x\r' >&2
if [ {exit_code} -ne 0 ]; then echo "Invalid data found when processing input" >&2; exit {exit_code}; fi
for a in "$@"; do
  case "$a" in *.wav) : > "$a" ;; esac
done
: > "$last"
"#,
                log = log.display(),
                captured = captured.display(),
            );
            let path = dir.join("ffmpeg");
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// Answers the JSON query on stdout and the banner query on stderr.
        fn fake_ffprobe(dir: &Path) -> PathBuf {
            let script = r#"#!/bin/sh
if [ "$1" = "-of" ]; then
  printf '{"format":{"duration":"120.000000","format_name":"mov,mp4,m4a,3gp,3g2,mj2"}}'
else
  echo "    Stream #0:0(und): Video: h264 (Main), yuv420p, 640x360" >&2
  echo "    Stream #0:1(und): Audio: aac (LC), 48000 Hz, stereo, fltp" >&2
fi
"#;
            let path = dir.join("ffprobe");
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn engine(bin_dir: &Path, exit_code: i32) -> Engine {
            Engine::new(Tools {
                ffmpeg: fake_ffmpeg(bin_dir, exit_code),
                ffprobe: bin_dir.join("ffprobe"),
            })
        }

        fn loaded_session(video_dir: &Path) -> Session {
            let video = video_dir.join("holiday.mp4");
            fs::write(&video, b"video").unwrap();
            let mut session = Session::new();
            session.set_media(media(video));
            session
        }

        fn calls(bin_dir: &Path) -> Vec<String> {
            fs::read_to_string(bin_dir.join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[test]
        fn merge_cuts_each_scene_then_concatenates() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 0);
            let mut session = loaded_session(videos.path());
            session.strategy = CutStrategy::Precise;
            session.add_scene(0.0, 10.0);
            session.add_scene(30.0, 45.5);
            session.add_scene(60.0, 120.0);

            let seen = Arc::new(StdMutex::new(Vec::new()));
            let sink_seen = Arc::clone(&seen);
            let sink = move |f: f64| sink_seen.lock().unwrap().push(f);
            let out = engine.merge(&session, &sink).unwrap();

            assert_eq!(out, videos.path().join("holiday_cut.mp4"));
            assert!(out.exists());

            let calls = calls(bin.path());
            assert_eq!(calls.len(), 4);
            assert!(calls[..3].iter().all(|c| c.starts_with("-i ")));
            assert!(calls[3].starts_with("-y -f concat -safe 0 -i "));
            assert!(calls[3].ends_with(&format!("-c copy {}", out.display())));
            for flag in ["-vcodec", "-acodec", "-crf", "-vf"] {
                assert!(!calls[3].split(' ').any(|a| a == flag), "concat re-encodes: {flag}");
            }

            let scratch = videos.path().join("holiday");
            let manifest = fs::read_to_string(bin.path().join("captured-filelist.txt")).unwrap();
            let expected: String = [
                "holiday.mp4-00.00.00.000-00.00.10.000.mp4",
                "holiday.mp4-00.00.30.000-00.00.45.500.mp4",
                "holiday.mp4-00.01.00.000-00.02.00.000.mp4",
            ]
            .iter()
            .map(|name| manifest_line(&scratch.join(name)))
            .collect();
            assert_eq!(manifest, expected);

            assert!(!scratch.exists(), "scratch directory left behind");
            assert!(!engine.is_busy());

            let seen = seen.lock().unwrap();
            assert_eq!(seen.first(), Some(&0.0));
            assert!(seen.contains(&0.75));
        }

        #[test]
        fn failing_cut_surfaces_process_error_and_clears_busy() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 1);
            let session = loaded_session(videos.path());

            let err = engine.cut(&session, 5.0, 20.0, &NoProgress).unwrap_err();
            assert!(err.is_unsupported_media());
            match &err {
                CutError::Process { stderr, .. } => assert!(stderr.contains("Invalid data")),
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(engine.state(), OpState::Idle);

            let retry = engine.cut(&session, 5.0, 20.0, &NoProgress).unwrap_err();
            assert!(!matches!(retry, CutError::Busy));
        }

        #[test]
        fn failed_merge_still_removes_scratch() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 1);
            let mut session = loaded_session(videos.path());
            session.add_scene(1.0, 2.0);
            session.add_scene(3.0, 4.0);

            assert!(engine.merge(&session, &NoProgress).is_err());
            assert!(!videos.path().join("holiday").exists());
            assert_eq!(calls(bin.path()).len(), 1);
            assert!(!engine.is_busy());
        }

        #[test]
        fn keyframe_cut_reports_progress_and_dates_output() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 0);
            let session = loaded_session(videos.path());
            let old = FileTime::from_unix_time(1_400_000_000, 0);
            let source = &session.media().unwrap().path;
            filetime::set_file_times(source, old, old).unwrap();

            let (tx, rx) = std::sync::mpsc::channel::<f64>();
            let out = engine.cut(&session, 0.0, 4.0, &tx).unwrap();
            drop(tx);
            let fractions: Vec<f64> = rx.iter().collect();
            assert_eq!(fractions, vec![0.0, 0.25]);

            let call = &calls(bin.path())[0];
            assert!(call.starts_with("-noaccurate_seek -i "));
            assert!(call.contains("-avoid_negative_ts make_zero"));
            let meta = fs::metadata(&out).unwrap();
            assert_eq!(FileTime::from_last_modification_time(&meta), old);
        }

        #[test]
        fn surround_stream_extracts_three_files() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 0);
            let mut session = loaded_session(videos.path());
            if let Some(m) = session.media.as_mut() {
                m.audio_streams.push(AudioStream {
                    index: 1,
                    description: "ac3, 48000 Hz, 5.1(side), fltp, 448 kb/s".into(),
                });
            }
            session.selected_audio = 1;

            let outs = engine.extract_audio(&session, &NoProgress).unwrap();
            let names: Vec<String> = outs.iter().map(|p| file_name(p)).collect();
            assert_eq!(names, vec!["holiday-front.wav", "holiday-back.wav", "holiday-center.wav"]);
            let call = &calls(bin.path())[0];
            assert!(call.contains("channel_layout=5.1(side)"));
        }

        #[test]
        fn html5ify_remuxes_playable_codec() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 0);
            let mut session = loaded_session(videos.path());

            let out = engine.html5ify(&mut session, true, &NoProgress).unwrap();
            assert_eq!(out, videos.path().join("holiday.mp4-html5ified.mp4"));
            assert_eq!(session.preview_path.as_deref(), Some(out.as_path()));
            let call = &calls(bin.path())[0];
            assert!(call.contains("-vcodec copy -an -y"));
            assert!(!call.contains("libx264"));
        }

        #[test]
        fn merge_of_extensionless_source_uses_side_scratch() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 0);
            let raw = videos.path().join("raw");
            fs::write(&raw, b"video").unwrap();
            let mut session = Session::new();
            session.set_media(media(raw.clone()));
            session.add_scene(1.0, 2.0);

            let out = engine.merge(&session, &NoProgress).unwrap();
            assert_eq!(out, videos.path().join("raw_cut.mp4"));

            let calls = calls(bin.path());
            assert_eq!(calls.len(), 2);
            let segment = videos
                .path()
                .join("raw.scenes")
                .join("raw-00.00.01.000-00.00.02.000.mp4");
            assert!(calls[0].ends_with(&segment.display().to_string()));
            assert!(raw.is_file());
            assert!(!videos.path().join("raw.scenes").exists());
        }

        #[test]
        fn convert_loads_the_converted_file() {
            let bin = tempfile::tempdir().unwrap();
            let videos = tempfile::tempdir().unwrap();
            let engine = Engine::new(Tools {
                ffmpeg: fake_ffmpeg(bin.path(), 0),
                ffprobe: fake_ffprobe(bin.path()),
            });
            let mut session = loaded_session(videos.path());
            session.selected_audio = 3;

            let out = engine.convert(&mut session, false, &NoProgress).unwrap();
            assert_eq!(out, videos.path().join("holiday.mp4.mp4"));
            let media = session.media().unwrap();
            assert_eq!(media.path, out);
            assert_eq!(media.format, "mov");
            assert_eq!(media.duration, 120.0);
            assert_eq!(media.audio_streams.len(), 1);
            assert_eq!(session.selected_audio, 0);
            assert!(!engine.is_busy());
        }

        #[test]
        fn cancel_without_operation_is_harmless() {
            let bin = tempfile::tempdir().unwrap();
            let engine = engine(bin.path(), 0);
            engine.cancel();
            assert!(!engine.is_busy());
        }
    }
}
