mod cli;
mod tui;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use indicatif::{ProgressBar, ProgressStyle};
use losscut::error::{CutError, CutResult};
use losscut::ops::Engine;
use losscut::probe::MediaFile;
use losscut::progress::{ProgressSink, ProgressUi};
use losscut::session::{Session, load_project, save_project};
use losscut::timecode::format_duration;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<CutError>() {
                Some(cut) => eprintln!("{}", cut.user_message()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "losscut=debug"
    } else {
        "losscut=info"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;
    let command = match config.command {
        Some(command) => command,
        None => tui::interactive_command()?,
    };

    let engine = Engine::locate(&config.tools)?;
    let tools = engine.tools();
    info!(
        ffmpeg = %tools.ffmpeg.display(),
        ffprobe = %tools.ffprobe.display(),
        "tools located"
    );

    let mut session = Session::new();
    session.output_dir = config.output_dir;

    let input = command.input();
    let (video, project_scenes) = if is_project(input) {
        load_project(input)?
    } else {
        (input.to_path_buf(), Vec::new())
    };

    let spinner = spinner("🔎 Probing input…");
    let loaded = engine.load(&mut session, &video);
    spinner.finish_and_clear();
    loaded?;

    match command {
        Commands::Probe { .. } => print_media(session.media()?),
        Commands::Cut {
            from,
            to,
            flags,
            all_streams,
            rotate,
            ..
        } => {
            session.strategy = flags.strategy();
            session.strip_audio = flags.strip_audio;
            session.include_all_streams = all_streams;
            session.rotation = rotate;
            let duration = session.media()?.duration;
            let (from, to) = (from.unwrap_or(0.0), to.unwrap_or(duration));
            let out = with_progress("✂️ Cutting…", |sink| {
                engine.cut(&session, from, to, sink)
            })?;
            println!("{}", out.display());
        }
        Commands::Merge {
            scenes,
            flags,
            save_project: save,
            ..
        } => {
            session.strategy = flags.strategy();
            session.strip_audio = flags.strip_audio;
            session.scenes = project_scenes;
            for (left, right) in scenes {
                session.add_scene(left, right);
            }
            if save {
                let path = save_project(&session)?;
                println!("Project saved to {}", path.display());
            }
            let out = with_progress("🧩 Cutting scenes and merging…", |sink| {
                engine.merge(&session, sink)
            })?;
            println!("{}", out.display());
        }
        Commands::ExtractAudio { stream, .. } => {
            session.selected_audio = stream;
            let outs = with_progress("🔊 Extracting audio…", |sink| {
                engine.extract_audio(&session, sink)
            })?;
            for out in outs {
                println!("{}", out.display());
            }
        }
        Commands::Html5ify { encode, .. } => {
            let out = with_progress("🎞️ Writing HTML5 preview…", |sink| {
                engine.html5ify(&mut session, encode, sink)
            })?;
            println!("{}", out.display());
        }
        Commands::Convert {
            encode,
            strip_audio,
            ..
        } => {
            session.strip_audio = strip_audio;
            let out = with_progress("📦 Converting…", |sink| {
                engine.convert(&mut session, encode, sink)
            })?;
            println!("{}", out.display());
            print_media(session.media()?);
        }
    }
    Ok(())
}

fn is_project(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "prj")
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(80));
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style.tick_strings(&[
            "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
        ]));
    }
    spinner.set_message(message.to_string());
    spinner
}

fn with_progress<T>(
    label: &str,
    op: impl FnOnce(&dyn ProgressSink) -> CutResult<T>,
) -> Result<T> {
    let ui = ProgressUi::new(label);
    match op(&ui) {
        Ok(value) => {
            ui.finish("✅ Done");
            Ok(value)
        }
        Err(err) => {
            ui.abandon("❌ Failed");
            Err(err.into())
        }
    }
}

fn print_media(media: &MediaFile) {
    println!("File:     {}", media.path.display());
    println!("Duration: {}", format_duration(media.duration, false));
    println!("Format:   {}", media.format);
    match &media.video_codec {
        Some(codec) => println!(
            "Video:    {codec}{}",
            if media.is_codec_ok() { "" } else { " (not HTML5-playable)" }
        ),
        None => println!("Video:    none"),
    }
    if media.audio_streams.is_empty() {
        println!("Audio:    none");
    }
    for stream in &media.audio_streams {
        println!("Audio {}:  {}", stream.index, stream.description);
    }
}
