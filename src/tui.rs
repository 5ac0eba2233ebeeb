use crate::cli::{Commands, CutFlags, parse_scene, parse_time};
use anyhow::Result;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::path::PathBuf;

const ACTIONS: &[&str] = &[
    "Probe file info",
    "Cut one range",
    "Cut scenes and merge",
    "Extract audio",
    "Make HTML5 preview",
    "Convert to mp4",
];

/// Asks for an input file and an action, then builds the same command the
/// flags would have.
pub fn interactive_command() -> Result<Commands> {
    println!("Interactive lossless cutter");
    println!("Press Enter to accept defaults or leave options unset.\n");

    let theme = ColorfulTheme::default();
    let input = loop {
        let raw: String = Input::with_theme(&theme)
            .with_prompt("Input video file path")
            .interact_text()?;
        let path = PathBuf::from(raw.trim());
        if path.exists() {
            break path;
        } else {
            println!("Path not found, please try again.");
        }
    };

    let action = Select::with_theme(&theme)
        .with_prompt("What should be done?")
        .items(ACTIONS)
        .default(1)
        .interact()?;

    let command = match action {
        0 => Commands::Probe { input },
        1 => Commands::Cut {
            input,
            from: prompt_optional_time(&theme, "Start (blank = file start)")?,
            to: prompt_optional_time(&theme, "End (blank = file end)")?,
            flags: prompt_cut_flags(&theme)?,
            all_streams: Confirm::with_theme(&theme)
                .with_prompt("Keep all streams (subtitles, data)?")
                .default(false)
                .interact()?,
            rotate: None,
        },
        2 => Commands::Merge {
            input,
            scenes: prompt_scenes(&theme)?,
            flags: prompt_cut_flags(&theme)?,
            save_project: Confirm::with_theme(&theme)
                .with_prompt("Save scenes to a project file?")
                .default(true)
                .interact()?,
        },
        3 => Commands::ExtractAudio {
            input,
            stream: Input::with_theme(&theme)
                .with_prompt("Audio stream index")
                .default(0)
                .interact_text()?,
        },
        4 => Commands::Html5ify {
            input,
            encode: prompt_encode(&theme)?,
        },
        _ => Commands::Convert {
            input,
            encode: prompt_encode(&theme)?,
            strip_audio: Confirm::with_theme(&theme)
                .with_prompt("Drop audio?")
                .default(false)
                .interact()?,
        },
    };
    Ok(command)
}

fn prompt_cut_flags(theme: &ColorfulTheme) -> Result<CutFlags> {
    let precise = Confirm::with_theme(theme)
        .with_prompt("Frame-accurate cut? (No = snap to keyframes, faster)")
        .default(false)
        .interact()?;
    let strip_audio = Confirm::with_theme(theme)
        .with_prompt("Drop audio?")
        .default(false)
        .interact()?;
    Ok(CutFlags {
        precise,
        strip_audio,
    })
}

fn prompt_encode(theme: &ColorfulTheme) -> Result<bool> {
    Ok(Confirm::with_theme(theme)
        .with_prompt("Re-encode video if the codec is not H.264?")
        .default(true)
        .interact()?)
}

fn prompt_optional_time(theme: &ColorfulTheme, prompt: &str) -> Result<Option<f64>> {
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match parse_time(trimmed) {
            Ok(val) => return Ok(Some(val)),
            Err(err) => println!("Invalid time: {err}. Use seconds, MM:SS or HH:MM:SS.mmm."),
        }
    }
}

/// Reads `START-END` ranges until a blank line.
fn prompt_scenes(theme: &ColorfulTheme) -> Result<Vec<(f64, f64)>> {
    let mut scenes = Vec::new();
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt(format!("Scene {} as START-END (blank = done)", scenes.len() + 1))
            .allow_empty(true)
            .interact_text()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(scenes);
        }
        match parse_scene(trimmed) {
            Ok(scene) => scenes.push(scene),
            Err(err) => println!("{err}"),
        }
    }
}
